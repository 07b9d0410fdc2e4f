//! Command descriptors and bound arguments
//!
//! A handler declares the named slots it wants when it is registered. The
//! dispatcher fills each slot from the dispatch context or from the spoken
//! argument tokens, and hands the result to the handler as [`BoundArgs`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use super::context::{Author, GuildRef, PermissionView, PlayerHandle, SyntheticMessage, VoiceChannelRef};
use crate::Result;
use crate::channels::ChannelHandle;

/// Values the dispatcher can supply from the invocation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextParam {
    Message,
    Channel,
    Author,
    Guild,
    Player,
    Permissions,
    UserMentions,
    ChannelMentions,
    VoiceChannel,
    LeftoverArgs,
}

impl ContextParam {
    /// Every context slot name
    pub const ALL: [Self; 10] = [
        Self::Message,
        Self::Channel,
        Self::Author,
        Self::Guild,
        Self::Player,
        Self::Permissions,
        Self::UserMentions,
        Self::ChannelMentions,
        Self::VoiceChannel,
        Self::LeftoverArgs,
    ];

    /// Slot name handlers declare
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Channel => "channel",
            Self::Author => "author",
            Self::Guild => "guild",
            Self::Player => "player",
            Self::Permissions => "permissions",
            Self::UserMentions => "user_mentions",
            Self::ChannelMentions => "channel_mentions",
            Self::VoiceChannel => "voice_channel",
            Self::LeftoverArgs => "leftover_args",
        }
    }

    /// Look up a context slot by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// How a declared slot is filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Filled from the dispatch context
    Context(ContextParam),
    /// Next argument token, or the default when tokens run out
    Positional { default: Option<String> },
    /// All remaining argument tokens
    Variadic,
    /// Remaining argument tokens joined with spaces; required
    Rest,
}

/// One named slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

/// Declared slots of a command handler, in binding order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandDescriptor {
    name: String,
    params: Vec<ParamSpec>,
}

impl CommandDescriptor {
    /// Descriptor for `name` with no slots
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declare a slot by name
    ///
    /// Names from the context vocabulary (`player`, `author`, ...) bind from
    /// the context; any other name is a required positional argument.
    #[must_use]
    pub fn param(self, name: &str) -> Self {
        let kind = ContextParam::from_name(name)
            .map_or(ParamKind::Positional { default: None }, ParamKind::Context);
        self.push(name, kind)
    }

    /// Declare a positional argument with a default
    #[must_use]
    pub fn optional(self, name: &str, default: &str) -> Self {
        self.push(
            name,
            ParamKind::Positional {
                default: Some(default.to_string()),
            },
        )
    }

    /// Declare a slot that takes all remaining tokens
    #[must_use]
    pub fn variadic(self, name: &str) -> Self {
        self.push(name, ParamKind::Variadic)
    }

    /// Declare a required slot holding the remaining tokens as one string
    #[must_use]
    pub fn rest(self, name: &str) -> Self {
        self.push(name, ParamKind::Rest)
    }

    fn push(mut self, name: &str, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// Command name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared slots
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Usage line like `volume <value> [mode=set]`
    #[must_use]
    pub fn usage(&self) -> String {
        let mut usage = self.name.clone();
        for param in &self.params {
            let part = match &param.kind {
                ParamKind::Context(_) => continue,
                ParamKind::Positional { default: None } | ParamKind::Rest => {
                    format!("<{}>", param.name)
                }
                ParamKind::Positional {
                    default: Some(default),
                } => format!("[{}={default}]", param.name),
                ParamKind::Variadic => format!("[{}...]", param.name),
            };
            usage.push(' ');
            usage.push_str(&part);
        }
        usage
    }
}

/// A value bound to one slot
#[derive(Debug, Clone)]
pub enum ArgValue {
    Message(SyntheticMessage),
    Channel(ChannelHandle),
    Author(Author),
    Guild(GuildRef),
    Player(PlayerHandle),
    Permissions(Option<PermissionView>),
    Mentions(Vec<u64>),
    VoiceChannel(Option<VoiceChannelRef>),
    Tokens(Vec<String>),
    Text(String),
}

/// Slot values handed to a handler
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    values: HashMap<String, ArgValue>,
}

impl BoundArgs {
    /// Bind `value` to `name`
    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    /// Raw value of a slot
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Number of bound slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text of a positional or rest slot
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ArgValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Tokens of a variadic or `leftover_args` slot
    #[must_use]
    pub fn tokens(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name)? {
            ArgValue::Tokens(tokens) => Some(tokens),
            _ => None,
        }
    }

    #[must_use]
    pub fn channel(&self) -> Option<&ChannelHandle> {
        match self.values.get(ContextParam::Channel.name())? {
            ArgValue::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    #[must_use]
    pub fn author(&self) -> Option<&Author> {
        match self.values.get(ContextParam::Author.name())? {
            ArgValue::Author(author) => Some(author),
            _ => None,
        }
    }

    #[must_use]
    pub fn guild(&self) -> Option<&GuildRef> {
        match self.values.get(ContextParam::Guild.name())? {
            ArgValue::Guild(guild) => Some(guild),
            _ => None,
        }
    }

    #[must_use]
    pub fn player(&self) -> Option<&PlayerHandle> {
        match self.values.get(ContextParam::Player.name())? {
            ArgValue::Player(player) => Some(player),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&SyntheticMessage> {
        match self.values.get(ContextParam::Message.name())? {
            ArgValue::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// What a handler wants sent back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub content: String,

    /// Mention the invoking member
    pub reply: bool,

    /// Delete the message after this long
    pub delete_after: Option<Duration>,

    /// Wrap the content in a code block
    pub codeblock: bool,
}

impl Response {
    /// Plain response
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn reply(mut self) -> Self {
        self.reply = true;
        self
    }

    #[must_use]
    pub const fn codeblock(mut self) -> Self {
        self.codeblock = true;
        self
    }

    #[must_use]
    pub const fn delete_after(mut self, after: Duration) -> Self {
        self.delete_after = Some(after);
        self
    }
}

/// A registered command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Slots this handler declares
    fn descriptor(&self) -> &CommandDescriptor;

    /// Run the command
    async fn invoke(&self, args: BoundArgs) -> Result<Option<Response>>;
}

type BoxedInvoke =
    Box<dyn Fn(BoundArgs) -> Pin<Box<dyn Future<Output = Result<Option<Response>>> + Send>> + Send + Sync>;

/// Handler backed by a closure
pub struct FnHandler {
    descriptor: CommandDescriptor,
    invoke: BoxedInvoke,
}

/// Wrap an async closure as a [`CommandHandler`]
pub fn handler_fn<F, Fut>(descriptor: CommandDescriptor, f: F) -> FnHandler
where
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Response>>> + Send + 'static,
{
    FnHandler {
        descriptor,
        invoke: Box::new(move |args| Box::pin(f(args))),
    }
}

#[async_trait]
impl CommandHandler for FnHandler {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: BoundArgs) -> Result<Option<Response>> {
        (self.invoke)(args).await
    }
}
