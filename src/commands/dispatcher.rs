//! Command dispatch
//!
//! Resolves a canonical command to a registered handler, binds its declared
//! slots, runs it and forwards the response to the text channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::context::{DispatchContext, PlayerHandle, PlayerResolver, SyntheticMessage};
use super::descriptor::{
    ArgValue, BoundArgs, CommandDescriptor, CommandHandler, ContextParam, ParamKind, Response,
};
use crate::channels::{Embed, Renderable};
use crate::{Error, Result};

/// Handlers by canonical command name, plus an alias table
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    aliases: HashMap<String, String>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its descriptor name, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        let name = handler.descriptor().name().to_lowercase();
        tracing::debug!(command = %name, "registered command handler");
        self.handlers.insert(name, handler);
    }

    /// Map `alias` onto `command`
    pub fn alias(&mut self, alias: &str, command: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), command.trim().to_lowercase());
    }

    /// Add every alias from a table
    pub fn extend_aliases<'a>(&mut self, aliases: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (alias, command) in aliases {
            self.alias(alias, command);
        }
    }

    /// Whether a handler is registered directly under `command`
    #[must_use]
    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(&normalize(command))
    }

    /// Registered command names, sorted
    #[must_use]
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Find the handler for `command`
    ///
    /// A leading marker like `!` is ignored. The alias table is consulted
    /// once; aliases do not chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlerNotFound`] if neither lookup finds a handler
    pub fn resolve(&self, command: &str) -> Result<Arc<dyn CommandHandler>> {
        let name = normalize(command);

        if let Some(handler) = self.handlers.get(&name) {
            return Ok(Arc::clone(handler));
        }

        self.aliases
            .get(&name)
            .and_then(|target| self.handlers.get(target))
            .map(Arc::clone)
            .ok_or(Error::HandlerNotFound(name))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.commands())
            .field("aliases", &self.aliases)
            .finish()
    }
}

fn normalize(command: &str) -> String {
    command
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

/// How a dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran; `responded` if it produced a response
    Completed { responded: bool },
    /// No handler for the command
    Ignored,
    /// A required argument was missing; nothing was sent
    Aborted,
    /// Handler failed; its message was sent to the channel
    HandlerFailed(String),
}

/// Binds and runs command handlers
pub struct CommandDispatcher {
    registry: HandlerRegistry,
    players: Option<Arc<dyn PlayerResolver>>,
    rich_formatting: bool,
    command_prefix: String,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            players: None,
            rich_formatting: false,
            command_prefix: "!".to_string(),
        }
    }

    /// Use `players` to fill `player` slots
    #[must_use]
    pub fn with_players(mut self, players: Arc<dyn PlayerResolver>) -> Self {
        self.players = Some(players);
        self
    }

    /// Render responses as embeds
    #[must_use]
    pub const fn with_rich_formatting(mut self, enabled: bool) -> Self {
        self.rich_formatting = enabled;
        self
    }

    /// Prefix used when rebuilding a text command for the `message` slot
    #[must_use]
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run `command` with `args` in `ctx`
    ///
    /// # Errors
    ///
    /// Returns [`Error::VoiceContextMissing`] if a `player` slot could not be
    /// filled even after summoning, and channel errors from sending the
    /// response. Unknown commands, missing arguments and handler failures
    /// are reported through [`DispatchOutcome`].
    pub async fn dispatch(
        &self,
        command: &str,
        args: &str,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutcome> {
        let handler = match self.registry.resolve(command) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(error = %e, guild = ctx.guild.id, "voice command ignored");
                return Ok(DispatchOutcome::Ignored);
            }
        };
        let descriptor = handler.descriptor();

        let bound = match self.bind(descriptor, args, ctx).await {
            Ok(bound) => bound,
            Err(e @ Error::MissingParameter { .. }) => {
                tracing::warn!(error = %e, usage = %descriptor.usage(), "voice command aborted");
                return Ok(DispatchOutcome::Aborted);
            }
            Err(Error::VoiceContextMissing(reason)) => {
                tracing::warn!(command = %descriptor.name(), reason = %reason, "no voice context");
                if let Err(e) = ctx.channel.send(reason.as_str(), None).await {
                    tracing::warn!(error = %e, "failed to report missing voice context");
                }
                return Err(Error::VoiceContextMissing(reason));
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(command = %descriptor.name(), slots = bound.len(), "invoking handler");

        match handler.invoke(bound).await {
            Ok(Some(response)) => {
                let delete_after = response.delete_after;
                let body = self.render(descriptor.name(), response, ctx);
                ctx.channel.send(body, delete_after).await?;
                Ok(DispatchOutcome::Completed { responded: true })
            }
            Ok(None) => Ok(DispatchOutcome::Completed { responded: false }),
            Err(e) => {
                let message = match e {
                    Error::Handler(message) => message,
                    other => other.to_string(),
                };
                tracing::error!(
                    command = %descriptor.name(),
                    args,
                    author = ctx.author.id,
                    guild = ctx.guild.id,
                    error = %message,
                    "command handler failed"
                );
                if let Err(e) = ctx.channel.send(message.as_str(), None).await {
                    tracing::warn!(error = %e, "failed to report handler error");
                }
                Ok(DispatchOutcome::HandlerFailed(message))
            }
        }
    }

    /// Apply the rich formatting flag to a body
    #[must_use]
    pub fn format(&self, title: &str, body: Renderable) -> Renderable {
        match (self.rich_formatting, body) {
            (true, Renderable::Text(text)) => Renderable::Embed(Embed::new(title, text)),
            (false, Renderable::Embed(embed)) => Renderable::Text(embed.to_text()),
            (_, body) => body,
        }
    }

    fn render(&self, command: &str, response: Response, ctx: &DispatchContext) -> Renderable {
        let mut content = if response.codeblock {
            format!("```\n{}\n```", response.content)
        } else {
            response.content
        };
        if response.reply {
            content = format!("{} {content}", ctx.author.mention());
        }
        self.format(command, Renderable::Text(content))
    }

    async fn bind(
        &self,
        descriptor: &CommandDescriptor,
        args: &str,
        ctx: &DispatchContext,
    ) -> Result<BoundArgs> {
        let tokens: Vec<String> = args.split_whitespace().map(str::to_string).collect();
        let mut remaining: VecDeque<String> = tokens.iter().cloned().collect();
        let mut bound = BoundArgs::default();

        for param in descriptor.params() {
            let value = match &param.kind {
                ParamKind::Context(slot) => {
                    self.context_value(*slot, descriptor.name(), args, &tokens, ctx)
                        .await?
                }
                ParamKind::Variadic => ArgValue::Tokens(remaining.drain(..).collect()),
                ParamKind::Rest => {
                    if remaining.is_empty() {
                        return Err(missing(descriptor, &param.name));
                    }
                    let rest: Vec<String> = remaining.drain(..).collect();
                    ArgValue::Text(rest.join(" "))
                }
                ParamKind::Positional { default } => match (remaining.pop_front(), default) {
                    (Some(token), _) => ArgValue::Text(token),
                    (None, Some(default)) => ArgValue::Text(default.clone()),
                    (None, None) => return Err(missing(descriptor, &param.name)),
                },
            };
            bound.insert(param.name.clone(), value);
        }

        Ok(bound)
    }

    async fn context_value(
        &self,
        slot: ContextParam,
        command: &str,
        args: &str,
        tokens: &[String],
        ctx: &DispatchContext,
    ) -> Result<ArgValue> {
        let value = match slot {
            ContextParam::Message => {
                let content = format!("{}{command} {args}", self.command_prefix);
                ArgValue::Message(SyntheticMessage {
                    content: content.trim_end().to_string(),
                    channel_id: ctx.channel.id().to_string(),
                    author: ctx.author.clone(),
                    guild: ctx.guild.clone(),
                })
            }
            ContextParam::Channel => ArgValue::Channel(ctx.channel.clone()),
            ContextParam::Author => ArgValue::Author(ctx.author.clone()),
            ContextParam::Guild => ArgValue::Guild(ctx.guild.clone()),
            ContextParam::Player => ArgValue::Player(self.resolve_player(ctx).await?),
            ContextParam::Permissions => ArgValue::Permissions(ctx.permissions.clone()),
            ContextParam::UserMentions | ContextParam::ChannelMentions => {
                ArgValue::Mentions(Vec::new())
            }
            ContextParam::VoiceChannel => ArgValue::VoiceChannel(ctx.author.voice_channel.clone()),
            ContextParam::LeftoverArgs => ArgValue::Tokens(tokens.to_vec()),
        };
        Ok(value)
    }

    /// Resolve the player, summoning once if there is no voice context
    async fn resolve_player(&self, ctx: &DispatchContext) -> Result<PlayerHandle> {
        let Some(players) = &self.players else {
            return Err(Error::VoiceContextMissing(
                "음성 기능을 사용할 수 없습니다.".to_string(),
            ));
        };

        match players.resolve(&ctx.guild, ctx.voice_channel()).await {
            Err(original @ Error::VoiceContextMissing(_)) => {
                tracing::debug!(author = ctx.author.id, "no player, trying summon");
                if let Err(e) = players.summon(&ctx.guild, &ctx.author).await {
                    tracing::debug!(error = %e, "summon failed");
                    return Err(original);
                }
                players
                    .resolve(&ctx.guild, ctx.voice_channel())
                    .await
                    .map_err(|_| original)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("registry", &self.registry)
            .field("players", &self.players.is_some())
            .field("rich_formatting", &self.rich_formatting)
            .finish_non_exhaustive()
    }
}

fn missing(descriptor: &CommandDescriptor, parameter: &str) -> Error {
    Error::MissingParameter {
        command: descriptor.name().to_string(),
        parameter: parameter.to_string(),
    }
}
