//! Text surfaces
//!
//! Command responses and voice acknowledgements are delivered to a text
//! channel. Each adapter implements [`TextChannel`]; optional features such as
//! typing indicators are exposed as capability traits.

mod console;
mod discord;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use console::ConsoleChannel;
pub use discord::DiscordChannel;

use crate::Result;

/// Structured message body, rendered as an embed where supported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    /// RGB color
    pub color: Option<u32>,
}

impl Embed {
    /// Create an embed with no color
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color: None,
        }
    }

    /// Flatten to markdown text for surfaces without embeds
    #[must_use]
    pub fn to_text(&self) -> String {
        match (self.title.is_empty(), self.description.is_empty()) {
            (true, _) => self.description.clone(),
            (false, true) => format!("**{}**", self.title),
            (false, false) => format!("**{}**\n{}", self.title, self.description),
        }
    }
}

/// Something a text channel can display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderable {
    /// Plain text (may contain markdown)
    Text(String),
    /// Embed-like structured value
    Embed(Embed),
}

impl Renderable {
    /// Plain-text rendering of either variant
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Embed(embed) => embed.to_text(),
        }
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Embed> for Renderable {
    fn from(embed: Embed) -> Self {
        Self::Embed(embed)
    }
}

/// A message to send to a channel
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Channel identifier
    pub channel_id: String,

    /// Message body
    pub body: Renderable,

    /// Delete the message after this long (if the surface supports it)
    pub delete_after: Option<Duration>,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub fn text(channel_id: String, content: String) -> Self {
        Self {
            channel_id,
            body: Renderable::Text(content),
            delete_after: None,
        }
    }

    /// Plain-text rendering of the body
    #[must_use]
    pub fn content(&self) -> String {
        self.body.to_text()
    }
}

/// Trait for text surface adapters
#[async_trait]
pub trait TextChannel: Send + Sync {
    /// Get the surface name
    fn name(&self) -> &'static str;

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Typing indicator capability, if the surface has one
    fn typing(&self) -> Option<&dyn TypingIndicator> {
        None
    }
}

/// Capability: show that the bot is working on something
#[async_trait]
pub trait TypingIndicator: Send + Sync {
    /// Start the typing indicator in a channel
    async fn send_typing(&self, channel_id: &str) -> Result<()>;
}

/// A text surface bound to one channel
///
/// Typing support is checked once when the handle is created.
#[derive(Clone)]
pub struct ChannelHandle {
    surface: Arc<dyn TextChannel>,
    channel_id: String,
    supports_typing: bool,
}

impl ChannelHandle {
    /// Bind `surface` to `channel_id`
    #[must_use]
    pub fn new(surface: Arc<dyn TextChannel>, channel_id: impl Into<String>) -> Self {
        let supports_typing = surface.typing().is_some();
        Self {
            surface,
            channel_id: channel_id.into(),
            supports_typing,
        }
    }

    /// Channel identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.channel_id
    }

    /// Name of the underlying surface
    #[must_use]
    pub fn surface_name(&self) -> &'static str {
        self.surface.name()
    }

    /// Whether `start_typing` does anything on this surface
    #[must_use]
    pub const fn supports_typing(&self) -> bool {
        self.supports_typing
    }

    /// Send a body to the bound channel
    ///
    /// # Errors
    ///
    /// Returns error if the surface fails to deliver
    pub async fn send(&self, body: impl Into<Renderable>, delete_after: Option<Duration>) -> Result<()> {
        self.surface
            .send(OutgoingMessage {
                channel_id: self.channel_id.clone(),
                body: body.into(),
                delete_after,
            })
            .await
    }

    /// Start the typing indicator; a no-op on surfaces without one
    ///
    /// # Errors
    ///
    /// Returns error if the surface fails to show the indicator
    pub async fn start_typing(&self) -> Result<()> {
        if !self.supports_typing {
            return Ok(());
        }
        match self.surface.typing() {
            Some(typing) => typing.send_typing(&self.channel_id).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("surface", &self.surface.name())
            .field("channel_id", &self.channel_id)
            .field("supports_typing", &self.supports_typing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_flattening() {
        assert_eq!(Embed::new("skip", "done").to_text(), "**skip**\ndone");
        assert_eq!(Embed::new("", "done").to_text(), "done");
        assert_eq!(Embed::new("skip", "").to_text(), "**skip**");
    }

    #[tokio::test]
    async fn test_handle_without_typing_is_noop() {
        let console = Arc::new(ConsoleChannel::new());
        let handle = ChannelHandle::new(console, "general");

        assert!(!handle.supports_typing());
        assert!(handle.start_typing().await.is_ok());
        assert_eq!(handle.id(), "general");
    }
}
