//! Discord text surface using serenity's REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{ChannelId, CreateEmbed, CreateMessage};
use serenity::http::Http;

use super::{OutgoingMessage, Renderable, TextChannel, TypingIndicator};
use crate::{Error, Result};

/// Discord limit for plain message content
const MAX_CONTENT_CHARS: usize = 2000;

/// Discord limit for embed descriptions
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Default embed color (Discord dark theme)
const EMBED_COLOR: u32 = 0x002B_2D31;

/// Discord text channel adapter
pub struct DiscordChannel {
    http: Arc<Http>,
}

impl DiscordChannel {
    /// Create a new Discord text surface
    ///
    /// # Errors
    ///
    /// Returns error if the token is empty
    pub fn new(token: &SecretString) -> Result<Self> {
        let token = token.expose_secret();
        if token.trim().is_empty() {
            return Err(Error::Config("Discord token is empty".to_string()));
        }

        Ok(Self {
            http: Arc::new(Http::new(token)),
        })
    }

    fn channel(channel_id: &str) -> Result<ChannelId> {
        let id: u64 = channel_id
            .parse()
            .map_err(|_| Error::Channel(format!("invalid channel ID: {channel_id}")))?;
        Ok(ChannelId::new(id))
    }
}

#[async_trait]
impl TextChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let channel = Self::channel(&message.channel_id)?;

        let builder = match &message.body {
            Renderable::Text(text) => CreateMessage::new().content(truncate(text, MAX_CONTENT_CHARS)),
            Renderable::Embed(embed) => CreateMessage::new().embed(
                CreateEmbed::new()
                    .title(&embed.title)
                    .description(truncate(&embed.description, MAX_DESCRIPTION_CHARS))
                    .color(embed.color.unwrap_or(EMBED_COLOR)),
            ),
        };

        let sent = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| Error::Channel(format!("Discord send error: {e}")))?;

        tracing::debug!(channel_id = %message.channel_id, "Discord message sent");

        if let Some(delay) = message.delete_after {
            schedule_delete(Arc::clone(&self.http), channel, sent.id, delay);
        }

        Ok(())
    }

    fn typing(&self) -> Option<&dyn TypingIndicator> {
        Some(self)
    }
}

#[async_trait]
impl TypingIndicator for DiscordChannel {
    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        Self::channel(channel_id)?
            .broadcast_typing(&self.http)
            .await
            .map_err(|e| Error::Channel(format!("Discord typing error: {e}")))?;

        tracing::debug!(channel_id, "Discord typing indicator sent");
        Ok(())
    }
}

/// Delete a sent message once `delay` has passed
fn schedule_delete(
    http: Arc<Http>,
    channel: ChannelId,
    message: serenity::all::MessageId,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = http.delete_message(channel, message, None).await {
            tracing::debug!(error = %e, "failed to delete expired Discord message");
        }
    });
}

/// Truncate to at most `max` characters, marking the cut
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
