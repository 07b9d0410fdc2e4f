//! Console text surface, for local replay and testing

use std::sync::Mutex;

use async_trait::async_trait;

use super::{OutgoingMessage, TextChannel};
use crate::Result;

/// Prints messages to stdout and keeps a transcript
#[derive(Debug, Default)]
pub struct ConsoleChannel {
    transcript: Mutex<Vec<OutgoingMessage>>,
    quiet: bool,
}

impl ConsoleChannel {
    /// Create a console surface that prints every message
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console surface that only records messages
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            transcript: Mutex::new(Vec::new()),
            quiet: true,
        }
    }

    /// Every message sent so far
    #[must_use]
    pub fn transcript(&self) -> Vec<OutgoingMessage> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if !self.quiet {
            println!("[#{}] {}", message.channel_id, message.content());
        }
        tracing::debug!(channel_id = %message.channel_id, "console message sent");

        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(message);
        }
        Ok(())
    }
}
