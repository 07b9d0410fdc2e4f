//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use voice_commander::channels::{ChannelHandle, ConsoleChannel};
use voice_commander::commands::{
    Author, GuildRef, Player, PlayerHandle, PlayerResolver, VoiceChannelRef,
};
use voice_commander::config::VoiceConfig;
use voice_commander::voice::{PcmAudio, Recognizer};
use voice_commander::{Error, Result};

/// Scripted recognizer reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(&'static str),
    /// Text returned only after a delay, holding that speaker's flush
    Slow(Duration, &'static str),
    Unrecognized,
    Unavailable,
}

/// Recognizer that plays back scripted replies, then `Unrecognized`
#[derive(Default)]
pub struct MockRecognizer {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockRecognizer {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Sleep this long in every call, after the reply is picked
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(&self, _audio: PcmAudio<'_>) -> Result<String> {
        let reply = self.replies.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Text(text)) => voice_commander::voice::normalize_transcript(text),
            Some(Reply::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                voice_commander::voice::normalize_transcript(text)
            }
            Some(Reply::Unavailable) => Err(Error::ServiceUnavailable("mock outage".to_string())),
            Some(Reply::Unrecognized) | None => Err(Error::Unrecognized),
        }
    }
}

#[derive(Debug)]
pub struct MockPlayer {
    pub guild: u64,
    pub channel: u64,
}

impl Player for MockPlayer {
    fn guild_id(&self) -> u64 {
        self.guild
    }

    fn voice_channel_id(&self) -> u64 {
        self.channel
    }
}

/// Player resolver that needs the author to be in a voice channel
#[derive(Default)]
pub struct MockPlayers {
    pub summons: AtomicUsize,
}

#[async_trait]
impl PlayerResolver for MockPlayers {
    async fn resolve(
        &self,
        guild: &GuildRef,
        voice_channel: Option<&VoiceChannelRef>,
    ) -> Result<PlayerHandle> {
        let channel = voice_channel.ok_or_else(|| {
            Error::VoiceContextMissing("음성 채널에 먼저 들어가 주세요.".to_string())
        })?;
        Ok(Arc::new(MockPlayer {
            guild: guild.id,
            channel: channel.id,
        }))
    }

    async fn summon(&self, _guild: &GuildRef, _author: &Author) -> Result<()> {
        self.summons.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Small, fast voice settings: mono 16kHz, 100ms chunks
pub fn test_voice_config() -> VoiceConfig {
    VoiceConfig {
        wake_phrase: "뮤직봇".to_string(),
        chunk_duration: Duration::from_millis(100),
        min_audio_length: 64,
        max_buffer_seconds: 1.0,
        sample_rate: 16_000,
        channels: 1,
        queue_capacity: 8,
        announce_wake: true,
    }
}

pub fn test_guild() -> GuildRef {
    GuildRef {
        id: 1,
        name: "test guild".to_string(),
    }
}

pub fn voice_room() -> VoiceChannelRef {
    VoiceChannelRef {
        id: 99,
        name: "음악방".to_string(),
    }
}

/// A quiet console surface and a handle bound to `#general`
pub fn console() -> (Arc<ConsoleChannel>, ChannelHandle) {
    let console = Arc::new(ConsoleChannel::quiet());
    let handle = ChannelHandle::new(console.clone(), "general");
    (console, handle)
}

/// Contents of every message the console received
pub fn sent(console: &ConsoleChannel) -> Vec<String> {
    console.transcript().iter().map(|m| m.content()).collect()
}

/// Poll until `done` holds, failing the test after `limit`
pub async fn eventually(limit: Duration, mut done: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(limit, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within {limit:?}");
}
