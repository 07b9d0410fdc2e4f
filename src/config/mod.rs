//! Configuration management for the voice command gateway
//!
//! Values resolve env > TOML file > defaults.

pub mod file;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::voice::SAMPLE_WIDTH;
use crate::{Error, Result};
use file::ConfigFile;

/// Default wake phrase when `BOT_NAME` is not set
pub const DEFAULT_WAKE_PHRASE: &str = "뮤직봇";

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Voice capture and chunking
    pub voice: VoiceConfig,

    /// Speech-to-text backend
    pub stt: SttConfig,

    /// Discord text surface
    pub discord: DiscordConfig,

    /// Command table overrides
    pub commands: CommandsConfig,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Phrase that addresses the bot, stored lowercase
    pub wake_phrase: String,

    /// Time between flushes of one speaker's buffer
    pub chunk_duration: Duration,

    /// Snapshots shorter than this many bytes are dropped without recognition
    pub min_audio_length: usize,

    /// Upper bound of buffered audio per speaker
    pub max_buffer_seconds: f64,

    /// PCM sample rate delivered by the transport (Discord: 48kHz)
    pub sample_rate: u32,

    /// PCM channel count delivered by the transport (Discord: stereo)
    pub channels: u16,

    /// Bounded flush queue between producer and consumer
    pub queue_capacity: usize,

    /// Send an acknowledgement when the wake phrase is heard
    pub announce_wake: bool,
}

impl VoiceConfig {
    /// Ring buffer capacity in bytes:
    /// `sample_rate × max_buffer_seconds × channels × SAMPLE_WIDTH`
    ///
    /// Always a whole number of audio frames, so eviction never splits a
    /// sample.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn buffer_capacity(&self) -> usize {
        let frames = (f64::from(self.sample_rate) * self.max_buffer_seconds).max(1.0) as usize;
        frames * self.frame_bytes()
    }

    /// Bytes in one audio frame (one sample for every channel)
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels.max(1)) * usize::from(SAMPLE_WIDTH)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_phrase: DEFAULT_WAKE_PHRASE.to_string(),
            chunk_duration: Duration::from_secs(1),
            min_audio_length: 4800,
            max_buffer_seconds: 5.0,
            sample_rate: 48_000,
            channels: 2,
            queue_capacity: 64,
            announce_wake: true,
        }
    }
}

/// Speech-to-text backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// `OpenAI` Whisper transcription API
    #[default]
    Whisper,
    /// Deepgram pre-recorded API
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug)]
pub struct SttConfig {
    pub provider: SttProvider,

    /// Model name (e.g. "whisper-1", "nova-2")
    pub model: String,

    /// Language hint sent with each request
    pub language: String,

    /// API key for the selected provider
    pub api_key: Option<SecretString>,

    /// Optional per-request timeout; unset keeps the call unbounded
    pub timeout: Option<Duration>,
}

/// Discord configuration
#[derive(Debug)]
pub struct DiscordConfig {
    pub token: Option<SecretString>,

    /// Rich formatting: render responses as embeds
    pub embeds: bool,

    /// Marker prepended to reconstructed text commands
    pub command_prefix: String,

    /// The bot's own user id; its audio is never buffered
    pub bot_user_id: Option<u64>,
}

/// Command table overrides
#[derive(Debug, Clone, Default)]
pub struct CommandsConfig {
    /// Extra (trigger phrase, canonical command) entries
    pub phrases: Vec<(String, String)>,

    /// Alias → canonical command
    pub aliases: HashMap<String, String>,
}

impl Config {
    /// Load configuration from the environment and the default config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from the environment and an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a value is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(file::read_config_file(path)?, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = VoiceConfig::default();

        let wake_phrase = env("BOT_NAME")
            .or(fc.voice.wake_phrase)
            .unwrap_or(defaults.wake_phrase)
            .trim()
            .to_lowercase();
        if wake_phrase.is_empty() {
            return Err(Error::Config("wake phrase must not be empty".to_string()));
        }

        let chunk_secs = parse_env(&env, "VOICE_CHUNK_SECS")?
            .or(fc.voice.chunk_duration_secs)
            .unwrap_or_else(|| defaults.chunk_duration.as_secs_f64());
        let chunk_duration = Duration::try_from_secs_f64(chunk_secs)
            .map_err(|e| Error::Config(format!("invalid chunk duration {chunk_secs}: {e}")))?;

        let max_buffer_seconds = parse_env(&env, "VOICE_MAX_BUFFER_SECS")?
            .or(fc.voice.max_buffer_seconds)
            .unwrap_or(defaults.max_buffer_seconds);
        if !max_buffer_seconds.is_finite() || max_buffer_seconds <= 0.0 {
            return Err(Error::Config(format!(
                "max buffer seconds must be positive, got {max_buffer_seconds}"
            )));
        }

        let voice = VoiceConfig {
            wake_phrase,
            chunk_duration,
            min_audio_length: parse_env(&env, "VOICE_MIN_AUDIO_BYTES")?
                .or(fc.voice.min_audio_length)
                .unwrap_or(defaults.min_audio_length),
            max_buffer_seconds,
            sample_rate: fc.voice.sample_rate.unwrap_or(defaults.sample_rate),
            channels: fc.voice.channels.unwrap_or(defaults.channels),
            queue_capacity: fc
                .voice
                .queue_capacity
                .unwrap_or(defaults.queue_capacity)
                .max(1),
            announce_wake: fc.voice.announce_wake.unwrap_or(defaults.announce_wake),
        };

        let provider = match env("STT_PROVIDER").or(fc.stt.provider) {
            Some(p) => p.parse()?,
            None => SttProvider::default(),
        };
        let key_var = match provider {
            SttProvider::Whisper => "OPENAI_API_KEY",
            SttProvider::Deepgram => "DEEPGRAM_API_KEY",
        };
        let default_model = match provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        };

        let stt = SttConfig {
            provider,
            model: env("STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| default_model.to_string()),
            language: env("STT_LANGUAGE")
                .or(fc.stt.language)
                .unwrap_or_else(|| "ko".to_string()),
            api_key: env(key_var).or(fc.stt.api_key).map(SecretString::from),
            timeout: fc.stt.timeout_secs.map(Duration::from_secs),
        };

        let discord = DiscordConfig {
            token: env("DISCORD_TOKEN")
                .or(fc.discord.token)
                .map(SecretString::from),
            embeds: fc.discord.embeds.unwrap_or(true),
            command_prefix: env("COMMAND_PREFIX")
                .or(fc.discord.command_prefix)
                .unwrap_or_else(|| "!".to_string()),
            bot_user_id: fc.discord.bot_user_id,
        };

        let commands = CommandsConfig {
            phrases: fc.commands.into_iter().collect(),
            aliases: fc.aliases.into_iter().collect(),
        };

        Ok(Self {
            voice,
            stt,
            discord,
            commands,
        })
    }
}

/// Parse an optional environment value, rejecting malformed numbers
fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}
