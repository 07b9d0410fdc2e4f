//! TOML configuration file loading
//!
//! Supports `~/.config/voice-commander/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Voice capture and chunking configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Discord text surface configuration
    #[serde(default)]
    pub discord: DiscordFileConfig,

    /// Extra trigger phrases mapped to canonical commands
    #[serde(default)]
    pub commands: BTreeMap<String, String>,

    /// Command aliases mapped to canonical commands
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Phrase that addresses the bot (e.g. "뮤직봇")
    pub wake_phrase: Option<String>,

    /// Seconds between flushes of a speaker's buffer
    pub chunk_duration_secs: Option<f64>,

    /// Snapshots shorter than this many bytes skip recognition
    pub min_audio_length: Option<usize>,

    /// Upper bound of buffered audio per speaker, in seconds
    pub max_buffer_seconds: Option<f64>,

    /// PCM sample rate delivered by the transport
    pub sample_rate: Option<u32>,

    /// PCM channel count delivered by the transport
    pub channels: Option<u16>,

    /// Capacity of the flush queue between producer and consumer
    pub queue_capacity: Option<usize>,

    /// Acknowledge the wake phrase in the text channel
    pub announce_wake: Option<bool>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Backend: "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub api_key: Option<String>,
    /// Per-request timeout in seconds (unset = no timeout)
    pub timeout_secs: Option<u64>,
}

/// Discord configuration
#[derive(Debug, Default, Deserialize)]
pub struct DiscordFileConfig {
    pub token: Option<String>,
    /// Render responses as embeds
    pub embeds: Option<bool>,
    pub command_prefix: Option<String>,
    /// The bot's own user id, whose audio is ignored
    pub bot_user_id: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Read and parse a config file at an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> crate::Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/voice-commander/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-commander").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [voice]
            wake_phrase = "디제이"
            chunk_duration_secs = 1.5

            [commands]
            "틀어" = "play"
            "#,
        )
        .unwrap();

        assert_eq!(fc.voice.wake_phrase.as_deref(), Some("디제이"));
        assert_eq!(fc.voice.chunk_duration_secs, Some(1.5));
        assert!(fc.voice.min_audio_length.is_none());
        assert_eq!(fc.commands.get("틀어").map(String::as_str), Some("play"));
        assert!(fc.aliases.is_empty());
    }

    #[test]
    fn test_read_config_file_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "voice = [").unwrap();

        assert!(matches!(
            read_config_file(&path),
            Err(crate::Error::Toml(_))
        ));
    }
}
