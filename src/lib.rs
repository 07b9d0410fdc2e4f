//! Voice Commander - spoken commands for a Discord music bot
//!
//! This library listens to a voice channel and turns speech into bot
//! commands:
//! - Per-speaker audio buffering and chunk scheduling
//! - Speech recognition through cloud backends
//! - Wake phrase detection and trigger phrase parsing
//! - Command dispatch to registered handlers
//! - Text channel adapters for responses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Audio transport (own thread)            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ write(frame, speaker)
//! ┌────────────────────▼────────────────────────────────┐
//! │   ChunkScheduler  │  SpeakerBuffer per speaker       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ bounded queue
//! ┌────────────────────▼────────────────────────────────┐
//! │   VoicePipeline: Recognizer → Parser → Dispatcher   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          Text channel  │  Discord  │  Console       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
