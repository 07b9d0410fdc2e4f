//! Recognition boundary
//!
//! Converts raw transport PCM into the container a speech service expects
//! and defines the contract every recognizer backend fulfils.

use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, Result};

/// Bytes per sample of the PCM the transport delivers
pub const SAMPLE_WIDTH: u16 = 2;

/// Raw interleaved 16-bit PCM plus its format
#[derive(Debug, Clone, Copy)]
pub struct PcmAudio<'a> {
    /// Little-endian interleaved samples
    pub data: &'a [u8],
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmAudio<'_> {
    /// Playback length of the audio
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        let frame_bytes = usize::from(self.channels.max(1)) * usize::from(SAMPLE_WIDTH);
        let frames = self.data.len() / frame_bytes;
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Speech-to-text service contract
///
/// Implementations return recognized text in lowercase, or fail with
/// [`Error::Unrecognized`] (expected, e.g. background noise) or
/// [`Error::ServiceUnavailable`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Recognize speech in a chunk of PCM
    async fn recognize(&self, audio: PcmAudio<'_>) -> Result<String>;
}

/// Wrap a recognizer so each call is abandoned after `timeout`
///
/// A timed-out call counts as [`Error::ServiceUnavailable`].
pub struct TimeoutRecognizer<R> {
    inner: R,
    timeout: Duration,
}

impl<R: Recognizer> TimeoutRecognizer<R> {
    /// Bound every call to `inner` by `timeout`
    #[must_use]
    pub const fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<R: Recognizer> Recognizer for TimeoutRecognizer<R> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn recognize(&self, audio: PcmAudio<'_>) -> Result<String> {
        tokio::time::timeout(self.timeout, self.inner.recognize(audio))
            .await
            .map_err(|_| {
                Error::ServiceUnavailable(format!(
                    "{} timed out after {:?}",
                    self.inner.name(),
                    self.timeout
                ))
            })?
    }
}

/// Convert interleaved little-endian 16-bit PCM to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(audio: PcmAudio<'_>) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: SAMPLE_WIDTH * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::with_capacity(audio.data.len() + 44));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        // A trailing odd byte cannot form a sample and is dropped
        for pair in audio.data.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Normalize a transcript; blank transcripts mean nothing was recognized
///
/// # Errors
///
/// Returns [`Error::Unrecognized`] if the transcript is blank
pub fn normalize_transcript(text: &str) -> Result<String> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        Err(Error::Unrecognized)
    } else {
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_pcm_to_wav_keeps_format_and_samples() {
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let wav = pcm_to_wav(PcmAudio {
            data: &data,
            channels: 2,
            sample_rate: 48_000,
        })
        .unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_duration() {
        let data = vec![0u8; 48_000 * 2 * 2];
        let audio = PcmAudio {
            data: &data,
            channels: 2,
            sample_rate: 48_000,
        };
        assert_eq!(audio.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_blank_transcript_is_unrecognized() {
        assert!(matches!(normalize_transcript("  "), Err(Error::Unrecognized)));
        assert_eq!(normalize_transcript(" 뮤직봇 SKIP ").unwrap(), "뮤직봇 skip");
    }

    struct Stalled;

    #[async_trait]
    impl Recognizer for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn recognize(&self, _audio: PcmAudio<'_>) -> Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_service_unavailable() {
        let recognizer = TimeoutRecognizer::new(Stalled, Duration::from_millis(10));
        let result = recognizer
            .recognize(PcmAudio {
                data: &[],
                channels: 2,
                sample_rate: 48_000,
            })
            .await;

        assert!(matches!(result, Err(Error::ServiceUnavailable(_))));
    }
}
