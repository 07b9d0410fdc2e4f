//! Audio transport boundary
//!
//! The voice transport owns the connection and the codec. It hands decoded PCM
//! to an [`AudioSink`] from its own execution context (often a plain thread),
//! and reports when recording has finished.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use super::SpeakerId;
use crate::{Error, Result};

/// Receives PCM frames from a transport
///
/// `write` may be called from any thread at any rate and must not block.
pub trait AudioSink: Send + Sync {
    /// Deliver one frame of interleaved 16-bit PCM for `speaker`
    fn write(&self, frame: &[u8], speaker: SpeakerId);

    /// Release all buffered state; no further frames are accepted
    fn cleanup(&self);
}

/// Called once when a transport stops recording, with the error that ended it
pub type RecordingFinished = Box<dyn FnOnce(Option<Error>) + Send + 'static>;

/// A voice connection that can record into a sink
pub trait AudioTransport: Send + Sync {
    /// Whether the underlying voice connection is usable
    fn is_connected(&self) -> bool;

    /// Start delivering frames to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if recording cannot start
    fn start_recording(&self, sink: Arc<dyn AudioSink>, on_finished: RecordingFinished)
    -> Result<()>;

    /// Stop delivering frames; triggers the `on_finished` callback
    fn stop_recording(&self);
}

/// Frame length used by Discord voice (20ms)
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Streams a WAV file into a sink as if one speaker were talking
///
/// Frames are written from a dedicated thread, paced in real time unless
/// pacing is disabled.
pub struct WavFileTransport {
    pcm: Arc<Vec<u8>>,
    frame_bytes: usize,
    speaker: SpeakerId,
    sample_rate: u32,
    channels: u16,
    paced: bool,
    stop: Arc<AtomicBool>,
    played_tx: Arc<watch::Sender<bool>>,
    on_finished: std::sync::Mutex<Option<RecordingFinished>>,
}

impl WavFileTransport {
    /// Load a 16-bit PCM WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not 16-bit integer PCM
    pub fn open(path: &Path, speaker: SpeakerId) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file), speaker)
    }

    /// Load 16-bit PCM WAV data from any reader
    ///
    /// # Errors
    ///
    /// Returns error if the data is not 16-bit integer PCM WAV
    pub fn from_reader<R: Read>(reader: R, speaker: SpeakerId) -> Result<Self> {
        let mut wav = hound::WavReader::new(reader).map_err(|e| Error::Audio(e.to_string()))?;
        let spec = wav.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(Error::Audio(format!(
                "expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let mut pcm = Vec::with_capacity(usize::try_from(wav.len()).unwrap_or(0) * 2);
        for sample in wav.samples::<i16>() {
            let sample = sample.map_err(|e| Error::Audio(e.to_string()))?;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        let samples_per_frame = (spec.sample_rate / 50) as usize * usize::from(spec.channels);
        tracing::debug!(
            bytes = pcm.len(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "loaded wav for replay"
        );

        let mut transport = Self::from_pcm(pcm, samples_per_frame * 2, speaker);
        transport.sample_rate = spec.sample_rate;
        transport.channels = spec.channels;
        Ok(transport)
    }

    /// Wrap raw interleaved PCM, split into frames of `frame_bytes`
    #[must_use]
    pub fn from_pcm(pcm: Vec<u8>, frame_bytes: usize, speaker: SpeakerId) -> Self {
        let (played_tx, _) = watch::channel(false);
        Self {
            pcm: Arc::new(pcm),
            frame_bytes: frame_bytes.max(2),
            speaker,
            sample_rate: 48_000,
            channels: 2,
            paced: true,
            stop: Arc::new(AtomicBool::new(false)),
            played_tx: Arc::new(played_tx),
            on_finished: std::sync::Mutex::new(None),
        }
    }

    /// Sample rate of the loaded audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the loaded audio
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Write frames as fast as possible instead of in real time
    #[must_use]
    pub const fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Wait until every frame of the file has been written
    pub async fn played(&self) {
        let mut rx = self.played_tx.subscribe();
        // Sender lives in self, so wait_for only fails if it is dropped
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl AudioTransport for WavFileTransport {
    fn is_connected(&self) -> bool {
        true
    }

    fn start_recording(
        &self,
        sink: Arc<dyn AudioSink>,
        on_finished: RecordingFinished,
    ) -> Result<()> {
        if let Ok(mut slot) = self.on_finished.lock() {
            if slot.is_some() {
                return Err(Error::Audio("already recording".to_string()));
            }
            *slot = Some(on_finished);
        }

        self.stop.store(false, Ordering::Release);
        self.played_tx.send_replace(false);
        let pcm = Arc::clone(&self.pcm);
        let stop = Arc::clone(&self.stop);
        let played_tx = Arc::clone(&self.played_tx);
        let frame_bytes = self.frame_bytes;
        let speaker = self.speaker;
        let paced = self.paced;

        std::thread::Builder::new()
            .name("wav-transport".to_string())
            .spawn(move || {
                for frame in pcm.chunks(frame_bytes) {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    sink.write(frame, speaker);
                    if paced {
                        std::thread::sleep(FRAME_DURATION);
                    }
                }
                played_tx.send_replace(true);
                tracing::debug!(speaker, "wav replay finished");
            })?;

        Ok(())
    }

    fn stop_recording(&self) {
        self.stop.store(true, Ordering::Release);
        let callback = self.on_finished.lock().ok().and_then(|mut slot| slot.take());
        if let Some(callback) = callback {
            callback(None);
        }
    }
}
