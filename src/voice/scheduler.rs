//! Chunk scheduling
//!
//! The scheduler is the producer half of the voice pipeline. Transports call
//! [`ChunkScheduler::append`] from their own thread; when a speaker's chunk is
//! due the buffered audio is snapshotted and pushed onto a bounded queue that
//! the consumer task drains. Nothing here blocks on the consumer: a full or
//! closed queue drops the chunk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::buffer::{FlushPermit, SpeakerBuffer, SpeakerId};
use super::transport::AudioSink;
use crate::config::VoiceConfig;

/// A speaker's snapshot, ready for recognition
///
/// Holds the speaker's single-flight permit; the next flush for the same
/// speaker cannot start until this request is dropped.
#[derive(Debug)]
pub struct FlushRequest {
    /// Who was speaking
    pub speaker: SpeakerId,

    /// Interleaved 16-bit PCM
    pub audio: Vec<u8>,

    /// When the snapshot was taken
    pub flushed_at: Instant,

    _permit: FlushPermit,
}

/// What a flush request resulted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Chunk duration has not elapsed yet
    NotDue,
    /// A flush for this speaker is still in flight; nothing was touched
    Busy,
    /// Snapshot was below the minimum length and skipped recognition
    Discarded,
    /// Snapshot was queued for the consumer
    Submitted,
    /// Snapshot was taken but the consumer was full or gone
    Dropped,
    /// Unknown speaker, ignored speaker, or the sink was cleaned up
    Ignored,
}

/// Per-session producer: speaker buffers plus the flush queue
pub struct ChunkScheduler {
    chunk_duration: Duration,
    min_audio_length: usize,
    capacity: usize,
    ignored_speaker: Option<SpeakerId>,
    speakers: RwLock<HashMap<SpeakerId, Arc<Mutex<SpeakerBuffer>>>>,
    queue: RwLock<Option<mpsc::Sender<FlushRequest>>>,
    recording: AtomicBool,
}

impl ChunkScheduler {
    /// Create a scheduler and the receiving end of its flush queue
    #[must_use]
    pub fn new(config: &VoiceConfig) -> (Self, mpsc::Receiver<FlushRequest>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let scheduler = Self {
            chunk_duration: config.chunk_duration,
            min_audio_length: config.min_audio_length,
            capacity: config.buffer_capacity(),
            ignored_speaker: None,
            speakers: RwLock::new(HashMap::new()),
            queue: RwLock::new(Some(tx)),
            recording: AtomicBool::new(true),
        };
        (scheduler, rx)
    }

    /// Never buffer audio from this speaker (the bot itself)
    #[must_use]
    pub const fn ignore_speaker(mut self, speaker: Option<SpeakerId>) -> Self {
        self.ignored_speaker = speaker;
        self
    }

    /// Append a frame for `speaker`, flushing if its chunk is due
    pub fn append(&self, frame: &[u8], speaker: SpeakerId) -> FlushOutcome {
        self.append_at(frame, speaker, Instant::now())
    }

    /// Append a frame using an explicit clock reading
    pub fn append_at(&self, frame: &[u8], speaker: SpeakerId, now: Instant) -> FlushOutcome {
        if !self.recording.load(Ordering::Acquire) || self.ignored_speaker == Some(speaker) {
            return FlushOutcome::Ignored;
        }

        let Some(buffer) = self.buffer_for(speaker, now) else {
            return FlushOutcome::Ignored;
        };

        let due = match buffer.lock() {
            Ok(mut buf) => {
                if buf.push(frame) {
                    tracing::trace!(speaker, "buffer full, evicted oldest audio");
                }
                buf.is_due(now, self.chunk_duration)
            }
            Err(_) => return FlushOutcome::Ignored,
        };

        if due {
            self.request_flush_at(speaker, now)
        } else {
            FlushOutcome::NotDue
        }
    }

    /// Flush `speaker` now, regardless of the chunk clock
    pub fn request_flush(&self, speaker: SpeakerId) -> FlushOutcome {
        self.request_flush_at(speaker, Instant::now())
    }

    /// Flush `speaker` using an explicit clock reading
    pub fn request_flush_at(&self, speaker: SpeakerId, now: Instant) -> FlushOutcome {
        let Some(buffer) = self.existing_buffer(speaker) else {
            return FlushOutcome::Ignored;
        };

        let (audio, permit) = {
            let Ok(mut buf) = buffer.lock() else {
                return FlushOutcome::Ignored;
            };
            let Some(permit) = buf.try_acquire() else {
                tracing::trace!(speaker, "flush already in flight, skipping");
                return FlushOutcome::Busy;
            };
            (buf.take_snapshot(now), permit)
        };

        if audio.len() < self.min_audio_length {
            tracing::trace!(speaker, bytes = audio.len(), "chunk too short, discarded");
            return FlushOutcome::Discarded;
        }

        let Some(queue) = self.queue.read().ok().and_then(|q| q.clone()) else {
            return FlushOutcome::Dropped;
        };

        let bytes = audio.len();
        let request = FlushRequest {
            speaker,
            audio,
            flushed_at: now,
            _permit: permit,
        };

        match queue.try_send(request) {
            Ok(()) => {
                tracing::debug!(speaker, bytes, "chunk submitted for recognition");
                FlushOutcome::Submitted
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(speaker, bytes, "flush queue full, chunk dropped");
                FlushOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(speaker, "flush queue closed, chunk dropped");
                FlushOutcome::Dropped
            }
        }
    }

    /// Flush every speaker now, regardless of the chunk clock
    ///
    /// Returns the speakers that were skipped because their previous flush
    /// is still in flight; their audio stays buffered.
    pub fn flush_all(&self) -> Vec<SpeakerId> {
        let speakers: Vec<SpeakerId> = self
            .speakers
            .read()
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default();

        speakers
            .into_iter()
            .filter(|&speaker| {
                let outcome = self.request_flush(speaker);
                tracing::trace!(speaker, ?outcome, "final flush");
                outcome == FlushOutcome::Busy
            })
            .collect()
    }

    /// Number of packets buffered for `speaker`
    #[must_use]
    pub fn buffered_frames(&self, speaker: SpeakerId) -> Option<usize> {
        self.existing_buffer(speaker)
            .and_then(|b| b.lock().ok().map(|buf| buf.len()))
    }

    /// Number of PCM bytes buffered for `speaker`
    #[must_use]
    pub fn buffered_bytes(&self, speaker: SpeakerId) -> Option<usize> {
        self.existing_buffer(speaker)
            .and_then(|b| b.lock().ok().map(|buf| buf.byte_len()))
    }

    /// When `speaker` was last flushed
    #[must_use]
    pub fn last_flush(&self, speaker: SpeakerId) -> Option<Instant> {
        self.existing_buffer(speaker)
            .and_then(|b| b.lock().ok().map(|buf| buf.last_flush()))
    }

    /// Whether a flush for `speaker` is in flight
    #[must_use]
    pub fn is_flushing(&self, speaker: SpeakerId) -> bool {
        self.existing_buffer(speaker)
            .and_then(|b| b.lock().ok().map(|buf| buf.is_flushing()))
            .unwrap_or(false)
    }

    /// Number of speakers with a buffer
    #[must_use]
    pub fn speaker_count(&self) -> usize {
        self.speakers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether the scheduler still accepts frames
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Stop accepting frames, drop every buffer and close the flush queue
    ///
    /// Requests already queued stay with the consumer.
    pub fn shutdown(&self) {
        self.recording.store(false, Ordering::Release);
        if let Ok(mut speakers) = self.speakers.write() {
            speakers.clear();
        }
        if let Ok(mut queue) = self.queue.write() {
            queue.take();
        }
    }

    fn existing_buffer(&self, speaker: SpeakerId) -> Option<Arc<Mutex<SpeakerBuffer>>> {
        self.speakers.read().ok()?.get(&speaker).cloned()
    }

    fn buffer_for(&self, speaker: SpeakerId, now: Instant) -> Option<Arc<Mutex<SpeakerBuffer>>> {
        if let Some(buffer) = self.existing_buffer(speaker) {
            return Some(buffer);
        }

        let mut speakers = self.speakers.write().ok()?;
        let buffer = speakers.entry(speaker).or_insert_with(|| {
            tracing::debug!(speaker, capacity_bytes = self.capacity, "new speaker buffer");
            Arc::new(Mutex::new(SpeakerBuffer::new(self.capacity, now)))
        });
        Some(Arc::clone(buffer))
    }
}

impl AudioSink for ChunkScheduler {
    fn write(&self, frame: &[u8], speaker: SpeakerId) {
        self.append(frame, speaker);
    }

    fn cleanup(&self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk: Duration, min_audio_length: usize) -> VoiceConfig {
        VoiceConfig {
            chunk_duration: chunk,
            min_audio_length,
            sample_rate: 4,
            max_buffer_seconds: 1.0,
            queue_capacity: 2,
            ..VoiceConfig::default()
        }
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let (scheduler, _rx) = ChunkScheduler::new(&config(Duration::from_secs(3600), 0));

        for _ in 0..100 {
            assert_eq!(scheduler.append(&[0u8; 8], 1), FlushOutcome::NotDue);
        }

        // 4 Hz stereo for one second is 16 bytes
        assert_eq!(scheduler.buffered_bytes(1), Some(16));
        assert_eq!(scheduler.buffered_frames(1), Some(2));
    }

    #[test]
    fn test_due_chunk_is_submitted_and_cleared() {
        let (scheduler, mut rx) = ChunkScheduler::new(&config(Duration::ZERO, 4));

        assert_eq!(scheduler.append(&[1u8; 8], 7), FlushOutcome::Submitted);
        assert_eq!(scheduler.buffered_frames(7), Some(0));

        let request = rx.try_recv().unwrap();
        assert_eq!(request.speaker, 7);
        assert_eq!(request.audio, vec![1u8; 8]);
        assert!(scheduler.is_flushing(7));

        drop(request);
        assert!(!scheduler.is_flushing(7));
    }

    #[test]
    fn test_ignored_speaker_is_not_buffered() {
        let (scheduler, _rx) = ChunkScheduler::new(&config(Duration::ZERO, 0));
        let scheduler = scheduler.ignore_speaker(Some(99));

        assert_eq!(scheduler.append(&[1u8; 8], 99), FlushOutcome::Ignored);
        assert_eq!(scheduler.speaker_count(), 0);
    }

    #[test]
    fn test_full_queue_drops_and_releases_flag() {
        let (scheduler, _rx) = ChunkScheduler::new(&VoiceConfig {
            queue_capacity: 1,
            ..config(Duration::ZERO, 0)
        });

        assert_eq!(scheduler.append(&[1u8; 4], 1), FlushOutcome::Submitted);
        assert_eq!(scheduler.append(&[1u8; 4], 2), FlushOutcome::Dropped);
        assert!(!scheduler.is_flushing(2));
    }

    #[test]
    fn test_shutdown_stops_intake() {
        let (scheduler, mut rx) = ChunkScheduler::new(&config(Duration::from_secs(3600), 0));
        scheduler.append(&[1u8; 4], 1);

        scheduler.shutdown();

        assert_eq!(scheduler.speaker_count(), 0);
        assert_eq!(scheduler.append(&[1u8; 4], 1), FlushOutcome::Ignored);
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.is_recording());
    }
}
