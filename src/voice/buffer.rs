//! Per-speaker audio accumulation
//!
//! A `SpeakerBuffer` is a bounded ring of raw PCM packets for one speaker,
//! capped in bytes. Once full, new packets evict the oldest ones, so the
//! buffer never holds more than `max_buffer_seconds` of audio no matter how
//! large the transport's packets are.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Identifier of a speaker in a voice channel (platform user id)
pub type SpeakerId = u64;

/// Bounded, time-windowed audio accumulator for one speaker
#[derive(Debug)]
pub struct SpeakerBuffer {
    frames: VecDeque<Vec<u8>>,
    capacity: usize,
    byte_len: usize,
    last_flush: Instant,
    in_flight: Arc<AtomicBool>,
}

impl SpeakerBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    ///
    /// `now` seeds the flush clock so the first chunk is measured from the
    /// speaker's first frame.
    #[must_use]
    pub fn new(capacity: usize, now: Instant) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
            byte_len: 0,
            last_flush: now,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append a packet, evicting the oldest ones until it fits
    ///
    /// A packet larger than the whole buffer keeps only its newest
    /// `capacity` bytes. Returns `true` if any audio was evicted.
    pub fn push(&mut self, frame: &[u8]) -> bool {
        let mut evicted = false;
        let frame = if frame.len() > self.capacity {
            evicted = true;
            &frame[frame.len() - self.capacity..]
        } else {
            frame
        };

        while self.byte_len + frame.len() > self.capacity {
            let Some(old) = self.frames.pop_front() else {
                break;
            };
            self.byte_len -= old.len();
            evicted = true;
        }

        self.byte_len += frame.len();
        self.frames.push_back(frame.to_vec());
        evicted
    }

    /// Number of buffered packets
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total buffered bytes
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Maximum number of bytes retained
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// When this buffer was last flushed (or created)
    #[must_use]
    pub const fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Whether a chunk's worth of time has passed since the last flush
    #[must_use]
    pub fn is_due(&self, now: Instant, chunk_duration: Duration) -> bool {
        now.saturating_duration_since(self.last_flush) >= chunk_duration
    }

    /// Concatenate every buffered packet, clear the buffer and restart the
    /// flush clock at `now`
    pub fn take_snapshot(&mut self, now: Instant) -> Vec<u8> {
        let mut snapshot = Vec::with_capacity(self.byte_len);
        for frame in self.frames.drain(..) {
            snapshot.extend_from_slice(&frame);
        }
        self.byte_len = 0;
        self.last_flush = now;
        snapshot
    }

    /// Drop every buffered packet without touching the flush clock
    pub fn clear(&mut self) {
        self.frames.clear();
        self.byte_len = 0;
    }

    /// Whether a flush for this speaker is currently in flight
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Try to take the speaker's single-flight flag
    ///
    /// Returns `None` if another flush still holds it.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FlushPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlushPermit {
                flag: Arc::clone(&self.in_flight),
            })
    }
}

/// Scoped hold on a speaker's single-flight flag
///
/// Dropping the permit releases the flag, whichever way the flush ends.
#[derive(Debug)]
pub struct FlushPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for FlushPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let mut buffer = SpeakerBuffer::new(6, Instant::now());

        assert!(!buffer.push(&[0; 2]));
        for i in 1..5u8 {
            buffer.push(&[i; 2]);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.byte_len(), 6);
        assert_eq!(buffer.take_snapshot(Instant::now()), vec![2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_capacity_is_counted_in_bytes() {
        let mut buffer = SpeakerBuffer::new(10, Instant::now());

        buffer.push(&[1; 4]);
        buffer.push(&[2; 4]);
        assert!(buffer.push(&[3; 4]));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.byte_len(), 8);
        assert!(buffer.byte_len() <= buffer.capacity());
    }

    #[test]
    fn test_oversized_packet_keeps_newest_bytes() {
        let mut buffer = SpeakerBuffer::new(4, Instant::now());
        buffer.push(&[9; 2]);

        assert!(buffer.push(&[1, 2, 3, 4, 5, 6]));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.take_snapshot(Instant::now()), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_snapshot_clears_and_restarts_clock() {
        let start = Instant::now();
        let mut buffer = SpeakerBuffer::new(10, start);
        buffer.push(&[1, 2, 3]);

        let later = start + Duration::from_secs(2);
        assert!(buffer.is_due(later, Duration::from_secs(1)));

        let snapshot = buffer.take_snapshot(later);
        assert_eq!(snapshot, vec![1, 2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_flush(), later);
        assert!(!buffer.is_due(later, Duration::from_secs(1)));
    }

    #[test]
    fn test_permit_is_single_flight() {
        let buffer = SpeakerBuffer::new(4, Instant::now());

        let permit = buffer.try_acquire().expect("first acquire succeeds");
        assert!(buffer.is_flushing());
        assert!(buffer.try_acquire().is_none());

        drop(permit);
        assert!(!buffer.is_flushing());
        assert!(buffer.try_acquire().is_some());
    }

    #[test]
    fn test_zero_capacity_still_holds_one_byte() {
        let mut buffer = SpeakerBuffer::new(0, Instant::now());
        buffer.push(&[1]);
        buffer.push(&[2, 3]);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.take_snapshot(Instant::now()), vec![3]);
    }
}
