//! Voice listening
//!
//! Transports push PCM frames into a per-session [`ChunkScheduler`], which
//! buffers them per speaker and hands due chunks to the session's consumer
//! task over a bounded queue. The consumer runs recognition, parsing and
//! dispatch through a [`VoicePipeline`]. [`SessionRegistry`] owns the
//! sessions, one per guild.

mod buffer;
mod pipeline;
mod recognition;
mod scheduler;
mod session;
mod stt;
mod transport;

pub use buffer::{FlushPermit, SpeakerBuffer, SpeakerId};
pub use pipeline::{ChunkOutcome, SessionTarget, VoicePipeline};
pub use recognition::{
    PcmAudio, Recognizer, SAMPLE_WIDTH, TimeoutRecognizer, normalize_transcript, pcm_to_wav,
};
pub use scheduler::{ChunkScheduler, FlushOutcome, FlushRequest};
pub use session::SessionRegistry;
pub use stt::CloudRecognizer;
pub use transport::{AudioSink, AudioTransport, FRAME_DURATION, RecordingFinished, WavFileTransport};
