//! Consumer half of the voice pipeline
//!
//! Each session runs one consumer task that drains the scheduler's flush
//! queue. Every request is processed on its own task, so speakers are handled
//! in parallel while each speaker's single-flight permit stays held until its
//! request is done.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use super::recognition::{PcmAudio, Recognizer};
use super::scheduler::FlushRequest;
use super::SpeakerId;
use crate::Error;
use crate::channels::ChannelHandle;
use crate::commands::{
    Author, CommandDispatcher, CommandParser, DispatchContext, DispatchOutcome, GuildRef,
    MemberDirectory, VoiceChannelRef,
};
use crate::config::VoiceConfig;

/// Where a session's commands come from and go to
#[derive(Debug, Clone)]
pub struct SessionTarget {
    pub id: Uuid,
    pub guild: GuildRef,

    /// Text channel for acknowledgements and responses
    pub channel: ChannelHandle,

    /// Voice channel being listened to
    pub voice_channel: Option<VoiceChannelRef>,

    alive: Arc<AtomicBool>,
}

impl SessionTarget {
    #[must_use]
    pub fn new(guild: GuildRef, channel: ChannelHandle, voice_channel: Option<VoiceChannelRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild,
            channel,
            voice_channel,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the session still exists
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the session ended; pending results are discarded
    pub fn end(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// What happened to one flushed chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Nothing intelligible in the audio
    Unrecognized,
    /// Recognition failed
    RecognitionFailed,
    /// Recognized text was not addressed to the bot, or matched no command
    NotACommand(String),
    /// Session ended before the command could run
    Stale,
    /// Command was dispatched
    Dispatched(DispatchOutcome),
    /// Dispatch failed before the handler ran
    DispatchFailed(String),
}

/// Recognition, parsing and dispatch for flushed chunks
pub struct VoicePipeline {
    recognizer: Arc<dyn Recognizer>,
    parser: CommandParser,
    dispatcher: CommandDispatcher,
    members: Option<Arc<dyn MemberDirectory>>,
    channels: u16,
    sample_rate: u32,
    announce_wake: bool,
}

impl VoicePipeline {
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        parser: CommandParser,
        dispatcher: CommandDispatcher,
        voice: &VoiceConfig,
    ) -> Self {
        Self {
            recognizer,
            parser,
            dispatcher,
            members: None,
            channels: voice.channels,
            sample_rate: voice.sample_rate,
            announce_wake: voice.announce_wake,
        }
    }

    /// Resolve speakers through a member directory
    #[must_use]
    pub fn with_members(mut self, members: Arc<dyn MemberDirectory>) -> Self {
        self.members = Some(members);
        self
    }

    #[must_use]
    pub const fn parser(&self) -> &CommandParser {
        &self.parser
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Start the consumer task for one session
    ///
    /// The task ends once the queue is closed and every in-flight request
    /// has finished.
    pub fn spawn(
        self: Arc<Self>,
        mut queue: mpsc::Receiver<FlushRequest>,
        target: SessionTarget,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            loop {
                tokio::select! {
                    request = queue.recv() => {
                        let Some(request) = request else { break };
                        let pipeline = Arc::clone(&self);
                        let target = target.clone();
                        tasks.spawn(async move {
                            let outcome = pipeline.process(&request, &target).await;
                            tracing::trace!(speaker = request.speaker, ?outcome, "chunk processed");
                        });
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "voice chunk task failed");
                        }
                    }
                }
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "voice chunk task failed");
                }
            }
            tracing::debug!(guild = target.guild.id, session = %target.id, "voice consumer stopped");
        })
    }

    /// Recognize one chunk and run the command it contains
    pub async fn process(&self, request: &FlushRequest, target: &SessionTarget) -> ChunkOutcome {
        let speaker = request.speaker;
        let since_flush = || Instant::now().saturating_duration_since(request.flushed_at);
        if !target.is_alive() {
            tracing::debug!(speaker, "session ended, chunk skipped");
            return ChunkOutcome::Stale;
        }

        let audio = PcmAudio {
            data: &request.audio,
            channels: self.channels,
            sample_rate: self.sample_rate,
        };
        tracing::trace!(
            speaker,
            seconds = audio.duration().as_secs_f64(),
            queued = ?since_flush(),
            "recognizing chunk"
        );

        let text = match self.recognizer.recognize(audio).await {
            Ok(text) => text,
            Err(Error::Unrecognized) => {
                tracing::trace!(speaker, "no speech recognized");
                return ChunkOutcome::Unrecognized;
            }
            Err(e) => {
                tracing::warn!(
                    speaker,
                    backend = self.recognizer.name(),
                    error = %e,
                    "speech recognition failed, chunk dropped"
                );
                return ChunkOutcome::RecognitionFailed;
            }
        };

        tracing::debug!(
            speaker,
            text = %text,
            latency = ?since_flush(),
            "recognized speech"
        );

        if !self.parser.is_voice_command(&text) {
            return ChunkOutcome::NotACommand(text);
        }
        if !target.is_alive() {
            return ChunkOutcome::Stale;
        }

        let author = self.author(speaker, target).await;

        if self.announce_wake {
            let ack = format!("🎤 {} 불렀나요?", author.mention());
            if let Err(e) = target.channel.send(ack, None).await {
                tracing::warn!(error = %e, "failed to send wake acknowledgement");
            }
        }

        let Some(parsed) = self.parser.parse(&text) else {
            tracing::debug!(speaker, text = %text, "wake phrase without a known command");
            return ChunkOutcome::NotACommand(text);
        };

        if !target.is_alive() {
            tracing::debug!(command = %parsed.command, "session ended, discarding command");
            return ChunkOutcome::Stale;
        }

        let ctx = DispatchContext {
            author,
            channel: target.channel.clone(),
            guild: target.guild.clone(),
            permissions: None,
        };

        match self
            .dispatcher
            .dispatch(&parsed.command, &parsed.args, &ctx)
            .await
        {
            Ok(outcome) => ChunkOutcome::Dispatched(outcome),
            Err(e) => {
                tracing::warn!(command = %parsed.command, error = %e, "voice command failed");
                ChunkOutcome::DispatchFailed(e.to_string())
            }
        }
    }

    async fn author(&self, speaker: SpeakerId, target: &SessionTarget) -> Author {
        if let Some(members) = &self.members {
            if let Some(author) = members.member(&target.guild, speaker).await {
                return author;
            }
            tracing::debug!(speaker, "speaker not found in member directory");
        }

        Author {
            id: speaker,
            name: format!("user-{speaker}"),
            voice_channel: target.voice_channel.clone(),
        }
    }
}

impl std::fmt::Debug for VoicePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePipeline")
            .field("recognizer", &self.recognizer.name())
            .field("parser", &self.parser)
            .field("dispatcher", &self.dispatcher)
            .field("announce_wake", &self.announce_wake)
            .finish_non_exhaustive()
    }
}
