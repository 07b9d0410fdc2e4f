//! Listening sessions, one per guild

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::SpeakerId;
use super::pipeline::{SessionTarget, VoicePipeline};
use super::scheduler::{ChunkScheduler, FlushOutcome};
use super::transport::{AudioSink, AudioTransport, FRAME_DURATION};
use crate::channels::ChannelHandle;
use crate::commands::{GuildId, GuildRef, VoiceChannelRef};
use crate::config::VoiceConfig;
use crate::{Error, Result};

struct Session {
    target: SessionTarget,
    scheduler: Arc<ChunkScheduler>,
    transport: Arc<dyn AudioTransport>,
    consumer: JoinHandle<()>,
}

impl Session {
    /// Stop recording and drop every buffer; queued chunks are discarded
    fn cancel(self) {
        self.target.end();
        self.scheduler.cleanup();
        self.transport.stop_recording();
    }
}

type SessionMap = Mutex<HashMap<GuildId, Session>>;

/// Owns every active listening session
pub struct SessionRegistry {
    pipeline: Arc<VoicePipeline>,
    voice: VoiceConfig,
    ignored_speaker: Option<SpeakerId>,
    sessions: Arc<SessionMap>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(pipeline: Arc<VoicePipeline>, voice: VoiceConfig) -> Self {
        Self {
            pipeline,
            voice,
            ignored_speaker: None,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Never listen to this speaker (the bot's own user)
    #[must_use]
    pub const fn ignore_speaker(mut self, speaker: Option<SpeakerId>) -> Self {
        self.ignored_speaker = speaker;
        self
    }

    /// Start listening in `guild`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the guild already has a session, the transport is not
    /// connected, or recording fails to start
    pub fn start_listening(
        &self,
        guild: GuildRef,
        transport: Arc<dyn AudioTransport>,
        channel: ChannelHandle,
        voice_channel: Option<VoiceChannelRef>,
    ) -> Result<Uuid> {
        if !transport.is_connected() {
            return Err(Error::VoiceContextMissing(
                "음성 채널에 연결되어 있지 않습니다.".to_string(),
            ));
        }

        let guild_id = guild.id;
        let (scheduler, queue) = ChunkScheduler::new(&self.voice);
        let scheduler = Arc::new(scheduler.ignore_speaker(self.ignored_speaker));
        let target = SessionTarget::new(guild, channel, voice_channel);
        let session_id = target.id;

        {
            let mut sessions = self.lock()?;
            if sessions.contains_key(&guild_id) {
                return Err(Error::Audio(format!("already listening in guild {guild_id}")));
            }

            let consumer = Arc::clone(&self.pipeline).spawn(queue, target.clone());
            sessions.insert(
                guild_id,
                Session {
                    target,
                    scheduler: Arc::clone(&scheduler),
                    transport: Arc::clone(&transport),
                    consumer,
                },
            );
        }

        let on_finished = finished_callback(Arc::downgrade(&self.sessions), guild_id, session_id);
        let sink: Arc<dyn AudioSink> = scheduler;

        if let Err(e) = transport.start_recording(sink, on_finished) {
            if let Some(session) = self.remove(guild_id, Some(session_id)) {
                session.target.end();
                session.scheduler.cleanup();
            }
            return Err(e);
        }

        tracing::info!(guild = guild_id, session = %session_id, "started listening");
        Ok(session_id)
    }

    /// Stop listening in `guild` right away
    ///
    /// In-flight chunks finish but their results are discarded. Returns
    /// whether a session existed.
    pub fn stop_listening(&self, guild: GuildId) -> bool {
        let Some(session) = self.remove(guild, None) else {
            return false;
        };
        let id = session.target.id;
        session.cancel();
        tracing::info!(guild, session = %id, "stopped listening");
        true
    }

    /// Flush what is buffered, wait for every queued chunk to be handled,
    /// then stop recording
    ///
    /// A speaker whose previous chunk is still being recognized is flushed
    /// again once that chunk is done, so no trailing audio is lost.
    ///
    /// Returns whether a session existed.
    pub async fn finish(&self, guild: GuildId) -> bool {
        let Some(session) = self.remove(guild, None) else {
            return false;
        };

        let mut busy = session.scheduler.flush_all();
        while !busy.is_empty() {
            tracing::debug!(
                guild,
                speakers = busy.len(),
                "waiting on in-flight chunks to flush the rest"
            );
            tokio::time::sleep(FRAME_DURATION).await;
            busy.retain(|&speaker| session.scheduler.request_flush(speaker) == FlushOutcome::Busy);
        }
        session.scheduler.cleanup();
        if let Err(e) = session.consumer.await {
            tracing::error!(guild, error = %e, "voice consumer task failed");
        }

        session.target.end();
        session.transport.stop_recording();
        tracing::info!(guild, session = %session.target.id, "finished listening");
        true
    }

    /// Whether `guild` has an active session
    #[must_use]
    pub fn is_listening(&self, guild: GuildId) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(&guild))
            .unwrap_or(false)
    }

    /// Id of the active session in `guild`
    #[must_use]
    pub fn session_id(&self, guild: GuildId) -> Option<Uuid> {
        self.sessions
            .lock()
            .ok()?
            .get(&guild)
            .map(|s| s.target.id)
    }

    /// Number of active sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every session
    pub fn shutdown(&self) {
        let drained: Vec<Session> = match self.sessions.lock() {
            Ok(mut sessions) => sessions.drain().map(|(_, s)| s).collect(),
            Err(_) => return,
        };
        for session in drained {
            session.cancel();
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<GuildId, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Audio("session registry poisoned".to_string()))
    }

    /// Remove the session for `guild`, only if its id matches when given
    ///
    /// The lock is released before the caller touches the transport, since
    /// stopping a transport may call back into the registry.
    fn remove(&self, guild: GuildId, id: Option<Uuid>) -> Option<Session> {
        remove_session(&self.sessions, guild, id)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("ignored_speaker", &self.ignored_speaker)
            .finish_non_exhaustive()
    }
}

fn remove_session(sessions: &SessionMap, guild: GuildId, id: Option<Uuid>) -> Option<Session> {
    let mut sessions = sessions.lock().ok()?;
    match id {
        Some(id) if sessions.get(&guild).is_some_and(|s| s.target.id != id) => None,
        _ => sessions.remove(&guild),
    }
}

/// Tear the session down when the transport reports that recording ended
fn finished_callback(
    sessions: Weak<SessionMap>,
    guild: GuildId,
    id: Uuid,
) -> super::transport::RecordingFinished {
    Box::new(move |error: Option<Error>| {
        if let Some(e) = error {
            tracing::warn!(guild, session = %id, error = %e, "recording ended with error");
        }

        let Some(sessions) = sessions.upgrade() else {
            return;
        };
        if let Some(session) = remove_session(&sessions, guild, Some(id)) {
            session.target.end();
            session.scheduler.cleanup();
            tracing::info!(guild, session = %id, "recording finished, session closed");
        }
    })
}
