//! src/playback/controller.rs
//!
//! The single authority over a guild session's playback transitions. At most
//! one resolve-or-play operation is in flight per session; a newer play
//! supersedes an older one through the generation counter rather than by
//! cancelling it.
//!
//! The session mutex is held only for state bookkeeping. The resolver runs
//! with the mutex released, so a slow lookup never blocks `stop` or `leave`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AudioSink, MediaResolver, Notifier, PlaybackState, Session, SessionRegistry, StreamRef,
    TrackDone, TrackDoneSender, VoiceConnector,
};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started { stream: StreamRef },
    /// A newer play superseded this one while it was resolving. This is a
    /// normal race, not an error; no playback was started for it.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NothingPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    NotConnected,
}

pub struct PlaybackController {
    sessions: SessionRegistry,
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn AudioSink>,
    voice: Arc<dyn VoiceConnector>,
    notifier: Arc<dyn Notifier>,
    done_tx: TrackDoneSender,
}

impl PlaybackController {
    /// Builds the controller and hands back the completion receiver that
    /// [`Self::spawn_completion_listener`] should drain.
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        sink: Arc<dyn AudioSink>,
        voice: Arc<dyn VoiceConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> (Arc<Self>, UnboundedReceiver<TrackDone>) {
        let (done_tx, done_rx) = unbounded_channel();
        let controller = Arc::new(Self {
            sessions: SessionRegistry::new(),
            resolver,
            sink,
            voice,
            notifier,
            done_tx,
        });
        (controller, done_rx)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Drains sink completions into [`Self::on_track_done`].
    pub fn spawn_completion_listener(
        self: &Arc<Self>,
        mut done_rx: UnboundedReceiver<TrackDone>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(done) = done_rx.recv().await {
                controller.on_track_done(done).await;
            }
            debug!("(PlaybackController) completion channel closed");
        })
    }

    /// Joins (or moves to) the requester's voice channel, then resolves and
    /// starts `query`. Caller has already verified the requester is in a
    /// voice channel.
    pub async fn play(
        &self,
        guild_id: u64,
        voice_channel_id: u64,
        reply_channel_id: u64,
        query: &str,
    ) -> Result<PlayOutcome, Error> {
        self.voice.join(guild_id, voice_channel_id).await?;
        let session = self.sessions.get_or_create(guild_id, reply_channel_id);
        self.start_request(guild_id, session, reply_channel_id, query)
            .await
    }

    /// Resolve-and-start cycle shared by `play` and loop re-entry. Loop
    /// re-entry deliberately skips the voice join and its membership checks.
    /// Only `play` creates sessions; this takes an existing handle so a
    /// session destroyed by `leave` can never be re-inserted here.
    async fn start_request(
        &self,
        guild_id: u64,
        session: Arc<Mutex<Session>>,
        reply_channel_id: u64,
        query: &str,
    ) -> Result<PlayOutcome, Error> {
        let generation = {
            let mut s = session.lock().await;
            s.generation += 1;
            s.state = PlaybackState::Resolving;
            s.reply_channel_id = reply_channel_id;
            s.generation
        };
        debug!("guild {guild_id}: resolving '{query}' (generation {generation})");

        // Mutex released while the resolver is out on the network.
        let resolved = self.resolver.resolve(query).await;

        let mut s = session.lock().await;
        if s.generation != generation {
            debug!(
                "guild {guild_id}: resolve for generation {generation} superseded by {}",
                s.generation
            );
            return Ok(PlayOutcome::Superseded);
        }

        // A leave may have destroyed the session while the resolver was out;
        // its generation still matches, so check the registry too. An
        // unregistered session must never reach the sink.
        let still_registered = self
            .sessions
            .get(guild_id)
            .is_some_and(|current| Arc::ptr_eq(&current, &session));
        if !still_registered {
            debug!("guild {guild_id}: session destroyed during resolve, result discarded");
            return Ok(PlayOutcome::Superseded);
        }

        let stream = match resolved {
            Ok(stream) => stream,
            Err(e) => {
                s.state = PlaybackState::Idle;
                return Err(Error::Resolution(e.to_string()));
            }
        };

        // Single slot: a previous track may still be streaming in the
        // driver, so it goes first. No-op when nothing is playing.
        if let Err(e) = self.sink.halt(guild_id).await {
            debug!("guild {guild_id}: pre-start halt reported {e}");
        }

        s.state = PlaybackState::Playing;
        s.active_request = Some(query.to_string());
        match self
            .sink
            .start(guild_id, &stream, generation, self.done_tx.clone())
            .await
        {
            Ok(()) => {
                info!(
                    "guild {guild_id}: playing {} (generation {generation})",
                    stream.url
                );
                Ok(PlayOutcome::Started { stream })
            }
            Err(e) => {
                s.state = PlaybackState::Idle;
                Err(Error::StreamStart(e.to_string()))
            }
        }
    }

    /// Flips looped replay for the guild. Never touches playback state.
    pub async fn toggle_loop(&self, guild_id: u64, reply_channel_id: u64) -> bool {
        let session = self.sessions.get_or_create(guild_id, reply_channel_id);
        let mut s = session.lock().await;
        s.loop_enabled = !s.loop_enabled;
        info!(
            "guild {guild_id}: loop {}",
            if s.loop_enabled { "enabled" } else { "disabled" }
        );
        s.loop_enabled
    }

    pub async fn stop(&self, guild_id: u64) -> Result<StopOutcome, Error> {
        let Some(session) = self.sessions.get(guild_id) else {
            return Ok(StopOutcome::NothingPlaying);
        };
        let mut s = session.lock().await;
        if s.state != PlaybackState::Playing {
            return Ok(StopOutcome::NothingPlaying);
        }
        s.state = PlaybackState::Stopping;
        // The halted stream's completion must not be honored later.
        s.generation += 1;
        let halted = self.sink.halt(guild_id).await;
        s.state = PlaybackState::Idle;
        halted?;
        info!("guild {guild_id}: playback stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Tears down the voice connection and discards the session. The loop
    /// flag dies with the session; stale completions for it become no-ops.
    pub async fn leave(&self, guild_id: u64) -> Result<LeaveOutcome, Error> {
        let had_session = self.sessions.remove(guild_id).is_some();
        if !self.voice.is_connected(guild_id).await {
            if had_session {
                debug!("guild {guild_id}: session discarded with no live voice connection");
            }
            return Ok(LeaveOutcome::NotConnected);
        }
        if let Err(e) = self.sink.halt(guild_id).await {
            debug!("guild {guild_id}: halt during leave reported {e}");
        }
        self.voice.leave(guild_id).await?;
        info!("guild {guild_id}: left voice, session discarded");
        Ok(LeaveOutcome::Left)
    }

    /// Handles a sink completion. Stale generations and destroyed sessions
    /// are ignored; a natural end with the loop flag set re-resolves the
    /// active request exactly once.
    pub async fn on_track_done(&self, done: TrackDone) {
        let TrackDone {
            guild_id,
            generation,
            error,
        } = done;

        let Some(session) = self.sessions.get(guild_id) else {
            debug!("guild {guild_id}: completion for a destroyed session ignored");
            return;
        };

        enum Next {
            Nothing,
            ReportError { channel_id: u64, message: String },
            Replay { channel_id: u64, query: String },
        }

        let next = {
            let mut s = session.lock().await;
            if s.generation != generation {
                debug!(
                    "guild {guild_id}: stale completion (generation {generation}, current {})",
                    s.generation
                );
                Next::Nothing
            } else if let Some(message) = error {
                warn!("guild {guild_id}: playback error: {message}");
                s.state = PlaybackState::Idle;
                Next::ReportError {
                    channel_id: s.reply_channel_id,
                    message,
                }
            } else {
                s.state = PlaybackState::Idle;
                match (s.loop_enabled, s.active_request.clone()) {
                    (true, Some(query)) => Next::Replay {
                        channel_id: s.reply_channel_id,
                        query,
                    },
                    _ => Next::Nothing,
                }
            }
        };

        match next {
            Next::Nothing => {}
            Next::ReportError {
                channel_id,
                message,
            } => {
                self.notifier
                    .notify(channel_id, &Error::Playback(message).to_string())
                    .await;
            }
            Next::Replay { channel_id, query } => {
                if !self.voice.is_connected(guild_id).await {
                    debug!("guild {guild_id}: loop requested but the voice connection is gone");
                    return;
                }
                let Some(session) = self.sessions.get(guild_id) else {
                    debug!("guild {guild_id}: loop requested but the session is gone");
                    return;
                };
                info!("guild {guild_id}: looping '{query}'");
                if let Err(e) = self
                    .start_request(guild_id, session, channel_id, &query)
                    .await
                {
                    self.notifier
                        .notify(channel_id, &format!("Loop replay failed: {e}"))
                        .await;
                }
            }
        }
    }
}
