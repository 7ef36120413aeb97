//! src/playback/mod.rs
//!
//! Per-guild playback state plus the collaborator seams the controller
//! drives: media resolution, the audio sink, the voice connection, and
//! out-of-band user notification.

pub mod controller;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Resolving,
    Playing,
    Stopping,
}

/// A playable stream reference produced by a [`MediaResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub url: String,
    pub title: Option<String>,
}

/// Completion notice emitted by an [`AudioSink`] when a stream ends,
/// errors out, or is halted. Carries the generation the stream was
/// started under so stale notices can be discarded.
#[derive(Debug, Clone)]
pub struct TrackDone {
    pub guild_id: u64,
    pub generation: u64,
    pub error: Option<String>,
}

pub type TrackDoneSender = UnboundedSender<TrackDone>;

/// Playback state for one guild voice context.
///
/// `generation` increases on every new play request and on stop; a
/// completion notice is only honored while its generation still matches.
#[derive(Debug)]
pub struct Session {
    pub state: PlaybackState,
    pub loop_enabled: bool,
    pub active_request: Option<String>,
    pub generation: u64,
    /// Text channel that status messages for this session go to.
    pub reply_channel_id: u64,
}

impl Session {
    fn new(reply_channel_id: u64) -> Self {
        Self {
            state: PlaybackState::Idle,
            loop_enabled: false,
            active_request: None,
            generation: 0,
            reply_channel_id,
        }
    }
}

/// Guild-addressed session map: created on first use, removed on leave.
/// Distinct guilds never contend on a shared lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<u64, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(&guild_id).map(|s| Arc::clone(&s))
    }

    pub fn get_or_create(&self, guild_id: u64, reply_channel_id: u64) -> Arc<Mutex<Session>> {
        Arc::clone(
            &self
                .sessions
                .entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(reply_channel_id)))),
        )
    }

    pub fn remove(&self, guild_id: u64) -> Option<Arc<Mutex<Session>>> {
        self.sessions.remove(&guild_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Turns a free-text query or URL into a playable stream reference.
/// May take seconds; callers are expected to simply discard late results
/// rather than cancel in-flight ones.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<StreamRef, Error>;
}

/// Streams audio into a guild's voice call.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Begins asynchronous playback of `stream`. The sink must fire exactly
    /// one [`TrackDone`] carrying `generation` on `done` when the stream
    /// ends or fails.
    async fn start(
        &self,
        guild_id: u64,
        stream: &StreamRef,
        generation: u64,
        done: TrackDoneSender,
    ) -> Result<(), Error>;

    /// Stops whatever the guild's call is currently playing, if anything.
    async fn halt(&self, guild_id: u64) -> Result<(), Error>;
}

/// Manages the underlying realtime voice transport.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Joins `channel_id`, moving the call if already connected elsewhere.
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<(), Error>;
    async fn leave(&self, guild_id: u64) -> Result<(), Error>;
    async fn is_connected(&self, guild_id: u64) -> bool;
}

/// Sends asynchronous status text back to the channel a session was
/// started from (loop failures, mid-play errors).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: u64, text: &str);
}
