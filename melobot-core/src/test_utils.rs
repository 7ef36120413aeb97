//! src/test_utils.rs
//!
//! Programmable collaborator fakes for exercising the playback controller
//! without a gateway, a voice driver, or the network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, Notify};

use crate::Error;
use crate::playback::controller::PlaybackController;
use crate::playback::{
    AudioSink, MediaResolver, Notifier, StreamRef, TrackDone, TrackDoneSender, VoiceConnector,
};

/// Resolver answering from a canned table. Individual queries can be gated
/// so a test can interleave other operations mid-resolve.
#[derive(Default)]
pub struct ScriptedResolver {
    results: Mutex<HashMap<String, Result<StreamRef, String>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ok(&self, query: &str, url: &str) {
        self.results.lock().await.insert(
            query.to_string(),
            Ok(StreamRef {
                url: url.to_string(),
                title: None,
            }),
        );
    }

    pub async fn fail(&self, query: &str, reason: &str) {
        self.results
            .lock()
            .await
            .insert(query.to_string(), Err(reason.to_string()));
    }

    /// Makes `resolve(query)` block until the returned handle is notified.
    pub async fn gate(&self, query: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .await
            .insert(query.to_string(), notify.clone());
        notify
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl MediaResolver for ScriptedResolver {
    async fn resolve(&self, query: &str) -> Result<StreamRef, Error> {
        self.calls.lock().await.push(query.to_string());
        let gate = self.gates.lock().await.get(query).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.results.lock().await.get(query).cloned() {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(reason)) => Err(Error::Resolution(reason)),
            None => Err(Error::Resolution(format!("no scripted result for '{query}'"))),
        }
    }
}

/// Sink that records starts and lets a test drive completions by hand.
#[derive(Default)]
pub struct RecordingSink {
    pub starts: Mutex<Vec<(u64, StreamRef, u64)>>,
    pub halts: AtomicUsize,
    senders: Mutex<HashMap<u64, (u64, TrackDoneSender)>>,
    fail_next: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn start_count(&self) -> usize {
        self.starts.lock().await.len()
    }

    pub async fn last_generation(&self, guild_id: u64) -> Option<u64> {
        self.senders.lock().await.get(&guild_id).map(|(g, _)| *g)
    }

    /// Emits the completion for the most recently started track of the
    /// guild, as the real driver would on track end.
    pub async fn complete(&self, guild_id: u64, error: Option<&str>) {
        if let Some((generation, sender)) = self.senders.lock().await.get(&guild_id).cloned() {
            let _ = sender.send(TrackDone {
                guild_id,
                generation,
                error: error.map(str::to_string),
            });
        }
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn start(
        &self,
        guild_id: u64,
        stream: &StreamRef,
        generation: u64,
        done: TrackDoneSender,
    ) -> Result<(), Error> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::StreamStart("scripted start failure".into()));
        }
        self.starts
            .lock()
            .await
            .push((guild_id, stream.clone(), generation));
        self.senders
            .lock()
            .await
            .insert(guild_id, (generation, done));
        Ok(())
    }

    async fn halt(&self, _guild_id: u64) -> Result<(), Error> {
        self.halts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Voice connector backed by a plain set of connected guilds.
#[derive(Default)]
pub struct StubVoice {
    connected: Mutex<HashSet<u64>>,
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    fail_join: AtomicBool,
}

impl StubVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_join(&self) {
        self.fail_join.store(true, Ordering::SeqCst);
    }

    /// Simulates the transport dropping out from under the session.
    pub async fn force_disconnect(&self, guild_id: u64) {
        self.connected.lock().await.remove(&guild_id);
    }
}

#[async_trait]
impl VoiceConnector for StubVoice {
    async fn join(&self, guild_id: u64, _channel_id: u64) -> Result<(), Error> {
        if self.fail_join.swap(false, Ordering::SeqCst) {
            return Err(Error::Voice("scripted join failure".into()));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().await.insert(guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: u64) -> Result<(), Error> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().await.remove(&guild_id);
        Ok(())
    }

    async fn is_connected(&self, guild_id: u64) -> bool {
        self.connected.lock().await.contains(&guild_id)
    }
}

/// Notifier that just records what would have been sent.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(u64, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel_id: u64, text: &str) {
        self.messages
            .lock()
            .await
            .push((channel_id, text.to_string()));
    }
}

/// A controller wired to the fakes above, with the completion receiver kept
/// alive so sink completions stay deliverable.
pub struct PlaybackHarness {
    pub controller: Arc<PlaybackController>,
    pub resolver: Arc<ScriptedResolver>,
    pub sink: Arc<RecordingSink>,
    pub voice: Arc<StubVoice>,
    pub notifier: Arc<RecordingNotifier>,
    pub done_rx: Option<UnboundedReceiver<TrackDone>>,
}

impl PlaybackHarness {
    pub fn new() -> Self {
        let resolver = Arc::new(ScriptedResolver::new());
        let sink = Arc::new(RecordingSink::new());
        let voice = Arc::new(StubVoice::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (controller, done_rx) = PlaybackController::new(
            resolver.clone(),
            sink.clone(),
            voice.clone(),
            notifier.clone(),
        );
        Self {
            controller,
            resolver,
            sink,
            voice,
            notifier,
            done_rx: Some(done_rx),
        }
    }
}

impl Default for PlaybackHarness {
    fn default() -> Self {
        Self::new()
    }
}
