//! src/platforms/discord/voice.rs
//!
//! [`VoiceConnector`] and [`AudioSink`] over songbird's twilight driver.
//! Stream references are handed to yt-dlp-backed inputs; track end/error
//! events come back as [`TrackDone`] notices tagged with the generation the
//! track was started under.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use songbird::input::YoutubeDl;
use songbird::tracks::PlayMode;
use songbird::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tracing::debug;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::Error;
use crate::playback::{AudioSink, StreamRef, TrackDone, TrackDoneSender, VoiceConnector};

/// Fires exactly one [`TrackDone`] per played track, whether it ends
/// naturally or errors out. Registered for both End and Error, hence the
/// shared `fired` latch.
struct TrackDoneNotifier {
    guild_id: u64,
    generation: u64,
    done: TrackDoneSender,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackDoneNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Some(VoiceEvent::Cancel);
        }

        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };

        let _ = self.done.send(TrackDone {
            guild_id: self.guild_id,
            generation: self.generation,
            error,
        });
        Some(VoiceEvent::Cancel)
    }
}

pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdVoice {
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<(), Error> {
        // join() moves the call when already connected to another channel.
        self.songbird
            .join(
                songbird::id::GuildId::from(Id::<GuildMarker>::new(guild_id)),
                songbird::id::ChannelId::from(Id::<ChannelMarker>::new(channel_id)),
            )
            .await
            .map(|_call| ())
            .map_err(|e| Error::Voice(format!("join failed: {e}")))
    }

    async fn leave(&self, guild_id: u64) -> Result<(), Error> {
        self.songbird
            .remove(songbird::id::GuildId::from(Id::<GuildMarker>::new(guild_id)))
            .await
            .map_err(|e| Error::Voice(format!("leave failed: {e}")))
    }

    async fn is_connected(&self, guild_id: u64) -> bool {
        self.songbird
            .get(songbird::id::GuildId::from(Id::<GuildMarker>::new(guild_id)))
            .is_some()
    }
}

#[async_trait]
impl AudioSink for SongbirdVoice {
    async fn start(
        &self,
        guild_id: u64,
        stream: &StreamRef,
        generation: u64,
        done: TrackDoneSender,
    ) -> Result<(), Error> {
        let call = self
            .songbird
            .get(songbird::id::GuildId::from(Id::<GuildMarker>::new(guild_id)))
            .ok_or_else(|| Error::Voice("no voice call for guild".into()))?;

        let source = YoutubeDl::new(self.http.clone(), stream.url.clone());

        let mut call = call.lock().await;
        // play_only_input evicts anything the driver is still playing.
        let handle = call.play_only_input(source.into());

        let fired = Arc::new(AtomicBool::new(false));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackDoneNotifier {
                guild_id,
                generation,
                done: done.clone(),
                fired: Arc::clone(&fired),
            };
            handle
                .add_event(VoiceEvent::Track(event), notifier)
                .map_err(|e| Error::StreamStart(format!("event hook failed: {e}")))?;
        }

        debug!("guild {guild_id}: track started (generation {generation})");
        Ok(())
    }

    async fn halt(&self, guild_id: u64) -> Result<(), Error> {
        if let Some(call) = self.songbird.get(songbird::id::GuildId::from(Id::<GuildMarker>::new(guild_id))) {
            call.lock().await.stop();
        }
        Ok(())
    }
}
