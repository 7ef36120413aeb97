//! src/platforms/discord/runtime.rs
//!
//! Twilight gateway runtime: one shard-runner task per shard, inbound guild
//! chat forwarded over an unbounded channel, and a songbird manager fed every
//! gateway event so voice state stays in sync.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::gateway::payload::incoming::MessageCreate;
use twilight_model::id::Id;
use twilight_model::id::marker::ChannelMarker;

use crate::Error;
use crate::platforms::{ConnectionStatus, PlatformAuth, PlatformIntegration};
use crate::playback::Notifier;

/// One inbound guild chat message, with the author's current voice channel
/// already looked up from the gateway cache so command handling never has to
/// touch the cache itself.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub user_id: u64,
    pub username: String,
    pub text: String,
    pub voice_channel_id: Option<u64>,
}

/// Per-shard event loop:
///   - updates the in-memory cache
///   - feeds songbird so voice handshakes complete
///   - forwards inbound chat messages to `tx`.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<ChatEvent>,
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) shard {shard_id} started, listening for events");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("shard {shard_id}: error receiving event: {err:?}");
                continue;
            }
        };

        cache.update(&event);
        songbird.process(&event).await;

        match &event {
            Event::Ready(ready) => {
                info!(
                    "shard {shard_id}: READY as {} (ID={})",
                    ready.user.name, ready.user.id
                );
            }
            Event::MessageCreate(msg_create) => {
                let msg: &MessageCreate = msg_create;
                if msg.author.bot {
                    debug!("ignoring bot message from {}", msg.author.name);
                    continue;
                }

                let voice_channel_id = msg.guild_id.and_then(|guild_id| {
                    cache
                        .voice_state(msg.author.id, guild_id)
                        .map(|vs| vs.channel_id().get())
                });

                let _ = tx.send(ChatEvent {
                    guild_id: msg.guild_id.map(|g| g.get()),
                    channel_id: msg.channel_id.get(),
                    user_id: msg.author.id.get(),
                    username: msg.author.name.clone(),
                    text: msg.content.clone(),
                    voice_channel_id,
                });
            }
            _ => {
                trace!("shard {shard_id}: unhandled event");
            }
        }
    }

    warn!("(ShardRunner) shard {shard_id} event loop ended");
}

pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    /// Receiver for inbound chat; `None` until `connect` runs.
    pub rx: Mutex<Option<UnboundedReceiver<ChatEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<InMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
        }
    }

    /// Awaits the next inbound chat event, or `None` when disconnected.
    pub async fn next_chat_event(&self) -> Option<ChatEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }

    pub fn songbird(&self) -> Option<Arc<Songbird>> {
        self.songbird.clone()
    }

    pub fn http(&self) -> Option<Arc<HttpClient>> {
        self.http.clone()
    }
}

#[async_trait]
impl PlatformAuth for DiscordPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(!self.token.is_empty())
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) already connected, skipping");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel::<ChatEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        let cache = InMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD
                    | ResourceType::CHANNEL
                    | ResourceType::MEMBER
                    | ResourceType::VOICE_STATE,
            )
            .build();
        let cache = Arc::new(cache);
        self.cache = Some(cache.clone());

        // Songbird needs the bot's user id before any shard starts.
        let current_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("current_user error: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("current_user body error: {e}")))?;

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT
                | Intents::GUILD_VOICE_STATES,
        );

        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        let senders: HashMap<u32, MessageSender> = shards
            .iter()
            .map(|s| (s.id().number(), s.sender()))
            .collect();
        let songbird = Arc::new(Songbird::twilight(
            Arc::new(TwilightMap::new(senders)),
            current_user.id,
        ));
        self.songbird = Some(songbird.clone());

        for shard in shards {
            self.shard_senders.push(shard.sender());

            let tx_for_shard = tx.clone();
            let cache_for_shard = cache.clone();
            let songbird_for_shard = songbird.clone();

            let handle = tokio::spawn(async move {
                shard_runner(shard, tx_for_shard, cache_for_shard, songbird_for_shard).await;
            });
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }

    async fn send_message(&self, channel_id: u64, message: &str) -> Result<(), Error> {
        let channel_id = Id::<ChannelMarker>::new(channel_id);
        if let Some(http) = &self.http {
            http.create_message(channel_id)
                .content(message)
                .await
                .map_err(|e| Error::Platform(format!("error sending Discord message: {e:?}")))?;
        }
        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}

/// [`Notifier`] over the Discord REST client, for status messages that
/// originate outside a command round-trip.
pub struct ChannelNotifier {
    http: Arc<HttpClient>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel_id: u64, text: &str) {
        let channel_id = Id::<ChannelMarker>::new(channel_id);
        if let Err(e) = self.http.create_message(channel_id).content(text).await {
            error!("failed to send status message: {e:?}");
        }
    }
}
