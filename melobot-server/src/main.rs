use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use melobot_core::Error;
use melobot_core::platforms::discord::{ChannelNotifier, DiscordPlatform, SongbirdVoice};
use melobot_core::platforms::{PlatformAuth, PlatformIntegration};
use melobot_core::playback::controller::PlaybackController;
use melobot_core::resolver::YouTubeResolver;
use melobot_core::services::command_service::CommandService;

#[derive(Parser, Debug, Clone)]
#[command(name = "melobot")]
#[command(author, version, about = "melobot - single-track Discord music bot")]
struct Args {
    /// Discord bot token; falls back to the DISCORD_TOKEN environment variable.
    #[arg(long)]
    discord_token: Option<String>,

    /// YouTube Data API key; falls back to YOUTUBE_API_KEY. Without one,
    /// only direct URLs can be played.
    #[arg(long)]
    youtube_api_key: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let token = args
        .discord_token
        .or_else(|| std::env::var("DISCORD_TOKEN").ok())
        .ok_or_else(|| {
            Error::Auth("no Discord token (use --discord-token or DISCORD_TOKEN)".into())
        })?;
    let api_key = args
        .youtube_api_key
        .or_else(|| std::env::var("YOUTUBE_API_KEY").ok());
    if api_key.is_none() {
        warn!("no YouTube API key configured; only direct URLs will play");
    }

    let mut platform = DiscordPlatform::new(token);
    platform.authenticate().await?;
    platform.connect().await?;

    let songbird = platform
        .songbird()
        .ok_or_else(|| Error::Platform("voice manager missing after connect".into()))?;
    let http = platform
        .http()
        .ok_or_else(|| Error::Platform("http client missing after connect".into()))?;

    let voice = Arc::new(SongbirdVoice::new(songbird));
    let resolver = Arc::new(YouTubeResolver::new(api_key));
    let notifier = Arc::new(ChannelNotifier::new(http));

    let (controller, done_rx) =
        PlaybackController::new(resolver, voice.clone(), voice.clone(), notifier);
    let _completion_listener = controller.spawn_completion_listener(done_rx);

    let commands = CommandService::new(controller);

    info!("melobot is up; waiting for commands");
    loop {
        tokio::select! {
            maybe_event = platform.next_chat_event() => {
                let Some(event) = maybe_event else {
                    warn!("chat event stream ended");
                    break;
                };
                match commands.handle_chat_line(&event).await {
                    Ok(Some(response)) => {
                        for text in &response.texts {
                            if let Err(e) = platform.send_message(response.channel_id, text).await {
                                error!("failed to send reply: {e}");
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("command handling failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received; shutting down");
                break;
            }
        }
    }

    platform.disconnect().await?;
    Ok(())
}
