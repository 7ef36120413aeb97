//! src/services/command_service.rs
//!
//! Parses `!`-prefixed chat commands and drives the playback controller.
//! Every controller error is converted to a user-visible status message
//! here; nothing propagates as a fatal failure.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Error;
use crate::platforms::discord::ChatEvent;
use crate::playback::controller::{LeaveOutcome, PlayOutcome, PlaybackController, StopOutcome};

pub const COMMAND_PREFIX: char = '!';

/// Response from a command handler. Each entry in `texts` is sent as a
/// separate chat message.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub channel_id: u64,
    pub texts: Vec<String>,
}

impl CommandResponse {
    fn single(channel_id: u64, text: impl Into<String>) -> Self {
        Self {
            channel_id,
            texts: vec![text.into()],
        }
    }
}

fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let cmd = parts.next()?.to_ascii_lowercase();
    if cmd.is_empty() {
        return None;
    }
    let args = parts.next().unwrap_or("").trim().to_string();
    Some((cmd, args))
}

fn help_text() -> String {
    [
        "Available commands:",
        "!play <url or search> - play audio from YouTube in your voice channel",
        "!loop - toggle looped replay of the current track",
        "!stop - stop the current track",
        "!leave - disconnect from the voice channel",
        "!help - show this message",
    ]
    .join("\n")
}

pub struct CommandService {
    controller: Arc<PlaybackController>,
}

impl CommandService {
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        Self { controller }
    }

    /// Processes one chat message and returns a response if it was a
    /// recognized command.
    pub async fn handle_chat_line(
        &self,
        event: &ChatEvent,
    ) -> Result<Option<CommandResponse>, Error> {
        let Some((cmd, args)) = parse_command(&event.text) else {
            return Ok(None);
        };
        debug!("parsed command '{cmd}' args '{args}' from {}", event.username);

        let reply = match cmd.as_str() {
            "play" => self.handle_play(event, &args).await,
            "loop" => self.handle_loop(event).await,
            "stop" => self.handle_stop(event).await,
            "leave" => self.handle_leave(event).await,
            "help" => Some(CommandResponse::single(event.channel_id, help_text())),
            _ => {
                debug!("unknown command '{cmd}' ignored");
                None
            }
        };
        Ok(reply)
    }

    async fn handle_play(&self, event: &ChatEvent, args: &str) -> Option<CommandResponse> {
        let channel_id = event.channel_id;
        if args.is_empty() {
            return Some(CommandResponse::single(
                channel_id,
                "Usage: !play <url or search terms>",
            ));
        }
        let Some(guild_id) = event.guild_id else {
            return Some(CommandResponse::single(
                channel_id,
                "That only works in a server.",
            ));
        };
        let Some(voice_channel_id) = event.voice_channel_id else {
            return Some(CommandResponse::single(
                channel_id,
                "Join a voice channel first.",
            ));
        };

        let text = match self
            .controller
            .play(guild_id, voice_channel_id, channel_id, args)
            .await
        {
            Ok(PlayOutcome::Started { stream }) => match stream.title {
                Some(title) => format!("Now playing: {title} ({})", stream.url),
                None => format!("Now playing: {}", stream.url),
            },
            // The newer request already answered for itself.
            Ok(PlayOutcome::Superseded) => return None,
            Err(Error::Resolution(reason)) => {
                debug!("guild {guild_id}: resolution failed: {reason}");
                "Couldn't find anything to play for that.".to_string()
            }
            Err(Error::Voice(reason)) => {
                warn!("guild {guild_id}: voice join failed: {reason}");
                "I couldn't join your voice channel.".to_string()
            }
            Err(Error::StreamStart(reason)) => {
                warn!("guild {guild_id}: stream start failed: {reason}");
                "The stream could not be started.".to_string()
            }
            Err(e) => {
                warn!("guild {guild_id}: play failed: {e}");
                "Something went wrong while starting playback.".to_string()
            }
        };
        Some(CommandResponse::single(channel_id, text))
    }

    async fn handle_loop(&self, event: &ChatEvent) -> Option<CommandResponse> {
        let Some(guild_id) = event.guild_id else {
            return Some(CommandResponse::single(
                event.channel_id,
                "That only works in a server.",
            ));
        };
        let enabled = self.controller.toggle_loop(guild_id, event.channel_id).await;
        let text = if enabled {
            "Loop playback is now on."
        } else {
            "Loop playback is now off."
        };
        Some(CommandResponse::single(event.channel_id, text))
    }

    async fn handle_stop(&self, event: &ChatEvent) -> Option<CommandResponse> {
        let Some(guild_id) = event.guild_id else {
            return Some(CommandResponse::single(
                event.channel_id,
                "That only works in a server.",
            ));
        };
        let text = match self.controller.stop(guild_id).await {
            Ok(StopOutcome::Stopped) => "Playback stopped.".to_string(),
            Ok(StopOutcome::NothingPlaying) => "Nothing is playing right now.".to_string(),
            Err(e) => {
                warn!("guild {guild_id}: stop failed: {e}");
                "Something went wrong while stopping playback.".to_string()
            }
        };
        Some(CommandResponse::single(event.channel_id, text))
    }

    async fn handle_leave(&self, event: &ChatEvent) -> Option<CommandResponse> {
        let Some(guild_id) = event.guild_id else {
            return Some(CommandResponse::single(
                event.channel_id,
                "That only works in a server.",
            ));
        };
        let text = match self.controller.leave(guild_id).await {
            Ok(LeaveOutcome::Left) => "Left the voice channel.".to_string(),
            Ok(LeaveOutcome::NotConnected) => {
                "I'm not connected to a voice channel.".to_string()
            }
            Err(e) => {
                warn!("guild {guild_id}: leave failed: {e}");
                "Something went wrong while leaving.".to_string()
            }
        };
        Some(CommandResponse::single(event.channel_id, text))
    }
}
