// File: melobot-core/tests/command_tests.rs
//
// Command routing and reply formatting, with the controller wired to fakes.

use melobot_core::platforms::discord::ChatEvent;
use melobot_core::services::command_service::CommandService;
use melobot_core::test_utils::PlaybackHarness;

const GUILD: u64 = 101;
const VOICE_CHANNEL: u64 = 201;
const TEXT_CHANNEL: u64 = 301;

fn chat(text: &str) -> ChatEvent {
    ChatEvent {
        guild_id: Some(GUILD),
        channel_id: TEXT_CHANNEL,
        user_id: 1,
        username: "tester".to_string(),
        text: text.to_string(),
        voice_channel_id: Some(VOICE_CHANNEL),
    }
}

fn service(h: &PlaybackHarness) -> CommandService {
    CommandService::new(h.controller.clone())
}

async fn reply_text(svc: &CommandService, event: &ChatEvent) -> String {
    let response = svc
        .handle_chat_line(event)
        .await
        .unwrap()
        .expect("expected a reply");
    assert_eq!(response.channel_id, TEXT_CHANNEL);
    response.texts.join("\n")
}

#[tokio::test]
async fn plain_chat_and_unknown_commands_are_ignored() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    let none = svc.handle_chat_line(&chat("just chatting")).await.unwrap();
    assert!(none.is_none());
    let none = svc.handle_chat_line(&chat("!shuffle")).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn play_requires_a_voice_channel() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    let mut event = chat("!play song a");
    event.voice_channel_id = None;
    let text = reply_text(&svc, &event).await;
    assert_eq!(text, "Join a voice channel first.");
    assert_eq!(h.resolver.call_count().await, 0);
}

#[tokio::test]
async fn play_requires_arguments() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    let text = reply_text(&svc, &chat("!play")).await;
    assert!(text.starts_with("Usage:"));
}

#[tokio::test]
async fn play_outside_a_guild_is_rejected() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    let mut event = chat("!play song a");
    event.guild_id = None;
    let text = reply_text(&svc, &event).await;
    assert_eq!(text, "That only works in a server.");
}

#[tokio::test]
async fn play_reports_now_playing() {
    let h = PlaybackHarness::new();
    h.resolver.ok("song a", "https://youtu.be/aaa").await;
    let svc = service(&h);

    let text = reply_text(&svc, &chat("!play song a")).await;
    assert_eq!(text, "Now playing: https://youtu.be/aaa");
    assert_eq!(h.sink.start_count().await, 1);
}

#[tokio::test]
async fn play_reports_resolution_failures() {
    let h = PlaybackHarness::new();
    h.resolver.fail("song a", "nothing matched").await;
    let svc = service(&h);

    let text = reply_text(&svc, &chat("!play song a")).await;
    assert_eq!(text, "Couldn't find anything to play for that.");
}

#[tokio::test]
async fn play_reports_voice_join_failures() {
    let h = PlaybackHarness::new();
    h.voice.fail_next_join();
    let svc = service(&h);

    let text = reply_text(&svc, &chat("!play song a")).await;
    assert_eq!(text, "I couldn't join your voice channel.");
}

#[tokio::test]
async fn loop_toggle_replies_with_the_new_state() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    assert_eq!(
        reply_text(&svc, &chat("!loop")).await,
        "Loop playback is now on."
    );
    assert_eq!(
        reply_text(&svc, &chat("!loop")).await,
        "Loop playback is now off."
    );
}

#[tokio::test]
async fn stop_replies_for_both_outcomes() {
    let h = PlaybackHarness::new();
    h.resolver.ok("song a", "https://youtu.be/aaa").await;
    let svc = service(&h);

    assert_eq!(
        reply_text(&svc, &chat("!stop")).await,
        "Nothing is playing right now."
    );

    reply_text(&svc, &chat("!play song a")).await;
    assert_eq!(reply_text(&svc, &chat("!stop")).await, "Playback stopped.");
}

#[tokio::test]
async fn leave_replies_for_both_outcomes() {
    let h = PlaybackHarness::new();
    h.resolver.ok("song a", "https://youtu.be/aaa").await;
    let svc = service(&h);

    assert_eq!(
        reply_text(&svc, &chat("!leave")).await,
        "I'm not connected to a voice channel."
    );

    reply_text(&svc, &chat("!play song a")).await;
    assert_eq!(
        reply_text(&svc, &chat("!leave")).await,
        "Left the voice channel."
    );
    assert!(h.controller.sessions().is_empty());
}

#[tokio::test]
async fn help_lists_every_command() {
    let h = PlaybackHarness::new();
    let svc = service(&h);

    let text = reply_text(&svc, &chat("!help")).await;
    for needle in ["!play", "!loop", "!stop", "!leave", "!help"] {
        assert!(text.contains(needle), "help text missing {needle}");
    }
}
