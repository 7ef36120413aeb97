pub mod runtime;
pub mod voice;

pub use runtime::{ChannelNotifier, ChatEvent, DiscordPlatform};
pub use voice::SongbirdVoice;
