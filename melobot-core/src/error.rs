// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Voice connection error: {0}")]
    Voice(String),

    #[error("Could not resolve a playable stream: {0}")]
    Resolution(String),

    #[error("Stream could not be started: {0}")]
    StreamStart(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Platform(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Platform(s.to_string())
    }
}
