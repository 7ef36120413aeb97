// src/lib.rs

pub mod error;
pub mod platforms;
pub mod playback;
pub mod resolver;
pub mod services;
pub mod test_utils;

pub use error::Error;
