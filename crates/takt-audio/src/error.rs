//! Audio clock error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    /// No audio device available
    #[error("no audio device available")]
    NoDevice,
    /// Failed to initialize audio device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create audio stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),
}
