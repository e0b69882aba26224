//! Audible cue for new notifications.

use thiserror::Error;

/// Why a cue could not be played. Never surfaced past the buffer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("Playback not allowed: {0}")]
    NotAllowed(String),

    #[error("Audio asset unavailable: {0}")]
    Unavailable(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// Plays the short new-notification sound.
pub trait AudioCue: Send + Sync {
    fn play(&self) -> Result<(), AudioError>;
}

impl<F> AudioCue for F
where
    F: Fn() -> Result<(), AudioError> + Send + Sync,
{
    fn play(&self) -> Result<(), AudioError> {
        self()
    }
}
