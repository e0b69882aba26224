//! Error types for the realtime core.
//!
//! Only connection-level failures ever reach a caller. Everything else
//! (unroutable events, handler panics, audio failures) is absorbed where it
//! happens and logged.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Channel rejected for topic {topic}: {reason}")]
    ChannelRejected { topic: String, reason: String },

    #[error("Transport closed")]
    Closed,
}

/// Main error type for realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Connection attempt cancelled by disconnect")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Realtime hub has been torn down")]
    TornDown,
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Decode(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for RealtimeError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RealtimeError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RealtimeError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RealtimeError::Decode(e.to_string())
    }
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
