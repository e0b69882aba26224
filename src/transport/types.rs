//! Transport-facing types.

use crate::error::TransportError;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-assigned identifier of an open channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owned handle to an open transport channel.
///
/// Not `Clone`: the registry entry that opened the channel is its only owner,
/// and closing it consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    id: ChannelId,
    topic: String,
}

impl ChannelHandle {
    /// Created by transports when a channel opens.
    pub fn new(id: ChannelId, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Something the transport pushes towards the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A message arrived on an open channel.
    Frame { channel: ChannelId, payload: Vec<u8> },

    /// The connection dropped. All channels are gone.
    Closed { reason: String },
}

/// Sender half handed to the transport on connect.
pub type EventSink = Sender<TransportEvent>;

/// A single logical connection to the event-stream backend.
///
/// Implementations must not block in `open_channel`/`close_channel`; they are
/// called while the registry holds its lock. `connect` may block: it runs on
/// a helper thread bounded by the configured timeout.
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection. Inbound traffic goes to `sink` until the
    /// next `disconnect` or a `TransportEvent::Closed`.
    fn connect(&self, sink: EventSink) -> Result<(), TransportError>;

    /// Tear the connection down. Safe to call when already disconnected.
    fn disconnect(&self);

    /// Open a channel for `topic`.
    fn open_channel(&self, topic: &str) -> Result<ChannelHandle, TransportError>;

    /// Close a channel previously returned by `open_channel`.
    fn close_channel(&self, channel: ChannelHandle);
}

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Status plus last error, published to observers on every transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
