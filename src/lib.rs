//! # Forum Realtime
//!
//! The realtime core of a forum front end: it receives a live stream of
//! backend change events (posts, replies, votes), multiplexes them across
//! interested consumers, and folds them into a bounded notification feed
//! with read tracking.
//!
//! ## Core Concepts
//!
//! - **Connection**: One logical connection to the event-stream backend, retried by hand
//! - **Scopes**: A thread, a category, or everything; one channel per distinct scope
//! - **Dispatcher**: Typed per-entity handler lists fed in arrival order
//! - **Notifications**: Newest-first buffer of 50 records with an exact unread count
//!
//! ## Example
//!
//! ```ignore
//! use forum_realtime::{FeedConfig, HubConfig, MemoryTransport, NotificationFeed, RealtimeHub, ScopeKey};
//!
//! let hub = RealtimeHub::init(Arc::new(MemoryTransport::new()), HubConfig::default());
//! hub.connect()?;
//!
//! let feed = NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), None);
//!
//! // Event loop
//! hub.pump_timeout(Duration::from_millis(100));
//! println!("{} unread", feed.unread_count());
//! ```

pub mod dispatch;
pub mod error;
pub mod feed;
pub mod hub;
pub mod notifications;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use dispatch::{
    ChangeDispatcher, DispatchOutcome, DispatchStats, HandlerGuard, HandlerId, WireFormat,
    WireMessage,
};
pub use error::{RealtimeError, Result, TransportError};
pub use feed::{FeedConfig, FeedPreferences, NotificationFeed};
pub use hub::{HubConfig, RealtimeHub};
pub use notifications::{
    Actor, AudioCue, AudioError, NotificationBuffer, NotificationBuilder, NotificationId,
    NotificationKind, NotificationRecord, Target, NOTIFICATION_CAPACITY,
};
pub use subscriptions::{ScopeKey, ScopeKind, SubscriptionGuard, SubscriptionRegistry};
pub use transport::{
    ChannelHandle, ChannelId, Connection, ConnectionSnapshot, ConnectionStatus, EventSink,
    MemoryTransport, Transport, TransportEvent,
};
pub use types::*;
