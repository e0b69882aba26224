//! Connection to the event-stream backend.
//!
//! A [`Transport`] is the pluggable wire: it connects, opens one channel per
//! topic and pushes [`TransportEvent`]s into the queue it is handed. The
//! [`Connection`] owns the lifecycle on top of it: one logical connection,
//! bounded connect attempts, manual retry, and restoring every registered
//! scope after a reconnect.
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(MemoryTransport::new());
//! let registry = SubscriptionRegistry::new(transport.clone());
//! let connection = Connection::new(transport, registry, Duration::from_secs(10), 1024);
//!
//! if let Err(e) = connection.connect() {
//!     // Surface `connection.error()` and offer a retry.
//! }
//! ```

mod connection;
mod memory;
mod types;

pub use connection::Connection;
pub use memory::MemoryTransport;
pub use types::{
    ChannelHandle, ChannelId, ConnectionSnapshot, ConnectionStatus, EventSink, Transport,
    TransportEvent,
};
