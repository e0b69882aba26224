//! Scope subscriptions multiplexed onto transport channels.
//!
//! Any number of consumers may be interested in the same scope; the registry
//! opens one channel for it on the first reference and closes it on the last.
//! References are held by [`SubscriptionGuard`]s, so a view that drops its
//! guards on teardown cannot leak a channel.
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(transport);
//!
//! let a = registry.subscribe(ScopeKey::thread("42"));
//! let b = registry.subscribe(ScopeKey::thread("42")); // same channel
//!
//! drop(a); // channel stays open
//! b.unsubscribe(); // channel closes
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{ScopeKey, ScopeKind, SubscriptionGuard};
