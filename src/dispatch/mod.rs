//! Change dispatch: decoding inbound messages and routing them by entity type.
//!
//! Each entity type has its own handler list. A message goes to exactly the
//! list of its entity type, in arrival order; messages for unknown entity
//! types, undecodable records, or records outside the scope they arrived on
//! are dropped without surfacing an error.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = ChangeDispatcher::new();
//!
//! let guard = dispatcher.on_reply_change(|event| {
//!     println!("reply {} in thread {}", event.record.id, event.record.post_id);
//! });
//!
//! dispatcher.dispatch_frame(&ScopeKey::thread("42"), payload, WireFormat::Json);
//! drop(guard); // unregisters
//! ```

mod dispatcher;
mod wire;

pub use dispatcher::{ChangeDispatcher, DispatchOutcome, DispatchStats, HandlerGuard, HandlerId};
pub use wire::{WireFormat, WireMessage};
