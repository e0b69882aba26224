//! User-facing notifications derived from dispatched changes.
//!
//! - [`NotificationBuilder`] turns typed change events into records
//! - [`NotificationBuffer`] keeps the newest [`NOTIFICATION_CAPACITY`] records
//!   and their read state
//! - [`AudioCue`] is the optional sound played on arrival

mod buffer;
mod builder;
mod sound;
mod types;

pub use buffer::{NotificationBuffer, NOTIFICATION_CAPACITY};
pub use builder::NotificationBuilder;
pub use sound::{AudioCue, AudioError};
pub use types::{Actor, NotificationId, NotificationKind, NotificationRecord, Target};
