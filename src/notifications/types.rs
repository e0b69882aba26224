//! Notification record types.

use crate::types::{EntityId, EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a notification record.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        NotificationId(s.to_string())
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewPost,
    UpdatedPost,
    NewReply,
    Vote,
}

/// Where the "view" action navigates to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub entity_type: EntityType,
    pub id: EntityId,
}

/// Who caused the change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// A user-facing entry in the notification feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Ingestion time of the triggering change.
    pub timestamp: Timestamp,
    pub target: Option<Target>,
    pub actor: Option<Actor>,
    /// Only the buffer flips this, and only from unread to read.
    pub(crate) is_read: bool,
}

impl NotificationRecord {
    /// A new, unread record.
    pub fn new(
        id: NotificationId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            message: message.into(),
            timestamp,
            target: None,
            actor: None,
            is_read: false,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }
}
