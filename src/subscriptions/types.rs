//! Scope and subscription handle types.

use super::registry::SubscriptionRegistry;
use crate::types::{EntityId, Scoped};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Weak;

/// Prefix shared by every topic this core subscribes to.
const TOPIC_PREFIX: &str = "forum";

/// Kind of a scope, without its identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Thread,
    Category,
    Global,
}

/// The logical slice of the change stream a consumer is interested in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ScopeKey {
    /// One discussion thread, keyed by its post id.
    Thread(EntityId),
    /// Every thread in one category.
    Category(EntityId),
    /// All posts, replies and votes.
    Global,
}

impl ScopeKey {
    pub fn thread(id: impl Into<EntityId>) -> Self {
        ScopeKey::Thread(id.into())
    }

    pub fn category(id: impl Into<EntityId>) -> Self {
        ScopeKey::Category(id.into())
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeKey::Thread(_) => ScopeKind::Thread,
            ScopeKey::Category(_) => ScopeKind::Category,
            ScopeKey::Global => ScopeKind::Global,
        }
    }

    pub fn id(&self) -> Option<&EntityId> {
        match self {
            ScopeKey::Thread(id) | ScopeKey::Category(id) => Some(id),
            ScopeKey::Global => None,
        }
    }

    /// Transport topic carrying this scope.
    pub fn topic(&self) -> String {
        match self {
            ScopeKey::Thread(id) => format!("{TOPIC_PREFIX}:thread:{id}"),
            ScopeKey::Category(id) => format!("{TOPIC_PREFIX}:category:{id}"),
            ScopeKey::Global => format!("{TOPIC_PREFIX}:all"),
        }
    }

    /// Whether a streamed record falls inside this scope.
    ///
    /// Records that do not carry the field a scope keys on (e.g. a reply
    /// without a category) are outside every scope but `Global`.
    pub fn admits<R: Scoped + ?Sized>(&self, record: &R) -> bool {
        match self {
            ScopeKey::Thread(id) => record.thread_id() == Some(id),
            ScopeKey::Category(id) => record.category_id() == Some(id),
            ScopeKey::Global => true,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Thread(id) => write!(f, "thread:{id}"),
            ScopeKey::Category(id) => write!(f, "category:{id}"),
            ScopeKey::Global => f.write_str("global"),
        }
    }
}

/// Disposer for one reference to a scope.
///
/// Dropping the guard releases the reference; `unsubscribe` does the same
/// explicitly. The last release closes the scope's channel.
#[must_use = "dropping the guard immediately releases the subscription"]
pub struct SubscriptionGuard {
    pub(crate) registry: Weak<SubscriptionRegistry>,
    pub(crate) scope: ScopeKey,
    pub(crate) generation: u64,
    pub(crate) released: bool,
}

impl SubscriptionGuard {
    /// A guard that holds nothing, handed out once the registry is gone.
    pub(crate) fn detached(scope: ScopeKey) -> Self {
        Self {
            registry: Weak::new(),
            scope,
            generation: 0,
            released: true,
        }
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Whether this guard still holds a reference.
    pub fn is_active(&self) -> bool {
        !self.released && self.registry.strong_count() > 0
    }

    /// Release the reference now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.scope, self.generation);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("scope", &self.scope)
            .field("generation", &self.generation)
            .field("released", &self.released)
            .finish()
    }
}
