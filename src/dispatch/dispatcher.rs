//! Typed routing of change messages to per-entity handler lists.

use super::wire::{is_blank, WireFormat, WireMessage};
use crate::subscriptions::ScopeKey;
use crate::types::{ChangeEvent, EntityType, MutationKind, Post, Reply, Scoped, Timestamp, Vote};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type Handler<T> = Arc<dyn Fn(&ChangeEvent<T>) + Send + Sync>;

/// Unique identifier for a registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// What happened to one dispatched message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Routed to the entity's handlers. `failed` of them panicked.
    Delivered { handlers: usize, failed: usize },
    /// The record does not belong to the scope it arrived on.
    OutOfScope,
    /// Entity type outside the known set.
    Unroutable,
    /// Frame or record could not be decoded.
    Malformed,
}

/// Running totals, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped: u64,
    pub handler_failures: u64,
}

struct HandlerList<T> {
    entries: Vec<(HandlerId, Handler<T>)>,
}

impl<T> Default for HandlerList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

#[derive(Default)]
struct DispatcherInner {
    posts: RwLock<HandlerList<Post>>,
    replies: RwLock<HandlerList<Reply>>,
    votes: RwLock<HandlerList<Vote>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    handler_failures: AtomicU64,
}

impl DispatcherInner {
    fn remove(&self, entity: EntityType, id: HandlerId) -> bool {
        fn remove_from<T>(list: &RwLock<HandlerList<T>>, id: HandlerId) -> bool {
            let mut list = list.write();
            let before = list.entries.len();
            list.entries.retain(|(existing, _)| *existing != id);
            list.entries.len() != before
        }

        match entity {
            EntityType::Post => remove_from(&self.posts, id),
            EntityType::Reply => remove_from(&self.replies, id),
            EntityType::Vote => remove_from(&self.votes, id),
        }
    }
}

/// Routes each change to the handlers registered for its entity type.
///
/// Handlers run in registration order, outside any lock, so they may
/// register or drop handlers themselves. A panicking handler is isolated:
/// later handlers still run and the dispatcher stays usable.
#[derive(Clone, Default)]
pub struct ChangeDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Registration ---

    /// Register a handler for post changes.
    pub fn on_post_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Post>) + Send + Sync + 'static,
    {
        self.register(EntityType::Post, &self.inner.posts, Arc::new(handler))
    }

    /// Register a handler for reply changes.
    pub fn on_reply_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Reply>) + Send + Sync + 'static,
    {
        self.register(EntityType::Reply, &self.inner.replies, Arc::new(handler))
    }

    /// Register a handler for vote changes.
    pub fn on_vote_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Vote>) + Send + Sync + 'static,
    {
        self.register(EntityType::Vote, &self.inner.votes, Arc::new(handler))
    }

    fn register<T>(
        &self,
        entity: EntityType,
        list: &RwLock<HandlerList<T>>,
        handler: Handler<T>,
    ) -> HandlerGuard {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        list.write().entries.push((id, handler));
        debug!(entity = %entity, handler = id.0, "handler registered");

        HandlerGuard {
            dispatcher: Arc::downgrade(&self.inner),
            entity,
            id,
            released: false,
        }
    }

    /// Number of handlers registered for `entity`.
    pub fn handler_count(&self, entity: EntityType) -> usize {
        match entity {
            EntityType::Post => self.inner.posts.read().entries.len(),
            EntityType::Reply => self.inner.replies.read().entries.len(),
            EntityType::Vote => self.inner.votes.read().entries.len(),
        }
    }

    /// Drop every handler. Outstanding guards become no-ops.
    pub fn clear(&self) {
        self.inner.posts.write().entries.clear();
        self.inner.replies.write().entries.clear();
        self.inner.votes.write().entries.clear();
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
        }
    }

    // --- Dispatch ---

    /// Decode a raw frame received on `scope`'s channel and dispatch it.
    pub fn dispatch_frame(&self, scope: &ScopeKey, payload: &[u8], format: WireFormat) -> DispatchOutcome {
        match WireMessage::decode(payload, format) {
            Ok(message) => self.dispatch(scope, message),
            Err(e) => {
                debug!(scope = %scope, error = %e, "dropping undecodable frame");
                self.dropped(DispatchOutcome::Malformed)
            }
        }
    }

    /// Dispatch one message received on `scope`'s channel.
    pub fn dispatch(&self, scope: &ScopeKey, message: WireMessage) -> DispatchOutcome {
        let Some(entity) = EntityType::parse(&message.entity_type) else {
            debug!(scope = %scope, entity = %message.entity_type, "dropping unroutable change");
            return self.dropped(DispatchOutcome::Unroutable);
        };

        match entity {
            EntityType::Post => self.deliver(entity, &self.inner.posts, scope, message),
            EntityType::Reply => self.deliver(entity, &self.inner.replies, scope, message),
            EntityType::Vote => self.deliver(entity, &self.inner.votes, scope, message),
        }
    }

    fn deliver<T>(
        &self,
        entity: EntityType,
        list: &RwLock<HandlerList<T>>,
        scope: &ScopeKey,
        message: WireMessage,
    ) -> DispatchOutcome
    where
        T: DeserializeOwned + Scoped,
    {
        let Some(event) = decode_event::<T>(entity, scope, message) else {
            return self.dropped(DispatchOutcome::Malformed);
        };

        if !scope.admits(&event.record) {
            debug!(scope = %scope, entity = %entity, "dropping change outside scope");
            return self.dropped(DispatchOutcome::OutOfScope);
        }

        let handlers: Vec<Handler<T>> = list
            .read()
            .entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut failed = 0;
        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                failed += 1;
                warn!(scope = %scope, entity = %entity, "change handler panicked");
            }
        }

        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handler_failures
            .fetch_add(failed as u64, Ordering::Relaxed);

        DispatchOutcome::Delivered {
            handlers: handlers.len(),
            failed,
        }
    }

    fn dropped(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        outcome
    }
}

impl fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("posts", &self.handler_count(EntityType::Post))
            .field("replies", &self.handler_count(EntityType::Reply))
            .field("votes", &self.handler_count(EntityType::Vote))
            .finish()
    }
}

/// Build a typed event from a wire message.
///
/// Returns `None` when the record itself does not decode. A previous record
/// that does not decode is treated as absent.
fn decode_event<T: DeserializeOwned>(
    entity: EntityType,
    scope: &ScopeKey,
    message: WireMessage,
) -> Option<ChangeEvent<T>> {
    let WireMessage {
        mutation_kind,
        record,
        previous_record,
        ..
    } = message;

    let previous_raw = match mutation_kind {
        MutationKind::Inserted => None,
        MutationKind::Updated | MutationKind::Deleted => {
            previous_record.filter(|value| !is_blank(value))
        }
    };

    // Deletions often carry only the old row.
    let record_raw = match (mutation_kind, is_blank(&record), &previous_raw) {
        (MutationKind::Deleted, true, Some(previous)) => previous.clone(),
        _ => record,
    };

    let record: T = match decode_value(record_raw) {
        Ok(record) => record,
        Err(e) => {
            debug!(scope = %scope, entity = %entity, error = %e, "dropping malformed record");
            return None;
        }
    };

    let previous_record = previous_raw.and_then(|value| match decode_value(value) {
        Ok(previous) => Some(previous),
        Err(e) => {
            debug!(entity = %entity, error = %e, "ignoring malformed previous record");
            None
        }
    });

    Some(ChangeEvent {
        mutation_kind,
        entity_type: entity,
        record,
        previous_record,
        received_at: Timestamp::now(),
        scope: scope.clone(),
    })
}

fn decode_value<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    serde_json::from_value(value)
}

/// Disposer for one handler registration.
#[must_use = "dropping the guard immediately unregisters the handler"]
pub struct HandlerGuard {
    dispatcher: Weak<DispatcherInner>,
    entity: EntityType,
    id: HandlerId,
    released: bool,
}

impl HandlerGuard {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Unregister now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(inner) = self.dispatcher.upgrade() {
            if inner.remove(self.entity, self.id) {
                debug!(entity = %self.entity, handler = self.id.0, "handler removed");
            }
        }
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for HandlerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerGuard")
            .field("entity", &self.entity)
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn post_message(id: &str) -> WireMessage {
        WireMessage::new(
            MutationKind::Inserted,
            "posts",
            json!({"id": id, "title": format!("post {id}"), "category_id": "7"}),
        )
    }

    #[test]
    fn test_routes_by_entity_type() {
        let dispatcher = ChangeDispatcher::new();
        let posts = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(Mutex::new(0));

        let seen = posts.clone();
        let _p = dispatcher.on_post_change(move |event| seen.lock().push(event.record.id.clone()));
        let count = replies.clone();
        let _r = dispatcher.on_reply_change(move |_| *count.lock() += 1);

        let outcome = dispatcher.dispatch(&ScopeKey::Global, post_message("1"));
        assert_eq!(outcome, DispatchOutcome::Delivered { handlers: 1, failed: 0 });
        assert_eq!(posts.lock().len(), 1);
        assert_eq!(*replies.lock(), 0);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = ChangeDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let guards: Vec<HandlerGuard> = (0..3)
            .map(|n| {
                let order = order.clone();
                dispatcher.on_post_change(move |_| order.lock().push(n))
            })
            .collect();

        dispatcher.dispatch(&ScopeKey::Global, post_message("1"));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(guards);
        assert_eq!(dispatcher.handler_count(EntityType::Post), 0);
    }

    #[test]
    fn test_events_keep_arrival_order() {
        let dispatcher = ChangeDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _guard = dispatcher.on_post_change(move |event| sink.lock().push(event.record.id.to_string()));

        for id in ["a", "b", "c"] {
            dispatcher.dispatch(&ScopeKey::Global, post_message(id));
        }
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_entity_is_dropped() {
        let dispatcher = ChangeDispatcher::new();
        let message = WireMessage::new(MutationKind::Inserted, "bookmark", json!({"id": 1}));

        assert_eq!(
            dispatcher.dispatch(&ScopeKey::Global, message),
            DispatchOutcome::Unroutable
        );
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[test]
    fn test_malformed_record_is_dropped() {
        let dispatcher = ChangeDispatcher::new();
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let _guard = dispatcher.on_reply_change(move |_| *flag.lock() = true);

        // Replies require a post id.
        let message = WireMessage::new(MutationKind::Inserted, "reply", json!({"id": 1}));
        assert_eq!(
            dispatcher.dispatch(&ScopeKey::Global, message),
            DispatchOutcome::Malformed
        );
        assert!(!*called.lock());

        assert_eq!(
            dispatcher.dispatch_frame(&ScopeKey::Global, b"not json", WireFormat::Json),
            DispatchOutcome::Malformed
        );
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let dispatcher = ChangeDispatcher::new();
        let reached = Arc::new(Mutex::new(0));

        let _boom = dispatcher.on_post_change(|_| panic!("handler failure"));
        let count = reached.clone();
        let _ok = dispatcher.on_post_change(move |_| *count.lock() += 1);

        let outcome = dispatcher.dispatch(&ScopeKey::Global, post_message("1"));
        assert_eq!(outcome, DispatchOutcome::Delivered { handlers: 2, failed: 1 });

        dispatcher.dispatch(&ScopeKey::Global, post_message("2"));
        assert_eq!(*reached.lock(), 2);
        assert_eq!(dispatcher.stats().handler_failures, 2);
    }

    #[test]
    fn test_out_of_scope_record_is_dropped() {
        let dispatcher = ChangeDispatcher::new();
        let _guard = dispatcher.on_post_change(|_| {});

        assert_eq!(
            dispatcher.dispatch(&ScopeKey::thread("2"), post_message("1")),
            DispatchOutcome::OutOfScope
        );
        assert_eq!(
            dispatcher.dispatch(&ScopeKey::category("7"), post_message("1")),
            DispatchOutcome::Delivered { handlers: 1, failed: 0 }
        );
    }

    #[test]
    fn test_delete_promotes_previous_record() {
        let dispatcher = ChangeDispatcher::new();
        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        let _guard = dispatcher.on_post_change(move |event| *slot.lock() = Some(event.clone()));

        let message = WireMessage::new(MutationKind::Deleted, "posts", json!({}))
            .with_previous(json!({"id": "9", "title": "gone"}));
        dispatcher.dispatch(&ScopeKey::Global, message);

        let event = captured.lock().take().unwrap();
        assert_eq!(event.mutation_kind, MutationKind::Deleted);
        assert_eq!(event.record.title, "gone");
    }

    #[test]
    fn test_update_tolerates_missing_or_bad_previous() {
        let dispatcher = ChangeDispatcher::new();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let slot = captured.clone();
        let _guard = dispatcher.on_post_change(move |event| slot.lock().push(event.clone()));

        let bare = WireMessage::new(MutationKind::Updated, "post", json!({"id": 1, "title": "a"}));
        let bad = WireMessage::new(MutationKind::Updated, "post", json!({"id": 1, "title": "b"}))
            .with_previous(json!({"unexpected": true}));
        dispatcher.dispatch(&ScopeKey::Global, bare);
        dispatcher.dispatch(&ScopeKey::Global, bad);

        let events = captured.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.previous_record.is_none()));
    }

    #[test]
    fn test_handler_may_unregister_itself() {
        let dispatcher = ChangeDispatcher::new();
        let slot: Arc<Mutex<Option<HandlerGuard>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));

        let own = slot.clone();
        let count = calls.clone();
        let guard = dispatcher.on_post_change(move |_| {
            *count.lock() += 1;
            own.lock().take();
        });
        *slot.lock() = Some(guard);

        dispatcher.dispatch(&ScopeKey::Global, post_message("1"));
        dispatcher.dispatch(&ScopeKey::Global, post_message("2"));
        assert_eq!(*calls.lock(), 1);
    }
}
