//! The notification feed a view presents.
//!
//! Holds the view-level preferences (sound, expanded) next to, not inside,
//! the notification buffer: the buffer only ever sees `sound_enabled` as a
//! flag passed into `add_with_cue`.

use crate::dispatch::HandlerGuard;
use crate::error::Result;
use crate::hub::RealtimeHub;
use crate::notifications::{
    AudioCue, NotificationBuffer, NotificationBuilder, NotificationId, NotificationRecord,
    Target, NOTIFICATION_CAPACITY,
};
use crate::subscriptions::{ScopeKey, SubscriptionGuard};
use crate::types::ChangeEvent;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-view presentation preferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPreferences {
    pub sound_enabled: bool,
    pub expanded: bool,
}

impl Default for FeedPreferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            expanded: false,
        }
    }
}

/// Feed configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Records kept before eviction.
    /// Default: 50
    pub capacity: usize,

    /// Initial preferences.
    pub preferences: FeedPreferences,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: NOTIFICATION_CAPACITY,
            preferences: FeedPreferences::default(),
        }
    }
}

/// State shared with the dispatcher handlers.
struct FeedState {
    buffer: Mutex<NotificationBuffer>,
    preferences: RwLock<FeedPreferences>,
    scope: RwLock<ScopeKey>,
    builder: NotificationBuilder,
}

impl FeedState {
    fn accept<T, B>(&self, event: &ChangeEvent<T>, build: B)
    where
        B: Fn(&NotificationBuilder, &ChangeEvent<T>) -> Option<NotificationRecord>,
    {
        // Overlapping scopes held by other views deliver the same change
        // again; only our own scope's copy counts.
        if event.scope != *self.scope.read() {
            return;
        }
        if let Some(record) = build(&self.builder, event) {
            let sound_enabled = self.preferences.read().sound_enabled;
            self.buffer.lock().add_with_cue(record, sound_enabled);
        }
    }
}

/// A live notification feed bound to one scope.
///
/// Owns its subscription and handler registrations; dropping the feed (or
/// calling [`detach`](Self::detach)) releases all of them.
pub struct NotificationFeed {
    hub: RealtimeHub,
    state: Arc<FeedState>,
    subscription: SubscriptionGuard,
    _handlers: Vec<HandlerGuard>,
}

impl NotificationFeed {
    /// Subscribe `scope` and start collecting notifications.
    pub fn attach(
        hub: &RealtimeHub,
        scope: ScopeKey,
        config: FeedConfig,
        cue: Option<Arc<dyn AudioCue>>,
    ) -> Self {
        let mut buffer = NotificationBuffer::with_capacity(config.capacity);
        if let Some(cue) = cue {
            buffer = buffer.with_cue(cue);
        }

        let state = Arc::new(FeedState {
            buffer: Mutex::new(buffer),
            preferences: RwLock::new(config.preferences),
            scope: RwLock::new(scope.clone()),
            builder: NotificationBuilder::new(),
        });

        let posts = Arc::clone(&state);
        let replies = Arc::clone(&state);
        let votes = Arc::clone(&state);
        let handlers = vec![
            hub.on_post_change(move |event| posts.accept(event, NotificationBuilder::from_post)),
            hub.on_reply_change(move |event| {
                replies.accept(event, NotificationBuilder::from_reply)
            }),
            hub.on_vote_change(move |event| votes.accept(event, NotificationBuilder::from_vote)),
        ];

        Self {
            hub: hub.clone(),
            subscription: hub.subscribe(scope),
            state,
            _handlers: handlers,
        }
    }

    /// Move the feed to another scope. The new scope is acquired before the
    /// old one is released.
    pub fn switch_scope(&mut self, scope: ScopeKey) {
        let next = self.hub.subscribe(scope.clone());
        *self.state.scope.write() = scope;
        let previous = std::mem::replace(&mut self.subscription, next);
        previous.unsubscribe();
    }

    pub fn scope(&self) -> ScopeKey {
        self.state.scope.read().clone()
    }

    /// Release the subscription and handlers now. Both are released by
    /// their guards' `Drop`.
    pub fn detach(self) {
        drop(self);
    }

    // --- Buffer commands ---

    pub fn mark_read(&self, id: &NotificationId) -> bool {
        self.state.buffer.lock().mark_read(id)
    }

    pub fn mark_all_read(&self) {
        self.state.buffer.lock().mark_all_read();
    }

    pub fn clear(&self) {
        self.state.buffer.lock().clear();
    }

    /// Mark read and return where the "view" action should go.
    pub fn open(&self, id: &NotificationId) -> Option<Target> {
        self.state.buffer.lock().open(id)
    }

    pub fn unread_count(&self) -> usize {
        self.state.buffer.lock().unread_count()
    }

    /// Newest first.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.state.buffer.lock().records()
    }

    pub fn len(&self) -> usize {
        self.state.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.buffer.lock().is_empty()
    }

    // --- Preferences ---

    pub fn preferences(&self) -> FeedPreferences {
        *self.state.preferences.read()
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.state.preferences.write().sound_enabled = enabled;
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.state.preferences.write().expanded = expanded;
    }

    /// Flip the expanded state and return the new value.
    pub fn toggle_expanded(&self) -> bool {
        let mut preferences = self.state.preferences.write();
        preferences.expanded = !preferences.expanded;
        preferences.expanded
    }

    // --- Connection ---

    pub fn is_connected(&self) -> bool {
        self.hub.is_connected()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.hub.error()
    }

    /// The "retry" affordance.
    pub fn retry(&self) -> Result<()> {
        self.hub.connect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::notifications::{AudioError, NotificationKind};
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected_hub() -> (Arc<MemoryTransport>, RealtimeHub) {
        let transport = Arc::new(MemoryTransport::new());
        let hub = RealtimeHub::init(transport.clone(), HubConfig::default());
        hub.connect().unwrap();
        (transport, hub)
    }

    fn new_post(id: u64) -> serde_json::Value {
        json!({
            "mutationKind": "Inserted",
            "entityType": "post",
            "record": {"id": id, "title": format!("Post {id}"), "category_id": 3}
        })
    }

    #[test]
    fn test_feed_collects_notifications() {
        let (transport, hub) = connected_hub();
        let feed = NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), None);

        transport.publish_json("forum:all", &new_post(1));
        hub.pump();

        let records = feed.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, NotificationKind::NewPost);
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn test_feed_ignores_other_scopes() {
        let (transport, hub) = connected_hub();
        let feed = NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), None);
        let _other = hub.subscribe(ScopeKey::category("3"));

        transport.publish_json("forum:all", &new_post(1));
        transport.publish_json("forum:category:3", &new_post(1));
        hub.pump();

        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_sound_preference_gates_cue() {
        let (transport, hub) = connected_hub();
        let plays = Arc::new(AtomicUsize::new(0));
        let counter = plays.clone();
        let cue: Arc<dyn AudioCue> = Arc::new(move || -> std::result::Result<(), AudioError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let feed =
            NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), Some(cue));

        transport.publish_json("forum:all", &new_post(1));
        hub.pump();
        feed.set_sound_enabled(false);
        transport.publish_json("forum:all", &new_post(2));
        hub.pump();

        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn test_preferences() {
        let (_transport, hub) = connected_hub();
        let feed = NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), None);

        assert_eq!(feed.preferences(), FeedPreferences::default());
        assert!(feed.toggle_expanded());
        assert!(!feed.toggle_expanded());
        feed.set_expanded(true);
        assert!(feed.preferences().expanded);
    }

    #[test]
    fn test_switch_scope_moves_subscription() {
        let (transport, hub) = connected_hub();
        let mut feed =
            NotificationFeed::attach(&hub, ScopeKey::thread("1"), FeedConfig::default(), None);
        assert_eq!(hub.registry().ref_count(&ScopeKey::thread("1")), 1);

        feed.switch_scope(ScopeKey::thread("2"));
        assert_eq!(hub.registry().ref_count(&ScopeKey::thread("1")), 0);
        assert_eq!(hub.registry().ref_count(&ScopeKey::thread("2")), 1);
        assert_eq!(transport.open_channels().len(), 1);
        assert_eq!(feed.scope(), ScopeKey::thread("2"));
    }

    #[test]
    fn test_detach_releases_everything() {
        let (transport, hub) = connected_hub();
        let feed = NotificationFeed::attach(&hub, ScopeKey::Global, FeedConfig::default(), None);
        assert_eq!(transport.open_channels().len(), 1);

        feed.detach();
        assert!(transport.open_channels().is_empty());
        assert!(hub.registry().is_empty());
        assert_eq!(hub.dispatcher().handler_count(crate::types::EntityType::Post), 0);
    }
}
