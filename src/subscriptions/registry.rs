//! Reference-counted registry multiplexing consumers onto transport channels.

use super::types::{ScopeKey, SubscriptionGuard};
use crate::transport::{ChannelHandle, ChannelId, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry entry for one distinct scope.
struct Subscription {
    ref_count: usize,
    /// Distinguishes this entry from earlier ones for the same scope.
    generation: u64,
    /// `None` while offline or after a failed open.
    channel: Option<ChannelHandle>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ScopeKey, Subscription>,
    /// Open channel -> scope it carries.
    routes: HashMap<ChannelId, ScopeKey>,
    online: bool,
}

impl RegistryState {
    fn open(&mut self, transport: &dyn Transport, scope: &ScopeKey) -> bool {
        let topic = scope.topic();
        match transport.open_channel(&topic) {
            Ok(handle) => {
                debug!(scope = %scope, channel = %handle.id(), "channel opened");
                self.routes.insert(handle.id(), scope.clone());
                if let Some(entry) = self.entries.get_mut(scope) {
                    entry.channel = Some(handle);
                }
                true
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "failed to open channel");
                false
            }
        }
    }
}

/// Maps logical scopes to transport channels, one channel per distinct scope.
///
/// The lookup, refcount bump and channel open for a scope happen under one
/// lock, so concurrent subscribers of the same scope never open two channels.
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    state: Mutex<RegistryState>,
    next_generation: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create a registry over `transport`. It starts offline.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            state: Mutex::new(RegistryState::default()),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Take a reference to `scope`.
    ///
    /// The first reference opens the scope's channel (immediately when online,
    /// otherwise on the next connect). The returned guard releases the
    /// reference when dropped.
    pub fn subscribe(self: &Arc<Self>, scope: ScopeKey) -> SubscriptionGuard {
        let mut state = self.state.lock();

        let entry = state.entries.entry(scope.clone()).or_insert_with(|| Subscription {
            ref_count: 0,
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            channel: None,
        });
        entry.ref_count += 1;
        let generation = entry.generation;
        let needs_channel = entry.channel.is_none();

        debug!(scope = %scope, refs = entry.ref_count, "subscribed");

        if needs_channel && state.online {
            state.open(self.transport.as_ref(), &scope);
        }

        SubscriptionGuard {
            registry: Arc::downgrade(self),
            scope,
            generation,
            released: false,
        }
    }

    /// Drop one reference. Called by [`SubscriptionGuard`].
    pub(crate) fn release(&self, scope: &ScopeKey, generation: u64) {
        let mut state = self.state.lock();

        let remaining = match state.entries.get_mut(scope) {
            Some(entry) if entry.generation == generation => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count
            }
            _ => return,
        };

        debug!(scope = %scope, refs = remaining, "released");

        if remaining == 0 {
            if let Some(entry) = state.entries.remove(scope) {
                if let Some(handle) = entry.channel {
                    state.routes.remove(&handle.id());
                    debug!(scope = %scope, channel = %handle.id(), "channel closed");
                    self.transport.close_channel(handle);
                }
            }
        }
    }

    /// The connection came up: open a channel for every entry lacking one.
    ///
    /// Returns the number of channels opened.
    pub(crate) fn on_connected(&self) -> usize {
        let mut state = self.state.lock();
        state.online = true;

        let pending: Vec<ScopeKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.channel.is_none())
            .map(|(scope, _)| scope.clone())
            .collect();

        let mut opened = 0;
        for scope in &pending {
            if state.open(self.transport.as_ref(), scope) {
                opened += 1;
            }
        }
        opened
    }

    /// The connection went away. Channels are gone, refcounts are kept so
    /// the next connect restores every scope.
    pub(crate) fn on_disconnected(&self) {
        let mut state = self.state.lock();
        state.online = false;
        state.routes.clear();
        for entry in state.entries.values_mut() {
            entry.channel = None;
        }
    }

    /// Close every channel and forget every entry. Outstanding guards become
    /// no-ops.
    pub(crate) fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        state.online = false;
        state.routes.clear();

        let mut closed = 0;
        for (_, entry) in state.entries.drain() {
            if let Some(handle) = entry.channel {
                self.transport.close_channel(handle);
                closed += 1;
            }
        }
        closed
    }

    /// Scope carried by an open channel, if any entry owns it.
    pub fn route(&self, channel: ChannelId) -> Option<ScopeKey> {
        self.state.lock().routes.get(&channel).cloned()
    }

    /// Current refcount of `scope` (0 when absent).
    pub fn ref_count(&self, scope: &ScopeKey) -> usize {
        self.state
            .lock()
            .entries
            .get(scope)
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    /// Scopes with at least one reference.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Number of registered scopes.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently holding an open channel.
    pub fn open_channel_count(&self) -> usize {
        self.state.lock().routes.len()
    }
}
