//! The process-wide realtime service tying all components together.

use crate::dispatch::{ChangeDispatcher, HandlerGuard, WireFormat};
use crate::error::{RealtimeError, Result};
use crate::subscriptions::{ScopeKey, SubscriptionGuard, SubscriptionRegistry};
use crate::transport::{
    Connection, ConnectionSnapshot, ConnectionStatus, Transport, TransportEvent,
};
use crate::types::{ChangeEvent, Post, Reply, Vote};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Hub configuration.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,

    /// Transport events queued before the transport starts dropping frames.
    pub inbound_capacity: usize,

    /// Encoding of inbound frames.
    pub wire_format: WireFormat,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            inbound_capacity: 1024,
            wire_format: WireFormat::Json,
        }
    }
}

struct HubInner {
    config: HubConfig,
    registry: Arc<SubscriptionRegistry>,
    connection: Connection,
    dispatcher: ChangeDispatcher,
    torn_down: AtomicBool,
}

/// One shared realtime service per application session.
///
/// Cloning yields another handle to the same service. Views subscribe scopes
/// and register handlers through it; the owner of the event loop calls
/// [`pump`](Self::pump) to move transport traffic through the dispatcher.
///
/// Provides:
/// - Connection lifecycle with manual retry
/// - Refcounted scope subscriptions
/// - Typed change handlers
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl RealtimeHub {
    /// Create the service. Nothing connects until [`connect`](Self::connect).
    pub fn init(transport: Arc<dyn Transport>, config: HubConfig) -> Self {
        let registry = SubscriptionRegistry::new(Arc::clone(&transport));
        let connection = Connection::new(
            transport,
            Arc::clone(&registry),
            config.connect_timeout,
            config.inbound_capacity,
        );

        Self {
            inner: Arc::new(HubInner {
                config,
                registry,
                connection,
                dispatcher: ChangeDispatcher::new(),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    // --- Connection ---

    /// Connect (or retry). Restores every registered scope on success.
    pub fn connect(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(RealtimeError::TornDown);
        }
        self.inner.connection.connect()
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Last connection-level error, if the most recent attempt or session failed.
    pub fn error(&self) -> Option<String> {
        self.inner.connection.error()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// Connection snapshots, starting with the current one.
    pub fn observe(&self) -> Receiver<ConnectionSnapshot> {
        self.inner.connection.observe()
    }

    // --- Subscriptions ---

    /// Take a reference to `scope`. Released when the guard drops.
    pub fn subscribe(&self, scope: ScopeKey) -> SubscriptionGuard {
        if self.is_torn_down() {
            return SubscriptionGuard::detached(scope);
        }
        self.inner.registry.subscribe(scope)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    // --- Handlers ---

    pub fn dispatcher(&self) -> &ChangeDispatcher {
        &self.inner.dispatcher
    }

    pub fn on_post_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Post>) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_post_change(handler)
    }

    pub fn on_reply_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Reply>) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_reply_change(handler)
    }

    pub fn on_vote_change<F>(&self, handler: F) -> HandlerGuard
    where
        F: Fn(&ChangeEvent<Vote>) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_vote_change(handler)
    }

    // --- Event loop ---

    /// Process every transport event queued so far.
    ///
    /// Returns the number of events taken off the queue.
    pub fn pump(&self) -> usize {
        match self.inner.connection.inbound() {
            Some(inbound) => self.drain(&inbound, 0),
            None => 0,
        }
    }

    /// Wait up to `timeout` for the first event, then drain like [`pump`](Self::pump).
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let Some(inbound) = self.inner.connection.inbound() else {
            return 0;
        };

        match inbound.recv_timeout(timeout) {
            Ok(event) => {
                if self.handle(event) {
                    self.drain(&inbound, 1)
                } else {
                    1
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn drain(&self, inbound: &Receiver<TransportEvent>, mut handled: usize) -> usize {
        while let Ok(event) = inbound.try_recv() {
            handled += 1;
            if !self.handle(event) {
                break;
            }
        }
        handled
    }

    /// Handle one event. Returns false once the session's queue is dead.
    fn handle(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Frame { channel, payload } => {
                match self.inner.registry.route(channel) {
                    Some(scope) => {
                        self.inner
                            .dispatcher
                            .dispatch_frame(&scope, &payload, self.inner.config.wire_format);
                    }
                    None => debug!(channel = %channel, "dropping frame from unowned channel"),
                }
                true
            }
            TransportEvent::Closed { reason } => {
                self.inner.connection.mark_dropped(&reason);
                false
            }
        }
    }

    // --- Lifecycle ---

    /// Close every channel, disconnect and drop every handler.
    ///
    /// Outstanding guards become no-ops; later `connect` calls fail with
    /// `TornDown` and `subscribe` hands out inert guards.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let closed = self.inner.registry.close_all();
        self.inner.connection.teardown();
        self.inner.dispatcher.clear();
        info!(closed, "realtime hub torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }
}
