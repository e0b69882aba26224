//! The single logical connection to the event-stream backend.

use super::types::{ConnectionSnapshot, ConnectionStatus, EventSink, Transport, TransportEvent};
use crate::error::{RealtimeError, Result};
use crate::subscriptions::SubscriptionRegistry;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

struct ConnState {
    status: ConnectionStatus,
    error: Option<String>,
    /// Incremented each time an attempt starts.
    attempt: u64,
    /// Set by `disconnect` while an attempt is in flight.
    cancelled: bool,
    /// Queue the current transport session delivers into.
    inbound: Option<Receiver<TransportEvent>>,
    torn_down: bool,
}

impl ConnState {
    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Owns the connection lifecycle. Never retries on its own: after a failure
/// or a drop it stays disconnected until `connect` is called again.
pub struct Connection {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    state: Mutex<ConnState>,
    settled: Condvar,
    observers: Mutex<Vec<Sender<ConnectionSnapshot>>>,
    /// Held by a handshake worker from `Transport::connect` until its session
    /// is either handed over or torn down. A worker that outlives its attempt
    /// finishes before the next one touches the transport.
    gate: Arc<Mutex<()>>,
    connect_timeout: Duration,
    inbound_capacity: usize,
}

impl Connection {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        connect_timeout: Duration,
        inbound_capacity: usize,
    ) -> Self {
        Self {
            transport,
            registry,
            state: Mutex::new(ConnState {
                status: ConnectionStatus::Disconnected,
                error: None,
                attempt: 0,
                cancelled: false,
                inbound: None,
                torn_down: false,
            }),
            settled: Condvar::new(),
            observers: Mutex::new(Vec::new()),
            gate: Arc::new(Mutex::new(())),
            connect_timeout,
            inbound_capacity: inbound_capacity.max(1),
        }
    }

    /// Connect, or join the attempt already in flight.
    ///
    /// No-op when already connected. On success every registered scope gets
    /// its channel back exactly once.
    pub fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.torn_down {
            return Err(RealtimeError::TornDown);
        }

        match state.status {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Connecting => {
                let joined = state.attempt;
                while state.status == ConnectionStatus::Connecting && state.attempt == joined {
                    self.settled.wait(&mut state);
                }
                return match state.status {
                    ConnectionStatus::Connected => Ok(()),
                    _ if state.torn_down => Err(RealtimeError::TornDown),
                    _ if state.cancelled => Err(RealtimeError::Cancelled),
                    _ => Err(RealtimeError::ConnectionFailed(
                        state
                            .error
                            .clone()
                            .unwrap_or_else(|| "connection attempt failed".to_string()),
                    )),
                };
            }
            ConnectionStatus::Disconnected => {}
        }

        state.status = ConnectionStatus::Connecting;
        state.attempt += 1;
        state.cancelled = false;
        let snapshot = state.snapshot();
        drop(state);
        self.publish(snapshot);

        let (sink, inbound) = bounded(self.inbound_capacity);
        let outcome = self.handshake(sink);

        let mut state = self.state.lock();
        let result = match outcome {
            Ok(()) if state.torn_down || state.cancelled => {
                // Still `Connecting`, so no newer session can exist yet.
                self.transport.disconnect();
                state.status = ConnectionStatus::Disconnected;
                info!("realtime connection attempt cancelled");
                if state.torn_down {
                    Err(RealtimeError::TornDown)
                } else {
                    Err(RealtimeError::Cancelled)
                }
            }
            Ok(()) => {
                state.inbound = Some(inbound);
                let resubscribed = self.registry.on_connected();
                state.status = ConnectionStatus::Connected;
                state.error = None;
                info!(resubscribed, "realtime connection established");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "realtime connection failed");
                state.status = ConnectionStatus::Disconnected;
                state.cancelled = false;
                state.error = Some(e.to_string());
                Err(e)
            }
        };
        let snapshot = state.snapshot();
        self.settled.notify_all();
        drop(state);
        self.publish(snapshot);

        result
    }

    /// Run the transport handshake on a helper thread, bounded by the
    /// connect timeout.
    ///
    /// A timed-out attempt is marked abandoned. If its handshake later
    /// succeeds, the worker disconnects that session itself while still
    /// holding the gate, so it can never close a session opened by a later
    /// attempt.
    fn handshake(&self, sink: EventSink) -> Result<()> {
        let (done_tx, done_rx) = bounded(1);
        let abandoned = Arc::new(Mutex::new(false));
        let transport = Arc::clone(&self.transport);
        let gate = Arc::clone(&self.gate);
        let worker_abandoned = Arc::clone(&abandoned);

        thread::Builder::new()
            .name("realtime-connect".into())
            .spawn(move || {
                let _session = gate.lock();
                let result = transport.connect(sink);
                let abandoned = worker_abandoned.lock();
                if *abandoned {
                    if result.is_ok() {
                        debug!("tearing down handshake that completed after its timeout");
                        transport.disconnect();
                    }
                    return;
                }
                let _ = done_tx.send(result);
            })
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        match done_rx.recv_timeout(self.connect_timeout) {
            Ok(result) => result.map_err(Into::into),
            Err(RecvTimeoutError::Timeout) => {
                let mut abandoned = abandoned.lock();
                // The worker may have reported between the timeout and the lock.
                if let Ok(result) = done_rx.try_recv() {
                    return result.map_err(Into::into);
                }
                *abandoned = true;
                Err(RealtimeError::ConnectTimeout(self.connect_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RealtimeError::ConnectionFailed(
                "connect worker exited without a result".to_string(),
            )),
        }
    }

    /// Close the connection on request. Not an error; scope intent survives.
    ///
    /// While an attempt is in flight this cancels it: the attempt closes its
    /// session when the handshake settles and `connect` returns `Cancelled`.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        match state.status {
            ConnectionStatus::Connecting => {
                state.cancelled = true;
                return;
            }
            ConnectionStatus::Disconnected if state.inbound.is_none() => return,
            _ => {}
        }
        self.transport.disconnect();
        self.registry.on_disconnected();
        state.inbound = None;
        state.status = ConnectionStatus::Disconnected;
        let snapshot = state.snapshot();
        drop(state);
        info!("realtime connection closed");
        self.publish(snapshot);
    }

    /// The transport reported a drop.
    pub(crate) fn mark_dropped(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.status != ConnectionStatus::Connected {
            return;
        }
        self.registry.on_disconnected();
        state.inbound = None;
        state.status = ConnectionStatus::Disconnected;
        state.error = Some(reason.to_string());
        let snapshot = state.snapshot();
        drop(state);
        warn!(reason, "realtime connection dropped");
        self.publish(snapshot);
    }

    /// Disconnect for good. Later `connect` calls fail with `TornDown`.
    pub(crate) fn teardown(&self) {
        self.state.lock().torn_down = true;
        self.disconnect();
        self.settled.notify_all();
        self.observers.lock().clear();
    }

    /// Queue of the current transport session, if connected.
    pub(crate) fn inbound(&self) -> Option<Receiver<TransportEvent>> {
        self.state.lock().inbound.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Last connection-level error, cleared on successful connect.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state.lock().snapshot()
    }

    /// Receive a snapshot now and on every later transition.
    pub fn observe(&self) -> Receiver<ConnectionSnapshot> {
        let (tx, rx) = unbounded();
        let _ = tx.send(self.snapshot());
        self.observers.lock().push(tx);
        rx
    }

    fn publish(&self, snapshot: ConnectionSnapshot) {
        self.observers
            .lock()
            .retain(|observer| observer.send(snapshot.clone()).is_ok());
    }
}
