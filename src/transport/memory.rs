//! In-process loopback transport.
//!
//! Behaves like a topic-based backend: `publish` delivers a frame to every
//! open channel on the topic. Connection failures, handshake delays, channel
//! rejections and drops can be scripted.

use super::types::{ChannelHandle, ChannelId, EventSink, Transport, TransportEvent};
use crate::error::TransportError;
use crossbeam_channel::TrySendError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Default)]
struct MemoryState {
    sink: Option<EventSink>,
    channels: HashMap<ChannelId, String>,
    next_channel: u64,
    connects: usize,
    opened: usize,
    closed: usize,
    dropped_frames: usize,
    scripted_failures: VecDeque<TransportError>,
    channel_rejections: VecDeque<String>,
    handshake_delay: Option<Duration>,
}

/// Loopback [`Transport`] for tests, benches and local embedding.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Scripting ---

    /// Make the next `connect` fail with `error`.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.state.lock().scripted_failures.push_back(error);
    }

    /// Make the next `open_channel` fail.
    pub fn reject_next_channel(&self, reason: impl Into<String>) {
        self.state.lock().channel_rejections.push_back(reason.into());
    }

    /// Sleep this long inside every handshake.
    pub fn set_handshake_delay(&self, delay: Option<Duration>) {
        self.state.lock().handshake_delay = delay;
    }

    /// Simulate the backend dropping the connection.
    pub fn drop_connection(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.channels.clear();
        if let Some(sink) = state.sink.take() {
            let _ = sink.try_send(TransportEvent::Closed {
                reason: reason.into(),
            });
        }
    }

    // --- Publishing ---

    /// Deliver raw bytes to every open channel on `topic`.
    ///
    /// Returns the number of channels that received the frame.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> usize {
        let mut state = self.state.lock();
        let Some(sink) = state.sink.clone() else {
            return 0;
        };

        let targets: Vec<ChannelId> = state
            .channels
            .iter()
            .filter(|(_, t)| t.as_str() == topic)
            .map(|(id, _)| *id)
            .collect();

        let mut delivered = 0;
        for channel in targets {
            let frame = TransportEvent::Frame {
                channel,
                payload: payload.to_vec(),
            };
            match sink.try_send(frame) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    state.dropped_frames += 1;
                    warn!(topic, channel = %channel, "inbound queue full, frame dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    state.dropped_frames += 1;
                }
            }
        }
        delivered
    }

    /// Serialize `message` as JSON and publish it.
    pub fn publish_json<M: Serialize>(&self, topic: &str, message: &M) -> usize {
        match serde_json::to_vec(message) {
            Ok(bytes) => self.publish(topic, &bytes),
            Err(e) => {
                warn!(topic, error = %e, "failed to encode message");
                0
            }
        }
    }

    // --- Introspection ---

    pub fn is_connected(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Successful handshakes so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Channels opened so far.
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Channels explicitly closed so far.
    pub fn closed_count(&self) -> usize {
        self.state.lock().closed
    }

    pub fn dropped_frames(&self) -> usize {
        self.state.lock().dropped_frames
    }

    /// Currently open channels with their topics.
    pub fn open_channels(&self) -> Vec<(ChannelId, String)> {
        let mut channels: Vec<_> = self
            .state
            .lock()
            .channels
            .iter()
            .map(|(id, topic)| (*id, topic.clone()))
            .collect();
        channels.sort_by_key(|(id, _)| id.0);
        channels
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, sink: EventSink) -> Result<(), TransportError> {
        let delay = self.state.lock().handshake_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        state.channels.clear();
        state.sink = Some(sink);
        state.connects += 1;
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.sink = None;
        state.channels.clear();
    }

    fn open_channel(&self, topic: &str) -> Result<ChannelHandle, TransportError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(TransportError::Closed);
        }
        if let Some(reason) = state.channel_rejections.pop_front() {
            return Err(TransportError::ChannelRejected {
                topic: topic.to_string(),
                reason,
            });
        }

        state.next_channel += 1;
        let id = ChannelId(state.next_channel);
        state.channels.insert(id, topic.to_string());
        state.opened += 1;
        Ok(ChannelHandle::new(id, topic))
    }

    fn close_channel(&self, channel: ChannelHandle) {
        let mut state = self.state.lock();
        if state.channels.remove(&channel.id()).is_some() {
            state.closed += 1;
        }
    }
}
