//! Bounded notification feed with read tracking.

use super::sound::AudioCue;
use super::types::{NotificationId, NotificationRecord, Target};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Records kept before the oldest are evicted.
pub const NOTIFICATION_CAPACITY: usize = 50;

/// Ordered (newest first), bounded list of notifications.
///
/// The list is only reachable through these methods, which keeps
/// `unread_count` equal to the number of unread records after every call,
/// eviction included.
pub struct NotificationBuffer {
    records: VecDeque<NotificationRecord>,
    capacity: usize,
    unread: usize,
    cue: Option<Arc<dyn AudioCue>>,
}

impl NotificationBuffer {
    /// A buffer holding at most [`NOTIFICATION_CAPACITY`] records.
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
            unread: 0,
            cue: None,
        }
    }

    /// Play `cue` for records added with sound enabled.
    pub fn with_cue(mut self, cue: Arc<dyn AudioCue>) -> Self {
        self.cue = Some(cue);
        self
    }

    /// Prepend a record, evicting the oldest past capacity.
    ///
    /// The record is stored unread whatever its incoming flag says.
    pub fn add(&mut self, mut record: NotificationRecord) {
        record.is_read = false;
        self.records.push_front(record);
        self.unread += 1;

        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_back() {
                if !evicted.is_read {
                    self.unread -= 1;
                }
                debug!(id = %evicted.id, "notification evicted");
            }
        }
    }

    /// `add`, then play the cue once if `sound_enabled`.
    ///
    /// Playback failures are swallowed.
    pub fn add_with_cue(&mut self, record: NotificationRecord, sound_enabled: bool) {
        self.add(record);

        if !sound_enabled {
            return;
        }
        if let Some(cue) = &self.cue {
            if let Err(e) = cue.play() {
                debug!(error = %e, "notification cue not played");
            }
        }
    }

    /// Mark one record read. Returns true if it was unread.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.records.iter_mut().find(|r| &r.id == id) {
            Some(record) if !record.is_read => {
                record.is_read = true;
                self.unread -= 1;
                true
            }
            _ => false,
        }
    }

    /// Mark every record read.
    pub fn mark_all_read(&mut self) {
        for record in self.records.iter_mut() {
            record.is_read = true;
        }
        self.unread = 0;
    }

    /// The "view" action: mark read and return where to navigate.
    pub fn open(&mut self, id: &NotificationId) -> Option<Target> {
        self.mark_read(id);
        self.get(id).and_then(|record| record.target.clone())
    }

    /// Empty the buffer.
    pub fn clear(&mut self) {
        self.records.clear();
        self.unread = 0;
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.iter()
    }

    /// Owned copy of the records, newest first.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for NotificationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBuffer")
            .field("len", &self.records.len())
            .field("capacity", &self.capacity)
            .field("unread", &self.unread)
            .finish()
    }
}
