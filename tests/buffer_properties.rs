//! Property tests for the notification buffer's read tracking.

use forum_realtime::{
    NotificationBuffer, NotificationId, NotificationKind, NotificationRecord, Timestamp,
    NOTIFICATION_CAPACITY,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Add,
    MarkRead(usize),
    MarkAllRead,
    Open(usize),
    Clear,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Add),
        3 => (0usize..80).prop_map(Op::MarkRead),
        1 => Just(Op::MarkAllRead),
        1 => (0usize..80).prop_map(Op::Open),
        1 => Just(Op::Clear),
    ]
}

fn record(n: usize) -> NotificationRecord {
    NotificationRecord::new(
        NotificationId(format!("reply-{n}-{n}")),
        NotificationKind::NewReply,
        "New reply",
        format!("reply {n}"),
        Timestamp(n as i64),
    )
}

fn unread_in(buffer: &NotificationBuffer) -> usize {
    buffer.iter().filter(|r| !r.is_read()).count()
}

/// Id of the record at `index`, newest first, if there is one.
fn id_at(buffer: &NotificationBuffer, index: usize) -> Option<NotificationId> {
    buffer.iter().nth(index).map(|r| r.id.clone())
}

proptest! {
    #[test]
    fn unread_count_tracks_unread_records(ops in prop::collection::vec(arb_op(), 0..300)) {
        let mut buffer = NotificationBuffer::new();
        let mut added = 0;

        for op in ops {
            match op {
                Op::Add => {
                    buffer.add(record(added));
                    added += 1;
                }
                Op::MarkRead(index) => {
                    if let Some(id) = id_at(&buffer, index) {
                        buffer.mark_read(&id);
                    }
                }
                Op::MarkAllRead => buffer.mark_all_read(),
                Op::Open(index) => {
                    if let Some(id) = id_at(&buffer, index) {
                        buffer.open(&id);
                    }
                }
                Op::Clear => buffer.clear(),
            }

            prop_assert_eq!(buffer.unread_count(), unread_in(&buffer));
            prop_assert!(buffer.len() <= NOTIFICATION_CAPACITY);
        }
    }

    #[test]
    fn mark_read_twice_moves_count_at_most_once(count in 1usize..120, pick in 0usize..120) {
        let mut buffer = NotificationBuffer::new();
        for n in 0..count {
            buffer.add(record(n));
        }
        let before = buffer.unread_count();

        if let Some(id) = id_at(&buffer, pick) {
            buffer.mark_read(&id);
            buffer.mark_read(&id);
            prop_assert_eq!(buffer.unread_count(), before - 1);
        } else {
            prop_assert_eq!(buffer.unread_count(), before);
        }
    }

    #[test]
    fn eviction_keeps_newest(capacity in 1usize..60, count in 0usize..150) {
        let mut buffer = NotificationBuffer::with_capacity(capacity);
        for n in 0..count {
            buffer.add(record(n));
        }

        prop_assert_eq!(buffer.len(), count.min(capacity));
        prop_assert_eq!(buffer.unread_count(), count.min(capacity));
        if count > 0 {
            let newest = NotificationId(format!("reply-{}-{}", count - 1, count - 1));
            prop_assert!(buffer.get(&newest).is_some());
        }
        if count > capacity {
            let evicted = NotificationId(format!("reply-{}-{}", count - capacity - 1, count - capacity - 1));
            prop_assert!(buffer.get(&evicted).is_none());
        }
    }
}
