//! Performance benchmarks for the realtime core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forum_realtime::{
    ChangeDispatcher, FeedConfig, HubConfig, MemoryTransport, MutationKind, NotificationBuffer,
    NotificationFeed, NotificationId, NotificationKind, NotificationRecord, RealtimeHub, ScopeKey,
    Timestamp, WireFormat, WireMessage,
};
use serde_json::json;
use std::sync::Arc;

fn reply_frame(id: usize) -> Vec<u8> {
    WireMessage::new(
        MutationKind::Inserted,
        "reply",
        json!({"id": id, "post_id": "42", "content": "benchmark reply body"}),
    )
    .encode(WireFormat::Json)
    .unwrap()
}

/// Benchmark dispatch with varying handler counts
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let scope = ScopeKey::thread("42");
    let frame = reply_frame(1);

    for handlers in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("handlers", handlers),
            &handlers,
            |b, &count| {
                let dispatcher = ChangeDispatcher::new();
                let _guards: Vec<_> = (0..count)
                    .map(|_| dispatcher.on_reply_change(|event| {
                        black_box(&event.record.id);
                    }))
                    .collect();

                b.iter(|| {
                    black_box(dispatcher.dispatch_frame(&scope, &frame, WireFormat::Json));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark buffer adds past the eviction boundary
fn bench_buffer_add(c: &mut Criterion) {
    c.bench_function("buffer_add_evicting", |b| {
        let mut buffer = NotificationBuffer::new();
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            buffer.add(NotificationRecord::new(
                NotificationId(format!("post-{n}-{n}")),
                NotificationKind::NewPost,
                "New post",
                "bench",
                Timestamp(n as i64),
            ));
            black_box(buffer.unread_count());
        });
    });
}

/// Benchmark the full transport -> feed path
fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");

    for batch in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &size| {
            let transport = Arc::new(MemoryTransport::new());
            let hub = RealtimeHub::init(transport.clone(), HubConfig::default());
            hub.connect().unwrap();
            let feed =
                NotificationFeed::attach(&hub, ScopeKey::thread("42"), FeedConfig::default(), None);
            let frames: Vec<Vec<u8>> = (0..size).map(reply_frame).collect();

            b.iter(|| {
                for frame in &frames {
                    transport.publish("forum:thread:42", frame);
                }
                black_box(hub.pump());
            });

            black_box(feed.unread_count());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_buffer_add, bench_end_to_end);
criterion_main!(benches);
