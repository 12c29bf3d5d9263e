//! # Relay Benchmarks
//!
//! | Area | Measured |
//! |------|----------|
//! | Event bus | waited emit across 1..64 subscribers in one tier |
//! | Event bus | validation of a rejected payload |
//! | Topology | validator check for allowed and refused patterns |
//! | Streaming | publish of a 20 ms S16LE chunk to N pull subscribers |

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_bus::{handler_fn, EmitOptions, EventBus, SubscriptionSpec, ValidationMode};
use relay_stream::{BackpressurePolicy, StreamingChannel, SubscriberConfig};
use relay_types::events::{DECISION_INTENT_GENERATED, INPUT_MESSAGE_READY};
use relay_types::{AudioChunk, DomainTag, Event, Layer, MessagePayload};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Event bus
// ============================================================================

fn bench_emit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-bus");
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [1usize, 8, 64] {
        let bus = Arc::new(EventBus::layered(ValidationMode::Permissive));
        for _ in 0..subscribers {
            bus.on(
                SubscriptionSpec::new(INPUT_MESSAGE_READY),
                handler_fn(|event: Arc<Event>| async move {
                    black_box(&event.payload);
                    Ok(())
                }),
            )
            .unwrap();
        }
        let message = MessagePayload::new("benchmark message", "bench");

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("emit_waiting", subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&rt).iter(|| {
                    let bus = Arc::clone(&bus);
                    let message = message.clone();
                    async move {
                        black_box(
                            bus.emit(INPUT_MESSAGE_READY, message, "bench", EmitOptions::waiting())
                                .await
                                .unwrap(),
                        )
                    }
                })
            },
        );
    }

    let bus = Arc::new(EventBus::layered(ValidationMode::Permissive));
    let message = MessagePayload::new("wrong kind", "bench");
    group.bench_function("emit_rejected_payload", |b| {
        b.to_async(&rt).iter(|| {
            let bus = Arc::clone(&bus);
            let message = message.clone();
            async move {
                black_box(
                    bus.emit(DECISION_INTENT_GENERATED, message, "bench", EmitOptions::default())
                        .await
                        .is_err(),
                )
            }
        })
    });

    group.finish();
}

fn bench_validator(c: &mut Criterion) {
    let bus = EventBus::layered(ValidationMode::Strict);
    let validator = bus.validator();
    let output = DomainTag::for_layer(Layer::Output);

    let mut group = c.benchmark_group("topology");
    group.bench_function("check_allowed", |b| {
        b.iter(|| black_box(validator.allows(&output, DECISION_INTENT_GENERATED)))
    });
    group.bench_function("check_refused", |b| {
        b.iter(|| black_box(validator.allows(&output, INPUT_MESSAGE_READY)))
    });
    group.finish();
}

// ============================================================================
// Streaming channel
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("streaming");

    // 20 ms of 16 kHz mono S16LE.
    let payload = Bytes::from(vec![0u8; 640]);

    for subscribers in [1usize, 4, 16] {
        let channel = Arc::new(StreamingChannel::new());
        // Drop-oldest keeps the queues bounded without a consumer.
        let _receivers: Vec<_> = (0..subscribers)
            .map(|i| {
                channel
                    .subscribe_queue(
                        &format!("sub-{i}"),
                        SubscriberConfig::new(64, BackpressurePolicy::DropOldest),
                    )
                    .unwrap()
            })
            .collect();

        group.throughput(Throughput::Bytes((payload.len() * subscribers) as u64));
        group.bench_with_input(
            BenchmarkId::new("publish_drop_oldest", subscribers),
            &subscribers,
            |b, _| {
                let mut sequence = 0u64;
                b.to_async(&rt).iter(|| {
                    sequence += 1;
                    let channel = Arc::clone(&channel);
                    let chunk = AudioChunk::new(sequence, payload.clone());
                    async move { black_box(channel.publish(chunk).await.unwrap()) }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_emit, bench_validator, bench_publish);

criterion_main!(benches);
