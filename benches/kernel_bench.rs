//! Benchmarks for the kernel services.
//!
//! Benchmarks cover:
//! - Event bus publish with fan-out, transient and recorded names
//! - Deferred queue redelivery
//! - Pattern matching
//! - Scheduler submit-to-resolve round trips
//! - Time wheel scheduling and ticking

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use craftkernel::bus::{EventBus, EventSink, Pattern};
use craftkernel::config::{BusConfig, WheelConfig};
use craftkernel::core::Scheduler;
use craftkernel::timer::TimeWheel;
use serde_json::json;

// ============================================================================
// Helper Functions
// ============================================================================

fn bus_with_listeners(listeners: usize) -> EventBus {
    let bus = EventBus::new(BusConfig::default()).unwrap();
    for i in 0..listeners {
        let pattern = if i % 2 == 0 { "^storage%." } else { "changed$" };
        bus.subscribe(pattern, |e| {
            black_box(&e.data);
            Ok(())
        })
        .unwrap();
    }
    bus
}

// ============================================================================
// Event Bus Benchmarks
// ============================================================================

fn bench_bus_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");

    for listeners in [0, 4, 16] {
        let bus = bus_with_listeners(listeners);
        group.bench_with_input(
            BenchmarkId::new("recorded", listeners),
            &listeners,
            |b, _| {
                b.iter(|| black_box(bus.publish("storage.changed", json!({ "slot": 1 }))));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("transient", listeners),
            &listeners,
            |b, _| {
                b.iter(|| black_box(bus.publish("ui.tick", json!(null))));
            },
        );
    }
    group.finish();
}

fn bench_bus_process_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_process_queue");
    group.throughput(Throughput::Elements(50));

    group.bench_function("drain_full_queue", |b| {
        let bus = bus_with_listeners(4);
        b.iter(|| {
            for i in 0..50 {
                bus.publish("storage.changed", json!({ "i": i }));
            }
            black_box(bus.process_queue(50));
        });
    });
    group.finish();
}

fn bench_pattern_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_match");

    for source in ["^input%.", "^%a+%.%a+$", "^net%..-done$"] {
        let pattern = Pattern::compile(source).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(source), &pattern, |b, p| {
            b.iter(|| black_box(p.matches("net.fetch.done")));
        });
    }
    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_scheduler_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_round_trip");

    for workers in [1, 4] {
        let bus = Arc::new(EventBus::new(BusConfig::default()).unwrap());
        let sink: Arc<dyn EventSink> = bus;
        let sched = Scheduler::new(sink);
        sched.create_pool("bench", workers).unwrap();
        sched.start_workers().unwrap();

        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let futures: Vec<_> = (0..100u64)
                    .map(|i| sched.submit("bench", "noop", move || Ok(i * 2)).unwrap())
                    .collect();
                for future in futures {
                    black_box(future.wait().unwrap());
                }
            });
        });
        sched.shutdown();
    }
    group.finish();
}

// ============================================================================
// Time Wheel Benchmarks
// ============================================================================

fn bench_wheel_schedule_and_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("wheel_schedule_and_tick");

    for callbacks in [60, 600, 6_000] {
        group.throughput(Throughput::Elements(callbacks));
        group.bench_with_input(
            BenchmarkId::from_parameter(callbacks),
            &callbacks,
            |b, &callbacks| {
                b.iter(|| {
                    let wheel = TimeWheel::new(WheelConfig::default(), None);
                    for i in 0..callbacks {
                        wheel.schedule(i % 60, || {});
                    }
                    for _ in 0..60 {
                        black_box(wheel.tick());
                    }
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    bus_benches,
    bench_bus_publish,
    bench_bus_process_queue,
    bench_pattern_match
);

criterion_group!(scheduler_benches, bench_scheduler_round_trip);

criterion_group!(wheel_benches, bench_wheel_schedule_and_tick);

criterion_main!(bus_benches, scheduler_benches, wheel_benches);
