use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use sysdash::{
    metrics::{
        data::{CpuPercent, MemoryUsage, NetworkInfo},
        fake::ScriptedSource,
        History,
    },
    MetricKind, Reading, Sampler, SamplerConfig, Snapshot, SnapshotStore,
};
use tokio_util::sync::CancellationToken;

fn snapshot(sequence: u64) -> Snapshot {
    let mut builder = Snapshot::builder(sequence, sequence);
    builder
        .record(
            MetricKind::Cpu,
            CpuPercent::new((sequence % 100) as f32).map(Reading::CpuPercent),
        )
        .record(
            MetricKind::Memory,
            MemoryUsage::from_bytes(4 << 30, 16 << 30).map(Reading::MemoryUsage),
        )
        .record(
            MetricKind::Network,
            Ok(Reading::NetworkInfo(NetworkInfo {
                interface_count: 3,
                active_connections: 42,
            })),
        );
    builder.build()
}

/// Benchmark publishing into the store and reading it back
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for capacity in [10usize, 100, 1000] {
        let store = SnapshotStore::new(capacity);
        let mut sequence = 0;
        group.bench_with_input(BenchmarkId::new("publish", capacity), &capacity, |b, _| {
            b.iter(|| {
                sequence += 1;
                store
                    .publish(Arc::new(snapshot(sequence)))
                    .expect("Should publish")
            })
        });
    }

    let store = SnapshotStore::default();
    store.publish(Arc::new(snapshot(1))).expect("Should publish");
    group.bench_function("latest", |b| b.iter(|| store.latest()));
    group.bench_function("history", |b| b.iter(|| store.history()));

    group.finish();
}

/// Benchmark the CPU trend buffer at different capacities
fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    for capacity in [10usize, 100, 1000] {
        let mut history = History::with_capacity(capacity);
        group.bench_with_input(BenchmarkId::new("push", capacity), &capacity, |b, _| {
            b.iter(|| history.push(42.0))
        });
    }

    group.finish();
}

/// Benchmark JSON serialization of snapshots
fn bench_json_serialization(c: &mut Criterion) {
    let snapshot = snapshot(7);

    c.bench_function("json_serialization", |b| {
        b.iter(|| serde_json::to_string(&snapshot).expect("Should serialize"))
    });

    let json = serde_json::to_string(&snapshot).expect("Should serialize");
    c.bench_function("json_deserialization", |b| {
        b.iter(|| serde_json::from_str::<Snapshot>(&json).expect("Should deserialize"))
    });
}

/// Benchmark one full sampler tick against the scripted source
fn bench_sampler_tick(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let config = SamplerConfig::default()
        .with_cpu_window_ms(0)
        .with_metric_timeout_ms(1000);
    let store = Arc::new(SnapshotStore::new(config.history_capacity));
    let mut sampler = Sampler::new(Arc::new(ScriptedSource::default()), store, config)
        .expect("Should create sampler");
    let cancel = CancellationToken::new();

    let mut group = c.benchmark_group("sampler");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("tick", |b| {
        b.iter(|| rt.block_on(sampler.tick(&cancel)).expect("Should publish"))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_store,
    bench_history,
    bench_json_serialization,
    bench_sampler_tick
);
criterion_main!(benches);
