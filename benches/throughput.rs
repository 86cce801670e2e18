use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use fitsync::{
    mutation::Mutation,
    persist::{memory::MemoryMedium, sqlite::SqliteMedium},
    queue::QueueStore,
    remote::MemoryRemote,
    sync::SyncCoordinator,
    types::Fields,
};

fn set_fields(i: u64) -> Fields {
    json!({"id": i, "reps": 8 + i % 5, "weight_kg": 60.0 + (i % 20) as f64})
        .as_object()
        .cloned()
        .expect("object")
}

fn filled(n: u64) -> QueueStore {
    let queue = QueueStore::new(MemoryMedium::new());
    for i in 0..n {
        queue
            .enqueue(Mutation::insert("sets", set_fields(i)))
            .expect("enqueue");
    }
    queue
}

fn bench_enqueue(c: &mut Criterion) {
    c.bench_function("queue_enqueue_500_memory", |b| {
        b.iter(|| filled(500));
    });

    c.bench_function("queue_enqueue_100_sqlite", |b| {
        b.iter(|| {
            let queue = QueueStore::new(SqliteMedium::open_in_memory().expect("sqlite"));
            for i in 0..100u64 {
                queue
                    .enqueue(Mutation::update("sets", i as i64, set_fields(i)))
                    .expect("enqueue");
            }
        });
    });
}

fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_list");
    for n in [10u64, 100, 1000] {
        let queue = filled(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &queue, |b, queue| {
            b.iter(|| queue.list());
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    c.bench_function("replay_200", |b| {
        b.iter(|| {
            let queue = Arc::new(filled(200));
            let coordinator = SyncCoordinator::new(queue, Arc::new(MemoryRemote::new()));
            rt.block_on(coordinator.replay()).expect("replay")
        });
    });
}

criterion_group!(benches, bench_enqueue, bench_list, bench_replay);
criterion_main!(benches);
