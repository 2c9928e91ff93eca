//! Windowed sequence enumeration benchmark
//!
//! Measures the two regimes of the start-ordered cache: a clean cache (binary
//! search plus linear scan) and a dirty cache (one full re-sort first).
//!
//! ```bash
//! cargo bench --bench sequence_enumeration
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use replitrace::messages::{EndpointId, ProtocolId, SequenceId};
use replitrace::model::{DataModel, SequenceKey};

/// Model with `count` sequences on one track, ids deliberately not in start order
fn populated(count: u64) -> (DataModel, SequenceKey) {
    let mut model = DataModel::new();
    let path = model.intern("/Game/Foo");
    let key = SequenceKey {
        protocol: ProtocolId(1),
        path,
        sequence: SequenceId(0),
    };
    for i in 0..count {
        let id = (i * 7919) % count;
        let start = i as f64 * 0.01;
        let key = SequenceKey {
            sequence: SequenceId(id),
            ..key
        };
        model.touch_sequence(key, EndpointId(1), start);
        model.sink_sequence(key, EndpointId(1), start + 0.05);
    }
    (model, key)
}

fn bench_enumerate_clean(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumerate_clean");
    for count in [1_000u64, 100_000] {
        let (model, key) = populated(count);
        let track = model.object_track(key.protocol, key.path).unwrap();
        track.enumerate_sequences(0.0, 0.0);

        let middle = count as f64 * 0.005;
        group.bench_with_input(BenchmarkId::from_parameter(count), &middle, |b, &middle| {
            b.iter(|| black_box(track.enumerate_sequences(middle, middle + 1.0)));
        });
    }
    group.finish();
}

fn bench_enumerate_after_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumerate_after_insert");
    for count in [1_000u64, 10_000] {
        let (mut model, key) = populated(count);
        let mut next = count;
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                next += 1;
                let key = SequenceKey {
                    sequence: SequenceId(next),
                    ..key
                };
                model.touch_sequence(key, EndpointId(2), 1.0);
                let track = model.object_track(key.protocol, key.path).unwrap();
                black_box(track.enumerate_sequences(0.5, 1.5))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enumerate_clean, bench_enumerate_after_insert);
criterion_main!(benches);
