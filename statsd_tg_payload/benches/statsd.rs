//! Benchmarks for statsd line generation.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group};
use rand::{SeedableRng, rngs::SmallRng};
use statsd_tg_payload::{Generator, MAX_LINE_BYTES, Population, Statsd};
use std::time::Duration;

fn statsd_generate(c: &mut Criterion) {
    let statsd = Statsd::new(Population::default());
    c.bench_function("statsd_generate", |b| {
        let mut rng = SmallRng::seed_from_u64(19690716);
        b.iter(|| statsd.generate(&mut rng).expect("failed to generate event"));
    });
}

fn statsd_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("statsd_encode");
    for events in &[1_000u64, 100_000] {
        group.throughput(Throughput::Elements(*events));
        group.bench_with_input(BenchmarkId::from_parameter(events), events, |b, &events| {
            let statsd = Statsd::new(Population::default());
            let mut buf = [0u8; MAX_LINE_BYTES];
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(19690716);
                for _ in 0..events {
                    let event = statsd.generate(&mut rng).expect("failed to generate event");
                    event.encode(&mut buf).expect("failed to encode event");
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = statsd_generate, statsd_encode
);
