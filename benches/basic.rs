use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gb_bench::dataset::Dataset;
use gb_bench::engine::{EngineKind, GroupQuery};

// Native engines on 1e5 rows at a low and a high group count.
fn bench_engines(c: &mut Criterion) {
    let rows = 100_000;
    let query = GroupQuery::default();
    let mut group = c.benchmark_group("group_by_1e5");
    for groups in [100, rows / 10] {
        let ds = match Dataset::generate(rows, groups, &mut ChaCha8Rng::seed_from_u64(42)) {
            Ok(ds) => ds,
            Err(e) => panic!("bench dataset: {}", e),
        };
        for kind in [EngineKind::BTree, EngineKind::Hash, EngineKind::Par, EngineKind::Sorted] {
            let mut engine = match kind.create(0) {
                Ok(e) => e,
                Err(e) => panic!("engine {}: {}", kind, e),
            };
            group.bench_with_input(BenchmarkId::new(kind.name(), groups), &ds, |b, ds| {
                b.iter(|| black_box(engine.aggregate(ds, &query).ok()))
            });
        }
    }
    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    c.bench_function("generate_1e5_n10", |b| {
        b.iter(|| black_box(Dataset::generate(100_000, 10_000, &mut ChaCha8Rng::seed_from_u64(1)).ok()))
    });
}

criterion_group!(benches, bench_engines, bench_generate);
criterion_main!(benches);
