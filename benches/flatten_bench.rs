use aggregate_patterns::{
    expand_join_rows, generate_matches, load_matches_joined, load_matches_per_table,
    seed_database, setup_database, BenchConfig, JoinShape,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rusqlite::Connection;

pub fn flatten_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");
    let matches = generate_matches(&BenchConfig::with_counts(10_000, 2, 3));

    for shape in JoinShape::ALL {
        let rows = expand_join_rows(&matches, shape);
        let flattener = shape.flattener();

        group.bench_function(shape.name(), |b| {
            b.iter(|| {
                let flattened = flattener.flatten(rows.iter().cloned()).unwrap();
                black_box(flattened);
            })
        });
    }

    let mut shuffled = expand_join_rows(&matches, JoinShape::TradeAndClearanceAdjustments);
    shuffled.reverse();
    let flattener = JoinShape::TradeAndClearanceAdjustments.flattener();
    group.bench_function("sorted-from-reversed", |b| {
        b.iter(|| {
            let flattened = flattener.flatten_sorted(shuffled.clone()).unwrap();
            black_box(flattened);
        })
    });
}

pub fn load_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    group.sample_size(10);

    let mut conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    seed_database(&mut conn, &generate_matches(&BenchConfig::with_counts(10_000, 2, 3))).unwrap();

    group.bench_function("joined", |b| {
        b.iter(|| {
            let matches =
                load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();
            black_box(matches);
        })
    });

    group.bench_function("per-table", |b| {
        b.iter(|| {
            let matches = load_matches_per_table(&conn).unwrap();
            black_box(matches);
        })
    });
}

criterion_group!(benches, flatten_benchmark, load_benchmark);
criterion_main!(benches);
