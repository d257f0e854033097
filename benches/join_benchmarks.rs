//! Hash-join performance benchmarks over varying row counts.
//!
//! Grounded on `src/raster.rs`'s `hash_or_cartesian_join` tests; these
//! benchmarks exercise the same join spec through the public `Dataset`
//! fluent API (`DatasetOps::join`) rather than calling the raster
//! directly, so a regression in the optimizer's join dispatch shows up
//! here too.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use raveldb::column::{Column, OrderedColumnSet};
use raveldb::dataset::{DatasetOps, JoinKind, JoinSpec, RasterDataset};
use raveldb::expr::Expression;
use raveldb::job::Job;
use raveldb::raster::Raster;
use raveldb::row::Row;
use raveldb::value::{Binary, Value};

fn make_dataset(columns: &OrderedColumnSet, row_count: usize, key_modulus: i64) -> raveldb::dataset::DatasetRef {
    let rows: Vec<Row> = (0..row_count)
        .map(|i| Row::new(vec![Value::Int((i as i64) % key_modulus), Value::Int(i as i64)], columns.clone()))
        .collect();
    RasterDataset::new(Raster::new(columns.clone(), rows))
}

fn bench_hash_join(c: &mut Criterion) {
    let left_columns = OrderedColumnSet::from_names(["key", "left_value"]);
    let right_columns = OrderedColumnSet::from_names(["key", "right_value"]);

    let mut group = c.benchmark_group("hash_join");
    for &size in &[1_000usize, 10_000, 100_000] {
        let left = make_dataset(&left_columns, size, (size / 10).max(1) as i64);
        let right = make_dataset(&right_columns, size / 10, (size / 10).max(1) as i64);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let expr = Expression::comparison(
                Expression::sibling(Column::new("key")),
                Expression::foreign(Column::new("key")),
                Binary::Equal,
            );
            b.iter(|| {
                let job = Job::new();
                let spec = JoinSpec { kind: JoinKind::Inner, foreign: right.clone(), expression: expr.clone() };
                let joined = left.join(spec);
                joined.to_raster(&job).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_cartesian_fallback(c: &mut Criterion) {
    let left_columns = OrderedColumnSet::from_names(["a"]);
    let right_columns = OrderedColumnSet::from_names(["b"]);
    let left = make_dataset(&left_columns, 200, 200);
    let right = make_dataset(&right_columns, 200, 200);

    c.bench_function("cartesian_join_200x200", |b| {
        let expr = Expression::comparison(
            Expression::sibling(Column::new("a")),
            Expression::foreign(Column::new("b")),
            Binary::Greater,
        );
        b.iter(|| {
            let job = Job::new();
            let spec = JoinSpec { kind: JoinKind::Inner, foreign: right.clone(), expression: expr.clone() };
            let joined = left.join(spec);
            joined.to_raster(&job).unwrap()
        });
    });
}

criterion_group!(benches, bench_hash_join, bench_cartesian_fallback);
criterion_main!(benches);
