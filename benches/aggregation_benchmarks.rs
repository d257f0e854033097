//! Grouped-aggregation performance benchmarks over varying row counts.
//!
//! Grounded on `src/transform/aggregate.rs`'s scenario tests (sum grouped
//! by a modulus key); scaled up here across three orders of magnitude.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use raveldb::column::{Column, OrderedColumnSet};
use raveldb::dataset::{Aggregation, Aggregator, DatasetOps, GroupBy, RasterDataset};
use raveldb::expr::functions::Function;
use raveldb::expr::Expression;
use raveldb::job::Job;
use raveldb::raster::Raster;
use raveldb::row::Row;
use raveldb::value::{Binary, Value};

fn make_dataset(row_count: usize, group_modulus: i64) -> raveldb::dataset::DatasetRef {
    let columns = OrderedColumnSet::from_names(["key", "amount"]);
    let rows: Vec<Row> = (0..row_count)
        .map(|i| Row::new(vec![Value::Int((i as i64) % group_modulus), Value::Int(i as i64)], columns.clone()))
        .collect();
    RasterDataset::new(Raster::new(columns, rows))
}

fn bench_sum_grouped_by_mod(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_sum_grouped");
    for &size in &[1_000usize, 10_000, 100_000] {
        let dataset = make_dataset(size, 32);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let job = Job::new();
                let group_by = vec![GroupBy {
                    expr: Expression::comparison(Expression::sibling(Column::new("key")), Expression::literal(32i64), Binary::Modulo),
                    target: Column::new("group"),
                }];
                let aggregations = vec![Aggregation {
                    aggregator: Aggregator { map: Expression::sibling(Column::new("amount")), reduce: Function::Sum },
                    target: Column::new("total"),
                }];
                let aggregated = dataset.aggregate(group_by, aggregations).unwrap();
                aggregated.to_raster(&job).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sum_grouped_by_mod);
criterion_main!(benches);
