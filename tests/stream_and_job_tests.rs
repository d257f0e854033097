//! Integration tests for the stream-puller order guarantee and
//! cooperative cancellation, driven end-to-end through a `RasterDataset`
//! rather than a hand-built `Stream` (the unit tests in
//! `src/stream/puller.rs` already cover the puller in isolation).

use raveldb::column::{Column, OrderedColumnSet};
use raveldb::dataset::{DatasetOps, RasterDataset};
use raveldb::job::Job;
use raveldb::raster::Raster;
use raveldb::row::Row;
use raveldb::value::Value;

fn sequential_dataset(n: i64) -> raveldb::dataset::DatasetRef {
    let columns = OrderedColumnSet::from_names(["i"]);
    let rows: Vec<Row> = (0..n).map(|i| Row::new(vec![Value::Int(i)], columns.clone())).collect();
    RasterDataset::new(Raster::new(columns, rows))
}

#[test]
fn draining_a_large_dataset_through_the_stream_preserves_order() {
    let job = Job::new();
    let ds = sequential_dataset(2_000);
    let rows = stream_drain(&ds, &job);
    for (i, row) in rows.iter().enumerate() {
        assert!(matches!(row.get(&Column::new("i")), Value::Int(v) if v == i as i64));
    }
}

#[test]
fn cancelling_a_job_before_draining_still_resolves() {
    let job = Job::new();
    job.cancel();
    let ds = sequential_dataset(500);
    // A cancelled job must not hang; drain_concurrent must still return.
    let rows = raveldb::stream::puller::drain_concurrent(ds.to_stream(), &job, 4).unwrap();
    assert!(rows.len() <= 500);
}

#[test]
fn a_filtered_pipeline_still_preserves_row_order_end_to_end() {
    let job = Job::new();
    let ds = sequential_dataset(1_000);
    let plan = ds.filter(raveldb::expr::Expression::comparison(
        raveldb::expr::Expression::sibling(Column::new("i")),
        raveldb::expr::Expression::literal(500i64),
        raveldb::value::Binary::Less,
    ));
    let rows = stream_drain(&plan, &job);
    assert_eq!(rows.len(), 500);
    for (i, row) in rows.iter().enumerate() {
        assert!(matches!(row.get(&Column::new("i")), Value::Int(v) if v == i as i64));
    }
}

fn stream_drain(ds: &raveldb::dataset::DatasetRef, job: &Job) -> Vec<Row> {
    raveldb::stream::puller::drain_concurrent(ds.to_stream(), job, raveldb::dataset::default_wavefronts()).unwrap()
}
