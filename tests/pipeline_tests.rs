//! End-to-end dataset pipeline tests (spec scenarios S1 and S8), exercised
//! through the public `DatasetOps` fluent API against a `RasterDataset`.

use raveldb::column::{Column, OrderedColumnSet};
use raveldb::dataset::{DatasetOps, RasterDataset, SortOrder};
use raveldb::expr::Expression;
use raveldb::job::Job;
use raveldb::raster::Raster;
use raveldb::row::Row;
use raveldb::value::{Binary, Value};

fn people(rows: Vec<(i64, &str, i64)>) -> raveldb::dataset::DatasetRef {
    let columns = OrderedColumnSet::from_names(["id", "name", "age"]);
    let rows: Vec<Row> = rows
        .into_iter()
        .map(|(id, name, age)| Row::new(vec![Value::Int(id), Value::String(name.into()), Value::Int(age)], columns.clone()))
        .collect();
    RasterDataset::new(Raster::new(columns, rows))
}

#[test]
fn calculate_filter_select_columns_pipeline() {
    let job = Job::new();
    let ds = people(vec![(1, "ann", 30), (2, "bo", 17), (3, "cy", 45)]);

    let plan = ds
        .calculate(Column::new("is_adult"), Expression::comparison(Expression::sibling("age"), Expression::literal(18i64), Binary::GreaterOrEqual))
        .filter(Expression::sibling(Column::new("is_adult")))
        .select_columns(OrderedColumnSet::from_names(["name", "is_adult"]));

    let result = plan.to_raster(&job).unwrap();
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.columns().len(), 2);
    assert!(matches!(result.value(0, &Column::new("name")), Value::String(ref s) if s == "ann"));
}

#[test]
fn filter_after_calculate_produces_the_same_rows_as_an_unfused_pipeline() {
    let job = Job::new();
    let ds = people(vec![(1, "ann", 30), (2, "bo", 17), (3, "cy", 45), (4, "di", 12)]);

    let optimized = ds
        .calculate(Column::new("double_age"), Expression::comparison(Expression::sibling("age"), Expression::literal(2i64), Binary::Multiply))
        .filter(Expression::comparison(Expression::sibling(Column::new("double_age")), Expression::literal(60i64), Binary::Greater));

    let result = optimized.to_raster(&job).unwrap();
    // ages 30 and 45 double past 60; 17 and 12 do not.
    assert_eq!(result.row_count(), 2);
}

#[test]
fn sort_then_limit_then_offset_pages_through_results() {
    let job = Job::new();
    let ds = people(vec![(1, "ann", 30), (2, "bo", 17), (3, "cy", 45), (4, "di", 12)]);

    let plan = ds
        .sort(vec![SortOrder { expr: Expression::sibling(Column::new("age")), ascending: true }])
        .offset(1)
        .limit(2);

    let result = plan.to_raster(&job).unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(matches!(result.value(0, &Column::new("age")), Value::Int(17)));
    assert!(matches!(result.value(1, &Column::new("age")), Value::Int(30)));
}

#[test]
fn distinct_collapses_duplicate_rows() {
    let job = Job::new();
    let columns = OrderedColumnSet::from_names(["x"]);
    let rows = vec![
        Row::new(vec![Value::Int(1)], columns.clone()),
        Row::new(vec![Value::Int(1)], columns.clone()),
        Row::new(vec![Value::Int(2)], columns.clone()),
    ];
    let ds = RasterDataset::new(Raster::new(columns, rows));

    let result = ds.distinct().to_raster(&job).unwrap();
    assert_eq!(result.row_count(), 2);
}

#[test]
fn transpose_twice_round_trips_to_the_original_rows() {
    let job = Job::new();
    let ds = people(vec![(1, "ann", 30), (2, "bo", 17)]);

    let plan = ds.transpose().transpose();
    let result = plan.to_raster(&job).unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(matches!(result.value(0, &Column::new("name")), Value::String(ref s) if s == "ann"));
}

#[test]
fn sort_with_no_orders_leaves_row_order_unchanged() {
    let job = Job::new();
    let ds = people(vec![(1, "ann", 30), (2, "bo", 17)]);

    let plan = ds.sort(vec![]);
    let result = plan.to_raster(&job).unwrap();
    assert!(matches!(result.value(0, &Column::new("name")), Value::String(ref s) if s == "ann"));
    assert!(matches!(result.value(1, &Column::new("name")), Value::String(ref s) if s == "bo"));
}
