//! Aggregate and join scenario tests (spec scenarios S2 and S3) through the
//! public `DatasetOps` API.

use raveldb::column::{Column, OrderedColumnSet};
use raveldb::dataset::{Aggregation, Aggregator, DatasetOps, GroupBy, JoinKind, JoinSpec, RasterDataset};
use raveldb::expr::functions::Function;
use raveldb::expr::Expression;
use raveldb::job::Job;
use raveldb::raster::Raster;
use raveldb::row::Row;
use raveldb::value::{Binary, Value};

fn amounts(values: &[i64]) -> raveldb::dataset::DatasetRef {
    let columns = OrderedColumnSet::from_names(["n"]);
    let rows: Vec<Row> = values.iter().map(|v| Row::new(vec![Value::Int(*v)], columns.clone())).collect();
    RasterDataset::new(Raster::new(columns, rows))
}

#[test]
fn sum_grouped_by_remainder_mod_three() {
    let job = Job::new();
    let ds = amounts(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);

    let group_by = vec![GroupBy {
        expr: Expression::comparison(Expression::sibling(Column::new("n")), Expression::literal(3i64), Binary::Modulo),
        target: Column::new("bucket"),
    }];
    let aggregations = vec![Aggregation {
        aggregator: Aggregator { map: Expression::sibling(Column::new("n")), reduce: Function::Sum },
        target: Column::new("total"),
    }];

    let result = ds.aggregate(group_by, aggregations).unwrap().to_raster(&job).unwrap();
    assert_eq!(result.row_count(), 3);

    let mut totals = std::collections::HashMap::new();
    for i in 0..result.row_count() {
        let bucket = match result.value(i, &Column::new("bucket")) {
            Value::Int(b) => b,
            other => panic!("unexpected bucket value: {other:?}"),
        };
        let total = match result.value(i, &Column::new("total")) {
            Value::Int(t) => t,
            other => panic!("unexpected total value: {other:?}"),
        };
        totals.insert(bucket, total);
    }
    assert_eq!(totals.get(&0), Some(&18)); // 3 + 6 + 9
    assert_eq!(totals.get(&1), Some(&12)); // 1 + 4 + 7
    assert_eq!(totals.get(&2), Some(&15)); // 2 + 5 + 8
}

#[test]
fn aggregate_rejects_overlapping_group_and_aggregation_targets() {
    let ds = amounts(&[1, 2, 3]);
    let group_by = vec![GroupBy { expr: Expression::sibling(Column::new("n")), target: Column::new("n") }];
    let aggregations = vec![Aggregation {
        aggregator: Aggregator { map: Expression::sibling(Column::new("n")), reduce: Function::Sum },
        target: Column::new("n"),
    }];
    assert!(ds.aggregate(group_by, aggregations).is_err());
}

fn orders_and_customers() -> (raveldb::dataset::DatasetRef, raveldb::dataset::DatasetRef) {
    let order_columns = OrderedColumnSet::from_names(["order_id", "customer_id", "total"]);
    let order_rows = vec![
        Row::new(vec![Value::Int(100), Value::Int(1), Value::Int(50)], order_columns.clone()),
        Row::new(vec![Value::Int(101), Value::Int(2), Value::Int(75)], order_columns.clone()),
        Row::new(vec![Value::Int(102), Value::Int(1), Value::Int(25)], order_columns.clone()),
        Row::new(vec![Value::Int(103), Value::Int(9), Value::Int(10)], order_columns.clone()),
    ];
    let orders = RasterDataset::new(Raster::new(order_columns, order_rows));

    let customer_columns = OrderedColumnSet::from_names(["id", "name"]);
    let customer_rows = vec![
        Row::new(vec![Value::Int(1), Value::String("ann".into())], customer_columns.clone()),
        Row::new(vec![Value::Int(2), Value::String("bo".into())], customer_columns.clone()),
    ];
    let customers = RasterDataset::new(Raster::new(customer_columns, customer_rows));
    (orders, customers)
}

#[test]
fn inner_join_drops_orders_with_no_matching_customer() {
    let job = Job::new();
    let (orders, customers) = orders_and_customers();

    let expr = Expression::comparison(
        Expression::sibling(Column::new("customer_id")),
        Expression::foreign(Column::new("id")),
        Binary::Equal,
    );
    let joined = orders.join(JoinSpec { kind: JoinKind::Inner, foreign: customers, expression: expr });
    let result = joined.to_raster(&job).unwrap();

    // order 103 (customer_id 9) has no match and is dropped.
    assert_eq!(result.row_count(), 3);
}

#[test]
fn left_join_pads_unmatched_rows_with_empty() {
    let job = Job::new();
    let (orders, customers) = orders_and_customers();

    let expr = Expression::comparison(
        Expression::sibling(Column::new("customer_id")),
        Expression::foreign(Column::new("id")),
        Binary::Equal,
    );
    let joined = orders.join(JoinSpec { kind: JoinKind::Left, foreign: customers, expression: expr });
    let result = joined.to_raster(&job).unwrap();

    assert_eq!(result.row_count(), 4);
    let unmatched_row = (0..result.row_count())
        .find(|&i| matches!(result.value(i, &Column::new("customer_id")), Value::Int(9)))
        .expect("unmatched order present");
    assert!(matches!(result.value(unmatched_row, &Column::new("name")), Value::Empty));
}
