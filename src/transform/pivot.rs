//! Pivot transformer: reshapes rows into a cross-tabulation. Every
//! distinct row-key value becomes one output row; every distinct value
//! observed in `column_key_source` becomes one output column (named by
//! that value's display string); each cell reduces `value` over the
//! rows sharing that row key and that column key, using `reduce`.
//!
//! Never participates in the coalesced optimizer — the base is always
//! materialized first (see `DatasetOps::pivot` in `dataset/mod.rs`).

use crate::column::{Column, OrderedColumnSet};
use crate::dataset::{Dataset, DatasetRef, RasterDataset};
use crate::error::{EngineError, Fallible};
use crate::expr::functions::Function;
use crate::expr::Expression;
use crate::job::Job;
use crate::raster::Raster;
use crate::reducers::Reducer;
use crate::row::Row;
use crate::value::Value;
use std::collections::HashMap;

pub fn pivot(
    base: DatasetRef,
    row_key: Expression,
    column_key_source: Column,
    value: Expression,
    reduce: Function,
) -> Fallible<DatasetRef> {
    if !reduce.is_aggregate_eligible() {
        return Err(EngineError::Schema(format!("pivot: function '{}' has no reducer; not aggregate-eligible", reduce.name())));
    }

    let job = Job::new();
    let rows = crate::stream::drain_sequential(&*base.to_stream(), &job)?;

    // First-seen order for both row keys and column keys, so the output is
    // deterministic for a deterministic input order.
    let mut row_order: Vec<Value> = Vec::new();
    let mut row_index: HashMap<Value, usize> = HashMap::new();
    let mut column_order: Vec<Value> = Vec::new();
    let mut column_index: HashMap<Value, usize> = HashMap::new();
    let mut cells: HashMap<(usize, usize), Box<dyn Reducer>> = HashMap::new();

    for row in &rows {
        let row_key_value = row_key.apply(row, None, None);
        let column_key_value = row.get(&column_key_source);
        if row_key_value.is_invalid() || column_key_value.is_invalid() {
            continue;
        }
        let ri = *row_index.entry(row_key_value.clone()).or_insert_with(|| {
            row_order.push(row_key_value.clone());
            row_order.len() - 1
        });
        let ci = *column_index.entry(column_key_value.clone()).or_insert_with(|| {
            column_order.push(column_key_value.clone());
            column_order.len() - 1
        });
        let cell = cells.entry((ri, ci)).or_insert_with(|| reduce.reducer().expect("checked aggregate-eligible above"));
        cell.add(&value.apply(row, None, None));
    }

    let mut result_columns = OrderedColumnSet::new();
    result_columns.try_push(Column::new("row"));
    for v in &column_order {
        let base_name = v.to_display_string();
        let unique_name = {
            let existing = &result_columns;
            OrderedColumnSet::new_name(&base_name, |candidate| !existing.contains(&Column::new(candidate)))
        };
        result_columns.try_push(Column::new(unique_name));
    }

    let out_rows: Vec<Row> = row_order
        .iter()
        .enumerate()
        .map(|(ri, row_key_value)| {
            let mut values = Vec::with_capacity(result_columns.len());
            values.push(row_key_value.clone());
            for ci in 0..column_order.len() {
                let v = cells.get(&(ri, ci)).map(|r| r.result()).unwrap_or(Value::Empty);
                values.push(v);
            }
            Row::new(values, result_columns.clone())
        })
        .collect();

    Ok(RasterDataset::new(Raster::new(result_columns, out_rows)))
}
