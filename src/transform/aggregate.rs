//! Aggregate transformer (C9): groups rows by a tuple of group-by
//! expressions and reduces reducer-backed aggregators per group.
//!
//! Spec §4.9 describes the grouping structure as a "catalog" — a prefix
//! tree keyed one level per group expression, with per-leaf locks. This
//! port flattens that tree into a single [`dashmap::DashMap`] keyed by
//! the full group-value tuple: the externally observable behavior (one
//! reducer set per distinct group, safe concurrent inserts, per-group
//! locking while adding) is identical, and `DashMap`'s sharded internal
//! locking is the crate's established concurrent-map idiom (see
//! `job.rs`'s progress table). `aggregate` never participates in the
//! coalesced optimizer (spec §4.7) — its base is always materialized
//! first.

use crate::column::{Column, OrderedColumnSet};
use crate::dataset::{Aggregation, Dataset, DatasetRef, GroupBy};
use crate::error::Fallible;
use crate::job::Job;
use crate::raster::Raster;
use crate::reducers::Reducer;
use crate::row::Row;
use crate::stream::{InMemoryStream, Stream};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::any::Any;
use std::sync::Arc;

type Catalog = DashMap<Vec<Value>, Mutex<Vec<Box<dyn Reducer>>>>;

pub struct AggregateDataset {
    base: DatasetRef,
    group_by: Vec<GroupBy>,
    aggregations: Vec<Aggregation>,
}

impl AggregateDataset {
    pub fn new(base: DatasetRef, group_by: Vec<GroupBy>, aggregations: Vec<Aggregation>) -> DatasetRef {
        Arc::new(AggregateDataset { base, group_by, aggregations })
    }

    fn result_columns(&self) -> OrderedColumnSet {
        let mut cols = OrderedColumnSet::new();
        for g in &self.group_by {
            cols.try_push(g.target.clone());
        }
        for a in &self.aggregations {
            cols.try_push(a.target.clone());
        }
        cols
    }
}

impl Dataset for AggregateDataset {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.result_columns())
    }

    fn to_stream(&self) -> Arc<dyn Stream> {
        let job = Job::new();
        let raster = self.to_raster(&job).unwrap_or_else(|_| Raster::new(OrderedColumnSet::new(), vec![]));
        Arc::new(InMemoryStream::new(raster.columns(), raster.rows()))
    }

    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        let rows = crate::stream::drain_sequential(&*self.base.to_stream(), job)?;
        let result_columns = self.result_columns();
        let catalog: Catalog = DashMap::new();

        rows.par_iter().enumerate().for_each(|(i, row)| {
            if i % crate::job::CANCELLATION_CHECK_INTERVAL as usize == 0 && job.is_cancelled() {
                return;
            }
            let group_key: Vec<Value> = self.group_by.iter().map(|g| g.expr.prepare().apply(row, None, None)).collect();
            let leaf = catalog
                .entry(group_key)
                .or_insert_with(|| Mutex::new(self.aggregations.iter().map(new_reducer_for).collect()));
            let mut reducers = leaf.lock();
            for (reducer, agg) in reducers.iter_mut().zip(self.aggregations.iter()) {
                let value = agg.aggregator.map.prepare().apply(row, None, None);
                reducer.add(&value);
            }
        });

        let out: Vec<Row> = catalog
            .into_iter()
            .map(|(group_key, reducers)| {
                let mut values = group_key;
                for reducer in reducers.into_inner() {
                    values.push(reducer.result());
                }
                Row::new(values, result_columns.clone())
            })
            .collect();

        Ok(Raster::new(result_columns, out))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn new_reducer_for(agg: &Aggregation) -> Box<dyn Reducer> {
    agg.aggregator
        .reduce
        .reducer()
        .unwrap_or_else(|| panic!("function '{}' has no reducer; not aggregate-eligible", agg.aggregator.reduce.name()))
}
