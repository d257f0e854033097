//! Calculate transformer: resolves the target column's index in the
//! schema on first use (appending it if new), then for each row
//! substitutes `Identity` with the target column's current cell value
//! (`Empty` if newly appended) and writes back the result. The
//! expression is `prepare()`'d once at construction (spec §4.9).

use crate::column::{Column, OrderedColumnSet};
use crate::error::Fallible;
use crate::expr::Expression;
use crate::job::Job;
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use std::sync::Arc;

pub struct CalculateStream {
    source: Arc<dyn Stream>,
    target: Column,
    expr: Expression,
    result_columns: OrderedColumnSet,
}

impl CalculateStream {
    pub fn new(source: Arc<dyn Stream>, target: Column, expr: Expression, job: &Job) -> Fallible<Arc<dyn Stream>> {
        let mut result_columns = source.columns(job)?;
        result_columns.try_push(target.clone());
        Ok(Arc::new(CalculateStream { source, target, expr: expr.prepare(), result_columns }))
    }
}

impl Stream for CalculateStream {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.result_columns.clone())
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let (result, status) = self.source.fetch(job);
        let calculated = result.map(|rows| {
            rows.into_iter()
                .map(|mut r| {
                    let current = r.get(&self.target);
                    let value = self.expr.apply(&r, None, Some(&current));
                    r.set(self.target.clone(), value);
                    r
                })
                .collect()
        });
        (calculated, status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(CalculateStream {
            source: self.source.clone_stream(),
            target: self.target.clone(),
            expr: self.expr.clone(),
            result_columns: self.result_columns.clone(),
        })
    }
}
