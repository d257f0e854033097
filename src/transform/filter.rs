//! Filter transformer: stateless, drops rows where the condition does
//! not evaluate to `Value::Bool(true)` (spec §4.9).

use crate::column::OrderedColumnSet;
use crate::error::Fallible;
use crate::expr::Expression;
use crate::job::Job;
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use crate::value::Value;
use std::sync::Arc;

pub struct FilterStream {
    source: Arc<dyn Stream>,
    condition: Expression,
}

impl FilterStream {
    pub fn new(source: Arc<dyn Stream>, condition: Expression) -> Arc<dyn Stream> {
        Arc::new(FilterStream { source, condition: condition.prepare() })
    }
}

impl Stream for FilterStream {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        self.source.columns(job)
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let (result, status) = self.source.fetch(job);
        let filtered = result.map(|rows| {
            rows.into_iter()
                .filter(|r| matches!(self.condition.apply(r, None, None), Value::Bool(true)))
                .collect()
        });
        (filtered, status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(FilterStream { source: self.source.clone_stream(), condition: self.condition.clone() })
    }
}
