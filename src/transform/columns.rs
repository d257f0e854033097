//! Columns transformer: projects each row onto a requested column list.
//! Resolves each requested name to a source index on first use (unknown
//! names are dropped), then projects every row against that fixed index
//! list (spec §4.9).

use crate::column::OrderedColumnSet;
use crate::error::Fallible;
use crate::job::Job;
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use std::sync::Arc;

pub struct ColumnsStream {
    source: Arc<dyn Stream>,
    requested: OrderedColumnSet,
    resolved: OrderedColumnSet,
}

impl ColumnsStream {
    pub fn new(source: Arc<dyn Stream>, requested: OrderedColumnSet, job: &Job) -> Fallible<Arc<dyn Stream>> {
        let source_columns = source.columns(job)?;
        let resolved = OrderedColumnSet::from_columns(
            requested.iter().filter(|c| source_columns.contains(c)).cloned().collect(),
        );
        Ok(Arc::new(ColumnsStream { source, requested, resolved }))
    }
}

impl Stream for ColumnsStream {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.resolved.clone())
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let (result, status) = self.source.fetch(job);
        let projected = result.map(|rows| {
            rows.into_iter()
                .map(|r| {
                    let values = self.resolved.iter().map(|c| r.get(c)).collect();
                    Row::new(values, self.resolved.clone())
                })
                .collect()
        });
        (projected, status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(ColumnsStream {
            source: self.source.clone_stream(),
            requested: self.requested.clone(),
            resolved: self.resolved.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::stream::InMemoryStream;
    use crate::value::Value;

    #[test]
    fn unknown_requested_columns_are_dropped() {
        let cols = OrderedColumnSet::from_names(["a", "b"]);
        let rows = vec![Row::new(vec![Value::Int(1), Value::Int(2)], cols.clone())];
        let source: Arc<dyn Stream> = Arc::new(InMemoryStream::new(cols, rows));
        let job = Job::new();
        let stream = ColumnsStream::new(source, OrderedColumnSet::from_names(["b", "z"]), &job).unwrap();
        assert_eq!(stream.columns(&job).unwrap().len(), 1);
        let out = crate::stream::drain_sequential(&*stream, &job).unwrap();
        assert!(matches!(out[0].get(&Column::new("b")), Value::Int(2)));
    }
}
