//! Offset transformer: skips the first `k` rows; position counter under
//! a mutex (spec §4.9).

use crate::column::OrderedColumnSet;
use crate::error::Fallible;
use crate::job::Job;
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct OffsetStream {
    source: Arc<dyn Stream>,
    k: usize,
    skipped: Mutex<usize>,
}

impl OffsetStream {
    pub fn new(source: Arc<dyn Stream>, k: usize) -> Arc<dyn Stream> {
        Arc::new(OffsetStream { source, k, skipped: Mutex::new(0) })
    }
}

impl Stream for OffsetStream {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        self.source.columns(job)
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let (result, status) = self.source.fetch(job);
        let rows = match result {
            Ok(r) => r,
            Err(e) => return (Err(e), status),
        };
        let mut skipped = self.skipped.lock();
        let to_skip = (self.k.saturating_sub(*skipped)).min(rows.len());
        *skipped += to_skip;
        let kept: Vec<Row> = rows.into_iter().skip(to_skip).collect();
        (Ok(kept), status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(OffsetStream { source: self.source.clone_stream(), k: self.k, skipped: Mutex::new(0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::stream::InMemoryStream;
    use crate::value::Value;

    #[test]
    fn skips_first_k_rows_across_batches() {
        let cols = OrderedColumnSet::from_names(["a"]);
        let rows: Vec<Row> = (0..10).map(|i| Row::new(vec![Value::Int(i)], cols.clone())).collect();
        let source: Arc<dyn Stream> = Arc::new(InMemoryStream::with_batch_size(cols, rows, 4));
        let stream = OffsetStream::new(source, 5);
        let job = Job::new();
        let out = crate::stream::drain_sequential(&*stream, &job).unwrap();
        let vals: Vec<i64> = out.iter().map(|r| match r.get(&Column::new("a")) { Value::Int(i) => i, _ => unreachable!() }).collect();
        assert_eq!(vals, vec![5, 6, 7, 8, 9]);
    }
}
