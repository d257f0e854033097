//! Limit transformer: stateful position counter under a mutex. Passes
//! rows until the running total reaches `n`, splitting the batch that
//! crosses the boundary; emits `Finished` the instant exactly `n` rows
//! have been delivered (spec §4.9).

use crate::column::OrderedColumnSet;
use crate::error::Fallible;
use crate::job::Job;
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct LimitStream {
    source: Arc<dyn Stream>,
    n: usize,
    delivered: Mutex<usize>,
}

impl LimitStream {
    pub fn new(source: Arc<dyn Stream>, n: usize) -> Arc<dyn Stream> {
        Arc::new(LimitStream { source, n, delivered: Mutex::new(0) })
    }
}

impl Stream for LimitStream {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        self.source.columns(job)
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let mut delivered = self.delivered.lock();
        if *delivered >= self.n {
            return (Ok(Vec::new()), StreamStatus::Finished);
        }
        let (result, source_status) = self.source.fetch(job);
        let rows = match result {
            Ok(r) => r,
            Err(e) => return (Err(e), StreamStatus::Finished),
        };
        let remaining = self.n - *delivered;
        let take = remaining.min(rows.len());
        let truncated: Vec<Row> = rows.into_iter().take(take).collect();
        *delivered += truncated.len();
        let status = if *delivered >= self.n || source_status == StreamStatus::Finished {
            StreamStatus::Finished
        } else {
            StreamStatus::HasMore
        };
        (Ok(truncated), status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(LimitStream { source: self.source.clone_stream(), n: self.n, delivered: Mutex::new(0) })
    }
}
