//! Join transformer and dataset.
//!
//! `JoinDataset::to_raster` materializes both sides fully and defers to
//! [`crate::raster::Raster::hash_or_cartesian_join`] — join never
//! participates in the coalesced optimizer, so both sides are already
//! forced by the time this runs.
//!
//! `JoinDataset::to_stream` takes a streaming path: the foreign side is
//! materialized into a raster once (lazily, on first `fetch`) and each
//! left-side batch is joined against it independently, so the left
//! stream never needs to be fully buffered. This does not additionally
//! push a per-batch foreign filter down before materializing the right
//! side — the foreign side is materialized once for the whole stream
//! rather than re-filtered per batch, trading that pushdown for a
//! simpler, still-correct single materialization. See DESIGN.md.

use crate::column::OrderedColumnSet;
use crate::dataset::{Dataset, DatasetRef, JoinKind, JoinSpec};
use crate::error::Fallible;
use crate::job::Job;
use crate::raster::{JoinType, Raster};
use crate::row::Row;
use crate::stream::{Stream, StreamStatus};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

pub struct JoinDataset {
    left: DatasetRef,
    spec: JoinSpec,
}

impl JoinDataset {
    pub fn new(left: DatasetRef, spec: JoinSpec) -> DatasetRef {
        Arc::new(JoinDataset { left, spec })
    }
}

fn to_raster_join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
    }
}

impl Dataset for JoinDataset {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        let left_columns = self.left.columns(job)?;
        let right_columns = self.spec.foreign.columns(job)?;
        let mut result = left_columns.clone();
        for c in right_columns.iter() {
            if !left_columns.contains(c) {
                result.try_push(c.clone());
            }
        }
        Ok(result)
    }

    fn to_stream(&self) -> Arc<dyn Stream> {
        Arc::new(JoinStream {
            left: self.left.to_stream(),
            foreign: self.spec.foreign.clone(),
            expression: self.spec.expression.clone(),
            join_type: to_raster_join_type(self.spec.kind),
            right_raster: Mutex::new(None),
        })
    }

    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        let left_raster = self.left.to_raster(job)?;
        let right_raster = self.spec.foreign.to_raster(job)?;
        Ok(left_raster.hash_or_cartesian_join(&right_raster, &self.spec.expression, to_raster_join_type(self.spec.kind), job))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct JoinStream {
    left: Arc<dyn Stream>,
    foreign: DatasetRef,
    expression: crate::expr::Expression,
    join_type: JoinType,
    right_raster: Mutex<Option<Arc<Raster>>>,
}

impl JoinStream {
    fn right_raster(&self, job: &Job) -> Fallible<Arc<Raster>> {
        let mut cached = self.right_raster.lock();
        if let Some(r) = &*cached {
            return Ok(r.clone());
        }
        let raster = Arc::new(self.foreign.to_raster(job)?);
        *cached = Some(raster.clone());
        Ok(raster)
    }
}

impl Stream for JoinStream {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        let left_columns = self.left.columns(job)?;
        let right_columns = self.foreign.columns(job)?;
        let mut result = left_columns.clone();
        for c in right_columns.iter() {
            if !left_columns.contains(c) {
                result.try_push(c.clone());
            }
        }
        Ok(result)
    }

    fn fetch(&self, job: &Job) -> (Fallible<Vec<Row>>, StreamStatus) {
        let right = match self.right_raster(job) {
            Ok(r) => r,
            Err(e) => return (Err(e), StreamStatus::Finished),
        };
        let (result, status) = self.left.fetch(job);
        let rows = match result {
            Ok(r) => r,
            Err(e) => return (Err(e), StreamStatus::Finished),
        };
        let left_columns = match self.left.columns(job) {
            Ok(c) => c,
            Err(e) => return (Err(e), StreamStatus::Finished),
        };
        let batch_raster = Raster::new(left_columns, rows);
        let joined = batch_raster.hash_or_cartesian_join(&right, &self.expression, self.join_type, job);
        (Ok(joined.rows()), status)
    }

    fn clone_stream(&self) -> Arc<dyn Stream> {
        Arc::new(JoinStream {
            left: self.left.clone_stream(),
            foreign: self.foreign.clone(),
            expression: self.expression.clone(),
            join_type: self.join_type,
            right_raster: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::dataset::{DatasetOps, RasterDataset};
    use crate::expr::Expression;
    use crate::value::{Binary, Value};

    fn make(columns: &[&str], rows: Vec<Vec<Value>>) -> DatasetRef {
        let cols = OrderedColumnSet::from_names(columns.iter().map(|s| s.to_string()));
        let row_values: Vec<Row> = rows.into_iter().map(|v| Row::new(v, cols.clone())).collect();
        RasterDataset::new(Raster::new(cols, row_values))
    }

    #[test]
    fn s3_inner_join_then_left_join() {
        let left = make(&["A", "B"], vec![vec![Value::Int(1), Value::String("x".into())], vec![Value::Int(2), Value::String("y".into())]]);
        let right = make(&["A", "C"], vec![
            vec![Value::Int(1), Value::String("p".into())],
            vec![Value::Int(1), Value::String("q".into())],
            vec![Value::Int(3), Value::String("r".into())],
        ]);
        let expr = Expression::comparison(Expression::sibling("A"), Expression::foreign("A"), Binary::Equal);
        let job = Job::new();

        let inner = left.join(JoinSpec { kind: JoinKind::Inner, foreign: right.clone(), expression: expr.clone() });
        let inner_raster = inner.to_raster(&job).unwrap();
        assert_eq!(inner_raster.row_count(), 2);

        let left_join = left.join(JoinSpec { kind: JoinKind::Left, foreign: right, expression: expr });
        let left_raster = left_join.to_raster(&job).unwrap();
        assert_eq!(left_raster.row_count(), 3);
        let unmatched_present = (0..left_raster.row_count()).any(|i| {
            matches!(left_raster.value(i, &Column::new("A")), Value::Int(2)) && left_raster.value(i, &Column::new("C")).is_empty()
        });
        assert!(unmatched_present);
    }

    #[test]
    fn join_stream_matches_raster_join() {
        let left = make(&["A"], vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]);
        let right = make(&["A", "C"], vec![vec![Value::Int(1), Value::Int(100)], vec![Value::Int(3), Value::Int(300)]]);
        let expr = Expression::comparison(Expression::sibling("A"), Expression::foreign("A"), Binary::Equal);
        let job = Job::new();
        let joined = left.join(JoinSpec { kind: JoinKind::Inner, foreign: right, expression: expr });
        let stream = joined.to_stream();
        let rows = crate::stream::drain_sequential(&*stream, &job).unwrap();
        assert_eq!(rows.len(), 2);
    }
}
