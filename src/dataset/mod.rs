//! # Dataset algebra (C7)
//!
//! `Dataset` is a logical, immutable value: constructing one does not
//! fetch data. Every relational operation returns a new `Dataset`;
//! `.select_columns(...)`/`.filter(...)`/etc. on a [`coalesced::CoalescedDataset`]
//! defer and fuse per the optimization laws in spec §4.7, while
//! `join`/`aggregate`/`pivot`/`flatten`/`random`/`union` force
//! materialization of any pending deferred op before applying (§4.7).
//!
//! Grounded on the teacher's subclass-polymorphic `Dataset`
//! implementations (raster/stream/coalesced/proxy, see spec.md §9
//! "Dataset polymorphism"): reworked into a `dyn Dataset` trait object
//! plus a `CoalescedDataset` wrapper variant, matching spec.md's explicit
//! guidance that a boxed `Dataset` suffices in place of a named
//! `ProxyDataset`.

pub mod coalesced;

use crate::column::{Column, OrderedColumnSet};
use crate::error::{EngineError, Fallible};
use crate::expr::functions::Function;
use crate::expr::Expression;
use crate::job::Job;
use crate::raster::{JoinType, Raster};
use crate::stream::puller::{drain_concurrent, CollectingSink};
use crate::stream::{puller, InMemoryStream, Stream};
use std::any::Any;
use std::sync::Arc;

pub type DatasetRef = Arc<dyn Dataset>;

/// The abstract relational-dataset interface. A value, not an action:
/// `to_stream`/`to_raster` are the only two ways data actually moves.
pub trait Dataset: Send + Sync + Any {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet>;
    fn to_stream(&self) -> Arc<dyn Stream>;
    fn to_raster(&self, job: &Job) -> Fallible<Raster>;
    fn as_any(&self) -> &dyn Any;
}

/// Default bridge: drain the dataset's stream with concurrent wavefronts
/// into a fresh raster. Used by every `Dataset` impl that has no more
/// direct materialization path — "any operation unimplemented in one
/// mode falls back to the other exactly once" (spec §1).
pub fn raster_via_stream(ds: &dyn Dataset, job: &Job) -> Fallible<Raster> {
    let columns = ds.columns(job)?;
    let rows = drain_concurrent(ds.to_stream(), job, default_wavefronts())?;
    Ok(Raster::new(columns, rows))
}

pub fn default_wavefronts() -> usize {
    num_cpus::get().max(1)
}

#[derive(Debug, Clone)]
pub struct SortOrder {
    pub expr: Expression,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    pub map: Expression,
    pub reduce: Function,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub aggregator: Aggregator,
    pub target: Column,
}

/// One group-by key: the expression evaluated per row, and the column
/// name its value is emitted under in the aggregate's output schema.
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub expr: Expression,
    pub target: Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

#[derive(Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub foreign: DatasetRef,
    pub expression: Expression,
}

/// `flatten(value, column_name?, row_identifier?)`: for each input row of
/// `c` columns, emits `c` output rows. The two optional fields are
/// present exactly when the corresponding constructor field is `Some`.
#[derive(Clone)]
pub struct FlattenSpec {
    pub value_column: Column,
    pub column_name_column: Option<Column>,
    pub row_identifier: Option<Expression>,
}

// ---------------------------------------------------------------------
// Concrete leaf datasets
// ---------------------------------------------------------------------

/// A dataset backed by an already-materialized [`Raster`].
pub struct RasterDataset {
    raster: Arc<Raster>,
}

impl RasterDataset {
    pub fn new(raster: Raster) -> DatasetRef {
        Arc::new(RasterDataset { raster: Arc::new(raster) })
    }

    pub fn from_arc(raster: Arc<Raster>) -> DatasetRef {
        Arc::new(RasterDataset { raster })
    }
}

impl Dataset for RasterDataset {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.raster.columns())
    }
    fn to_stream(&self) -> Arc<dyn Stream> {
        Arc::new(InMemoryStream::new(self.raster.columns(), self.raster.rows()))
    }
    fn to_raster(&self, _job: &Job) -> Fallible<Raster> {
        Ok(Raster::new(self.raster.columns(), self.raster.rows()))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dataset backed by an arbitrary, already-constructed [`Stream`] (e.g.
/// an external collaborator's row source). Materializes to a raster via
/// the default stream→raster bridge.
pub struct StreamDataset {
    columns: OrderedColumnSet,
    stream: Arc<dyn Stream>,
}

impl StreamDataset {
    pub fn new(columns: OrderedColumnSet, stream: Arc<dyn Stream>) -> DatasetRef {
        Arc::new(StreamDataset { columns, stream })
    }
}

impl Dataset for StreamDataset {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.columns.clone())
    }
    fn to_stream(&self) -> Arc<dyn Stream> {
        self.stream.clone_stream()
    }
    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        raster_via_stream(self, job)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------
// Fluent operations
// ---------------------------------------------------------------------

/// Downcasts `ds` to a `CoalescedDataset` if it already is one, so
/// deferred-op methods can fuse instead of stacking wrappers.
fn as_coalesced(ds: &DatasetRef) -> Option<&coalesced::CoalescedDataset> {
    ds.as_any().downcast_ref::<coalesced::CoalescedDataset>()
}

/// Forces a `CoalescedDataset`'s pending op, if any, returning a plain
/// dataset. Required before join/aggregate/pivot/flatten/random/union,
/// none of which participate in the coalesced optimizer (spec §4.7).
pub fn materialize(ds: &DatasetRef) -> DatasetRef {
    match as_coalesced(ds) {
        Some(c) => c.data(),
        None => ds.clone(),
    }
}

pub trait DatasetOps {
    fn select_columns(&self, columns: OrderedColumnSet) -> DatasetRef;
    fn filter(&self, expr: Expression) -> DatasetRef;
    fn calculate(&self, column: Column, expr: Expression) -> DatasetRef;
    fn sort(&self, orders: Vec<SortOrder>) -> DatasetRef;
    fn limit(&self, n: usize) -> DatasetRef;
    fn offset(&self, n: usize) -> DatasetRef;
    fn distinct(&self) -> DatasetRef;
    fn transpose(&self) -> DatasetRef;
    fn random(&self, n: usize) -> DatasetRef;
    fn aggregate(&self, group_by: Vec<GroupBy>, aggregations: Vec<Aggregation>) -> Fallible<DatasetRef>;
    fn join(&self, spec: JoinSpec) -> DatasetRef;
    fn union(&self, other: DatasetRef) -> DatasetRef;
    fn pivot(&self, row_key: Expression, column_key_source: Column, value: Expression, reduce: Function) -> Fallible<DatasetRef>;
    fn flatten(&self, spec: FlattenSpec) -> DatasetRef;
}

impl DatasetOps for DatasetRef {
    fn select_columns(&self, columns: OrderedColumnSet) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::SelectingColumns(columns))
    }
    fn filter(&self, expr: Expression) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Filtering(expr))
    }
    fn calculate(&self, column: Column, expr: Expression) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Calculating(vec![(column, expr)]))
    }
    fn sort(&self, orders: Vec<SortOrder>) -> DatasetRef {
        // sort([]) == id (spec §4.7).
        if orders.is_empty() {
            return self.clone();
        }
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Sorting(orders))
    }
    fn limit(&self, n: usize) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Limiting(n))
    }
    fn offset(&self, n: usize) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Offsetting(n))
    }
    fn distinct(&self) -> DatasetRef {
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Distincting)
    }
    fn transpose(&self) -> DatasetRef {
        // transpose().transpose() == id: undo by dropping the pending
        // Transposing op and returning the pre-transpose plan unchanged.
        if let Some(prior) = as_coalesced(self) {
            if matches!(prior.deferred_op(), coalesced::DeferredOp::Transposing) {
                return prior.base().clone();
            }
        }
        coalesced::wrap(self.clone(), coalesced::DeferredOp::Transposing)
    }

    fn random(&self, n: usize) -> DatasetRef {
        let base = materialize(self);
        crate::transform::random::RandomDataset::new(base, n)
    }

    fn aggregate(&self, group_by: Vec<GroupBy>, aggregations: Vec<Aggregation>) -> Fallible<DatasetRef> {
        // Invariant (spec §4.9): group-by targets and aggregation targets must be disjoint.
        let group_targets: Vec<&Column> = group_by.iter().map(|g| &g.target).collect();
        let agg_targets: Vec<&Column> = aggregations.iter().map(|a| &a.target).collect();
        for t in &agg_targets {
            if group_targets.contains(t) {
                return Err(EngineError::Schema(format!(
                    "aggregate: column '{t}' used as both a group-by target and an aggregation target"
                )));
            }
        }
        for (i, t) in agg_targets.iter().enumerate() {
            if agg_targets[..i].contains(t) {
                return Err(EngineError::Schema(format!("duplicate aggregation target column: {t}")));
            }
        }
        for agg in &aggregations {
            if !agg.aggregator.reduce.is_aggregate_eligible() {
                return Err(EngineError::Schema(format!(
                    "aggregate: function '{}' has no reducer; not aggregate-eligible",
                    agg.aggregator.reduce.name()
                )));
            }
        }
        let base = materialize(self);
        Ok(crate::transform::aggregate::AggregateDataset::new(base, group_by, aggregations))
    }

    fn join(&self, spec: JoinSpec) -> DatasetRef {
        let base = materialize(self);
        crate::transform::join::JoinDataset::new(base, spec)
    }

    fn union(&self, other: DatasetRef) -> DatasetRef {
        let base = materialize(self);
        Arc::new(UnionDataset { left: base, right: materialize(&other) })
    }

    fn pivot(&self, row_key: Expression, column_key_source: Column, value: Expression, reduce: Function) -> Fallible<DatasetRef> {
        let base = materialize(self);
        crate::transform::pivot::pivot(base, row_key, column_key_source, value, reduce)
    }

    fn flatten(&self, spec: FlattenSpec) -> DatasetRef {
        let base = materialize(self);
        crate::transform::flatten::FlattenDataset::new(base, spec)
    }
}

/// Concatenates two datasets' rows under the left side's schema, padding
/// right-only columns with `Empty` the way a left join pads unmatched
/// rows. No optimization participation (spec §4.7).
struct UnionDataset {
    left: DatasetRef,
    right: DatasetRef,
}

impl Dataset for UnionDataset {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        self.left.columns(job)
    }
    fn to_stream(&self) -> Arc<dyn Stream> {
        let job = Job::new();
        let raster = self.to_raster(&job).unwrap_or_else(|_| Raster::new(OrderedColumnSet::new(), vec![]));
        Arc::new(InMemoryStream::new(raster.columns(), raster.rows()))
    }
    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        let left_columns = self.left.columns(job)?;
        let left_rows = {
            let sink = Arc::new(CollectingSink::new());
            puller::drive(self.left.to_stream(), job.clone(), sink.clone(), default_wavefronts());
            Arc::try_unwrap(sink).map_err(|_| EngineError::Stream("dangling puller sink".into()))?.into_result()?
        };
        let right_rows = crate::stream::drain_sequential(&*self.right.to_stream(), job)?;
        let mut rows = left_rows;
        for r in right_rows {
            let mut values = Vec::with_capacity(left_columns.len());
            for c in left_columns.iter() {
                values.push(r.get(c));
            }
            rows.push(crate::row::Row::new(values, left_columns.clone()));
        }
        Ok(Raster::new(left_columns, rows))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
