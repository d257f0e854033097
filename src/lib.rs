//! # raveldb
//!
//! A portable, in-process data-transformation engine: a tabular dataset
//! modeled as a sequence of named-column rows, a declarative algebra of
//! relational operations over it, and a formula sublanguage of scalar
//! values, functions, and binary operators evaluated per row.
//!
//! ## Layout
//!
//! ```text
//! Value (value)        — tagged scalar: int/double/bool/string/date/blob/empty/invalid
//! Column/Row (column, row) — case-insensitive column identity, named tuples
//! Expression (expr)     — per-row formula AST + `prepare()` algebraic optimizer
//! Function (expr::functions) — ~100 named functions, arity/determinism/idempotence metadata
//! Reducer (reducers)    — incremental aggregators backing aggregate-eligible functions
//! Raster (raster)       — mutable in-memory table: hash/cartesian join, compare-and-swap writes
//! Dataset (dataset)     — logical, immutable relational algebra; CoalescedDataset defers and fuses
//! Stream (stream)       — pull-based batched row source; StreamPuller preserves order across wavefronts
//! Transformers (transform) — filter/limit/offset/random/columns/calculate/flatten/join/aggregate/pivot
//! Sequencer (sequencer) — pattern-language value-sequence generator backing `random_string`
//! MutableDataset (mutable) — schema/row mutation protocol (truncate/rename/alter/import/edit/...)
//! ```
//!
//! A caller builds an [`Expression`] tree over [`Column`]s of a
//! [`Dataset`], chains relational operations (each returns a new
//! `Dataset`; the `CoalescedDataset` wrapper defers and fuses them per
//! §4.7's equational laws), and then either asks for a [`stream::Stream`]
//! (batched, pull-based delivery) or a [`Raster`] (full materialization).
//! Streams and rasters bridge in both directions; any dataset with no
//! native materialization path falls back to draining its stream exactly
//! once (see [`dataset::raster_via_stream`]).
//!
//! ```
//! use raveldb::column::{Column, OrderedColumnSet};
//! use raveldb::dataset::{DatasetOps, RasterDataset};
//! use raveldb::expr::Expression;
//! use raveldb::job::Job;
//! use raveldb::raster::Raster;
//! use raveldb::row::Row;
//! use raveldb::value::{Binary, Value};
//!
//! let columns = OrderedColumnSet::from_names(["a", "b"]);
//! let rows = vec![
//!     Row::new(vec![Value::Int(1), Value::String("x".into())], columns.clone()),
//!     Row::new(vec![Value::Int(2), Value::String("y".into())], columns.clone()),
//! ];
//! let ds = RasterDataset::new(Raster::new(columns, rows));
//!
//! let plan = ds
//!     .calculate(Column::new("c"), Expression::comparison(Expression::sibling("a"), Expression::literal(2i64), Binary::Multiply))
//!     .filter(Expression::comparison(Expression::sibling("c"), Expression::literal(2i64), Binary::Greater));
//!
//! let result = plan.to_raster(&Job::new()).unwrap();
//! assert_eq!(result.row_count(), 1);
//! ```

pub mod column;
pub mod config;
pub mod csv;
pub mod dataset;
pub mod datetime;
pub mod error;
pub mod expr;
pub mod job;
pub mod mutable;
pub mod pack;
pub mod raster;
pub mod reducers;
pub mod row;
pub mod sequencer;
pub mod stream;
pub mod transform;
pub mod value;

pub use column::{Column, OrderedColumnSet};
pub use dataset::{Dataset, DatasetOps, DatasetRef};
pub use error::{EngineError, Fallible};
pub use expr::Expression;
pub use job::Job;
pub use raster::Raster;
pub use row::Row;
pub use value::Value;
