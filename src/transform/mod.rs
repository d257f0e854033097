//! # Transformers (C9)
//!
//! Each transformer wraps a source [`crate::stream::Stream`] and
//! implements `Stream` itself, so pipelines compose without a distinct
//! "transformer" trait — a filter over a filter is just a `Stream` over a
//! `Stream`. Grounded on the teacher's pipeline-stage composition in
//! `execution/mod.rs` (operators wrapping operators over a shared `Job`),
//! reworked from Differential Dataflow operators into the row-batch
//! transform contracts of spec §4.9.
//!
//! Stateless transformers (`filter`, `columns`) need no synchronization
//! beyond what the source already provides. Stateful ones (`limit`,
//! `offset`, `random`, `aggregate`) hold their position/accumulator
//! behind a `parking_lot::Mutex`, matching the raster's locking
//! discipline (`raster.rs`).

pub mod aggregate;
pub mod calculate;
pub mod columns;
pub mod filter;
pub mod flatten;
pub mod join;
pub mod limit;
pub mod offset;
pub mod pivot;
pub mod random;
