//! Mutable datasets (C11).
//!
//! A [`MutableDataset`] is a [`Dataset`] that additionally accepts
//! [`Mutation`]s. Grounded on the teacher's `storage_engine` write path
//! (`insert`/`delete`/`alter` against a mutex-guarded table) reworked
//! against [`crate::raster::Raster`] rather than a WAL-backed store.
//! [`RasterTable`] is the one concrete implementation; it refuses every
//! mutation when its backing raster is read-only.

use crate::column::Column;
use crate::dataset::{Dataset, DatasetRef};
use crate::error::{EngineError, Fallible};
use crate::job::Job;
use crate::raster::Raster;
use crate::row::Row;
use crate::stream::{puller, Stream};
use crate::value::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One requested change to a mutable dataset. Column/row addressing is by
/// name and by key tuple, never by storage-internal identifiers.
#[derive(Clone)]
pub enum Mutation {
    /// Drops every row, keeping the schema.
    Truncate,
    /// Renames columns per `old → new`.
    Rename(HashMap<Column, Column>),
    /// Replaces the schema wholesale.
    Alter(crate::column::OrderedColumnSet),
    /// Drains `source`, mapping `target_column → source_column` (missing
    /// source columns become `Empty`), and appends the result.
    Import(DatasetRef, HashMap<Column, Column>),
    Insert(Row),
    /// Compare-and-swap a single cell.
    Edit { row: usize, column: Column, old: Value, new: Value },
    /// Compare-and-swap every cell in `column` across rows matching `key`.
    Update { key_columns: Vec<Column>, key: Vec<Value>, column: Column, old: Value, new: Value },
    Remove(HashSet<usize>),
    /// Deletes every row whose tuple over `key_columns` matches one of `keys`.
    Delete { key_columns: Vec<Column>, keys: Vec<Vec<Value>> },
    /// Discards the dataset entirely; only meaningful for collaborators
    /// that track dataset lifetime (e.g. a [`Warehouse`]).
    Drop,
}

/// A dataset that can additionally be mutated in place.
pub trait MutableDataset: Dataset {
    fn can_perform_mutation(&self, mutation: &Mutation) -> bool;
    fn perform_mutation(&self, mutation: Mutation, job: &Job) -> Fallible<()>;
}

/// A [`MutableDataset`] backed directly by a [`Raster`].
pub struct RasterTable {
    raster: Arc<Raster>,
    dropped: parking_lot::Mutex<bool>,
}

impl RasterTable {
    pub fn new(raster: Raster) -> Arc<Self> {
        Arc::new(RasterTable { raster: Arc::new(raster), dropped: parking_lot::Mutex::new(false) })
    }

    fn is_dropped(&self) -> bool {
        *self.dropped.lock()
    }
}

impl Dataset for RasterTable {
    fn columns(&self, _job: &Job) -> Fallible<crate::column::OrderedColumnSet> {
        Ok(self.raster.columns())
    }
    fn to_stream(&self) -> Arc<dyn Stream> {
        Arc::new(crate::stream::InMemoryStream::new(self.raster.columns(), self.raster.rows()))
    }
    fn to_raster(&self, _job: &Job) -> Fallible<Raster> {
        Ok(Raster::new(self.raster.columns(), self.raster.rows()))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl MutableDataset for RasterTable {
    fn can_perform_mutation(&self, _mutation: &Mutation) -> bool {
        !self.raster.is_read_only() && !self.is_dropped()
    }

    fn perform_mutation(&self, mutation: Mutation, job: &Job) -> Fallible<()> {
        if self.is_dropped() {
            return Err(EngineError::mutation("dataset has been dropped"));
        }
        if self.raster.is_read_only() && !matches!(mutation, Mutation::Drop) {
            return Err(EngineError::mutation("cannot mutate a read-only dataset"));
        }
        match mutation {
            Mutation::Truncate => self.raster.truncate(),
            Mutation::Rename(map) => self.raster.rename_columns(&map),
            Mutation::Alter(schema) => self.raster.alter_schema(schema),
            Mutation::Import(source, column_map) => import_rows(&self.raster, source, &column_map, job),
            Mutation::Insert(row) => self.raster.add_row(row),
            Mutation::Edit { row, column, old, new } => {
                let applied = self.raster.set_value(new, &column, row, Some(&old))?;
                if applied {
                    Ok(())
                } else {
                    Err(EngineError::mutation(format!("edit: cell at row {row}, column '{column}' no longer equals the expected value")))
                }
            }
            Mutation::Update { key_columns, key, column, old, new } => {
                self.raster.update(&key_columns, &key, &column, &old, &new)?;
                Ok(())
            }
            Mutation::Remove(indexes) => self.raster.remove_rows(&indexes),
            Mutation::Delete { key_columns, keys } => self.raster.remove_rows_by_key(&key_columns, &keys),
            Mutation::Drop => {
                *self.dropped.lock() = true;
                self.raster.truncate()
            }
        }
    }
}

/// Drains `source`'s stream with concurrent wavefronts and appends the
/// resulting rows to `target`, mapping `target_column → source_column` by
/// name; a target column with no entry in `column_map`, or whose mapped
/// source column is absent from a row, reads as `Empty`.
fn import_rows(target: &Raster, source: DatasetRef, column_map: &HashMap<Column, Column>, job: &Job) -> Fallible<()> {
    let target_columns = target.columns();
    let rows = crate::stream::puller::drain_concurrent(source.to_stream(), job, crate::dataset::default_wavefronts())?;
    let mapped: Vec<Row> = rows
        .iter()
        .map(|source_row| {
            let values: Vec<Value> = target_columns
                .iter()
                .map(|target_column| {
                    let source_column = column_map.get(target_column).unwrap_or(target_column);
                    source_row.get(source_column)
                })
                .collect();
            Row::new(values, target_columns.clone())
        })
        .collect();
    target.add_rows(mapped)
}

/// Creates new mutable datasets, inferring schema from a source dataset's
/// `columns()`. Grounded on the teacher's catalog-backed table creation
/// (`storage_engine::create_table` inferring a schema from the first
/// insert), reworked since this engine is dynamically typed per-cell and
/// so only needs column names, never types.
pub struct Warehouse;

impl Warehouse {
    pub fn new() -> Self {
        Warehouse
    }

    /// Builds an empty, writable `RasterTable` with `source`'s schema.
    pub fn create_from_schema(&self, source: &DatasetRef, job: &Job) -> Fallible<Arc<RasterTable>> {
        let columns = source.columns(job)?;
        Ok(RasterTable::new(Raster::new(columns, Vec::new())))
    }

    /// Builds a writable `RasterTable` pre-populated with `source`'s rows.
    pub fn create_and_import(&self, source: &DatasetRef, job: &Job) -> Fallible<Arc<RasterTable>> {
        let table = self.create_from_schema(source, job)?;
        table.perform_mutation(Mutation::Import(source.clone(), HashMap::new()), job)?;
        Ok(table)
    }
}

impl Default for Warehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::OrderedColumnSet;
    use crate::dataset::RasterDataset;

    fn make(columns: &[&str], rows: Vec<Vec<Value>>) -> Arc<RasterTable> {
        let cols = OrderedColumnSet::from_names(columns.iter().map(|s| s.to_string()));
        let row_values: Vec<Row> = rows.into_iter().map(|v| Row::new(v, cols.clone())).collect();
        RasterTable::new(Raster::new(cols, row_values))
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let table = make(&["A"], vec![vec![Value::Int(1)]]);
        let job = Job::new();
        table.perform_mutation(Mutation::Insert(Row::new(vec![Value::Int(2)], table.raster.columns())), &job).unwrap();
        assert_eq!(table.raster.row_count(), 2);
        let mut indexes = HashSet::new();
        indexes.insert(0usize);
        table.perform_mutation(Mutation::Remove(indexes), &job).unwrap();
        assert_eq!(table.raster.row_count(), 1);
        assert!(matches!(table.raster.value(0, &Column::new("A")), Value::Int(2)));
    }

    #[test]
    fn edit_requires_matching_old_value() {
        let table = make(&["A"], vec![vec![Value::Int(1)]]);
        let job = Job::new();
        let result = table.perform_mutation(Mutation::Edit { row: 0, column: Column::new("A"), old: Value::Int(99), new: Value::Int(2) }, &job);
        assert!(result.is_err());
        assert!(matches!(table.raster.value(0, &Column::new("A")), Value::Int(1)));
    }

    #[test]
    fn rename_keeps_values_in_place() {
        let table = make(&["A", "B"], vec![vec![Value::Int(1), Value::Int(2)]]);
        let job = Job::new();
        let mut map = HashMap::new();
        map.insert(Column::new("A"), Column::new("X"));
        table.perform_mutation(Mutation::Rename(map), &job).unwrap();
        assert!(matches!(table.raster.value(0, &Column::new("X")), Value::Int(1)));
        assert!(matches!(table.raster.value(0, &Column::new("B")), Value::Int(2)));
    }

    #[test]
    fn read_only_table_refuses_every_mutation() {
        let cols = OrderedColumnSet::from_names(["A"]);
        let table = RasterTable::new(Raster::read_only(cols.clone(), vec![Row::new(vec![Value::Int(1)], cols.clone())]));
        let job = Job::new();
        assert!(!table.can_perform_mutation(&Mutation::Truncate));
        assert!(table.perform_mutation(Mutation::Truncate, &job).is_err());
    }

    #[test]
    fn import_maps_source_columns_by_name() {
        let target = make(&["A", "B"], vec![]);
        let source_cols = OrderedColumnSet::from_names(["X", "B"]);
        let source_rows = vec![Row::new(vec![Value::Int(10), Value::Int(20)], source_cols.clone())];
        let source: DatasetRef = RasterDataset::new(Raster::new(source_cols, source_rows));
        let job = Job::new();
        let mut map = HashMap::new();
        map.insert(Column::new("A"), Column::new("X"));
        target.perform_mutation(Mutation::Import(source, map), &job).unwrap();
        assert_eq!(target.raster.row_count(), 1);
        assert!(matches!(target.raster.value(0, &Column::new("A")), Value::Int(10)));
        assert!(matches!(target.raster.value(0, &Column::new("B")), Value::Int(20)));
    }

    #[test]
    fn drop_truncates_and_then_refuses_further_mutation() {
        let table = make(&["A"], vec![vec![Value::Int(1)]]);
        let job = Job::new();
        table.perform_mutation(Mutation::Drop, &job).unwrap();
        assert_eq!(table.raster.row_count(), 0);
        assert!(table.perform_mutation(Mutation::Insert(Row::new(vec![Value::Int(2)], table.raster.columns())), &job).is_err());
    }

    #[test]
    fn warehouse_creates_table_from_source_schema() {
        let source_cols = OrderedColumnSet::from_names(["A", "B"]);
        let source: DatasetRef = RasterDataset::new(Raster::new(source_cols, vec![]));
        let job = Job::new();
        let table = Warehouse::new().create_from_schema(&source, &job).unwrap();
        assert_eq!(table.raster.columns().len(), 2);
        assert_eq!(table.raster.row_count(), 0);
    }
}
