//! # Raster (C6)
//!
//! A mutable, in-memory table: an [`OrderedColumnSet`] schema plus a
//! `Vec<Row>`. All mutating operations share one lock for the duration of
//! the call (a single `parking_lot::RwLock` guarding both schema and
//! rows), grounded on the teacher's `storage_engine` locking discipline —
//! reworked from its WAL-backed fact storage into an in-memory table with
//! compare-and-swap cell writes and a parallel hash/cartesian join.

use crate::column::{Column, OrderedColumnSet};
use crate::error::{EngineError, Fallible};
use crate::expr::Expression;
use crate::job::Job;
use crate::row::Row;
use crate::value::{Binary, Value};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

struct RasterState {
    columns: OrderedColumnSet,
    rows: Vec<Row>,
}

pub struct Raster {
    state: RwLock<RasterState>,
    read_only: bool,
}

impl Raster {
    pub fn new(columns: OrderedColumnSet, rows: Vec<Row>) -> Self {
        Raster { state: RwLock::new(RasterState { columns, rows }), read_only: false }
    }

    pub fn read_only(columns: OrderedColumnSet, rows: Vec<Row>) -> Self {
        Raster { state: RwLock::new(RasterState { columns, rows }), read_only: true }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn columns(&self) -> OrderedColumnSet {
        self.state.read().columns.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.read().rows.len()
    }

    pub fn row(&self, index: usize) -> Option<Row> {
        self.state.read().rows.get(index).cloned()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state.read().rows.clone()
    }

    pub fn value(&self, row: usize, col: &Column) -> Value {
        let state = self.state.read();
        state.rows.get(row).map(|r| r.get(col)).unwrap_or(Value::Empty)
    }

    pub fn value_at_index(&self, row: usize, col_index: usize) -> Value {
        let state = self.state.read();
        state.rows.get(row).map(|r| r.get_index(col_index)).unwrap_or(Value::Empty)
    }

    fn check_mutable(&self) -> Fallible<()> {
        if self.read_only {
            Err(EngineError::mutation("raster is read-only"))
        } else {
            Ok(())
        }
    }

    pub fn add_row(&self, row: Row) -> Fallible<()> {
        self.check_mutable()?;
        self.state.write().rows.push(row);
        Ok(())
    }

    pub fn add_rows(&self, rows: Vec<Row>) -> Fallible<()> {
        self.check_mutable()?;
        self.state.write().rows.extend(rows);
        Ok(())
    }

    pub fn add_columns(&self, columns: Vec<Column>) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        for c in columns {
            state.columns.try_push(c);
        }
        Ok(())
    }

    pub fn remove_rows(&self, indexes: &HashSet<usize>) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let mut kept = Vec::with_capacity(state.rows.len().saturating_sub(indexes.len()));
        for (i, row) in state.rows.drain(..).enumerate() {
            if !indexes.contains(&i) {
                kept.push(row);
            }
        }
        state.rows = kept;
        Ok(())
    }

    /// Removes every row whose values at `key_columns` match one of `keys`.
    pub fn remove_rows_by_key(&self, key_columns: &[Column], keys: &[Vec<Value>]) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let kept: Vec<Row> = state
            .rows
            .drain(..)
            .filter(|row| {
                let tuple: Vec<Value> = key_columns.iter().map(|c| row.get(c)).collect();
                !keys.iter().any(|k| k == &tuple)
            })
            .collect();
        state.rows = kept;
        Ok(())
    }

    pub fn remove_columns(&self, columns: &[Column]) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let keep_indexes: Vec<usize> = state
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !columns.contains(c))
            .map(|(i, _)| i)
            .collect();
        let new_columns = OrderedColumnSet::from_columns(
            keep_indexes.iter().map(|&i| state.columns.get(i).unwrap().clone()).collect(),
        );
        let new_rows: Vec<Row> = state
            .rows
            .iter()
            .map(|row| {
                let values: Vec<Value> = keep_indexes.iter().map(|&i| row.get_index(i)).collect();
                Row::new(values, new_columns.clone())
            })
            .collect();
        state.columns = new_columns;
        state.rows = new_rows;
        Ok(())
    }

    /// Compare-and-swap: if `if_matches` is `Some`, the write only takes
    /// effect when the current cell equals it. Returns whether the write
    /// happened.
    pub fn set_value(&self, value: Value, col: &Column, row: usize, if_matches: Option<&Value>) -> Fallible<bool> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let current = state.rows.get(row).map(|r| r.get(col));
        let Some(current) = current else {
            return Err(EngineError::schema(format!("row index {row} out of range")));
        };
        if let Some(expected) = if_matches {
            if &current != expected {
                return Ok(false);
            }
        }
        if let Some(r) = state.rows.get_mut(row) {
            r.set(col.clone(), value);
        }
        Ok(true)
    }

    /// For every row whose tuple over `key_columns` equals `key`, replaces
    /// `old` with `new` in `col` if the current cell equals `old`. Returns
    /// the number of cells changed.
    pub fn update(&self, key_columns: &[Column], key: &[Value], col: &Column, old: &Value, new: &Value) -> Fallible<usize> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let mut changed = 0usize;
        for row in state.rows.iter_mut() {
            let matches_key = key_columns.iter().zip(key).all(|(c, v)| &row.get(c) == v);
            if matches_key && &row.get(col) == old {
                row.set(col.clone(), new.clone());
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Drops every row, keeping the schema.
    pub fn truncate(&self) -> Fallible<()> {
        self.check_mutable()?;
        self.state.write().rows.clear();
        Ok(())
    }

    /// Renames columns in place per `map` (old → new); columns not named
    /// in `map` keep their name. Order is unaffected, so row values do not
    /// need to move.
    pub fn rename_columns(&self, map: &HashMap<Column, Column>) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let renamed: Vec<Column> = state
            .columns
            .iter()
            .map(|c| map.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect();
        state.columns = OrderedColumnSet::from_columns(renamed);
        Ok(())
    }

    /// Replaces the schema wholesale. Columns present in both the old and
    /// new schema keep their values (matched by name); columns only in the
    /// new schema start `Empty`; columns only in the old schema are
    /// dropped.
    pub fn alter_schema(&self, new_columns: OrderedColumnSet) -> Fallible<()> {
        self.check_mutable()?;
        let mut state = self.state.write();
        let new_rows: Vec<Row> = state
            .rows
            .iter()
            .map(|row| {
                let values: Vec<Value> = new_columns.iter().map(|c| row.get(c)).collect();
                Row::new(values, new_columns.clone())
            })
            .collect();
        state.columns = new_columns;
        state.rows = new_rows;
        Ok(())
    }

    /// Joins `self` (left) against `inner` (right) per the join
    /// expression. Prefers a hash join when the expression decomposes
    /// into a single sibling=foreign equality; falls back to a
    /// parallel cartesian scan otherwise.
    #[tracing::instrument(level = "debug", skip_all, fields(join_type = ?join_type))]
    pub fn hash_or_cartesian_join(&self, inner: &Raster, expr: &Expression, join_type: JoinType, job: &Job) -> Raster {
        let left_state = self.state.read();
        let right_state = inner.state.read();

        let right_only_columns: Vec<Column> =
            right_state.columns.iter().filter(|c| !left_state.columns.contains(c)).cloned().collect();
        if right_only_columns.is_empty() {
            drop(right_state);
            return Raster::new(left_state.columns.clone(), left_state.rows.clone());
        }

        let mut result_columns = left_state.columns.clone();
        for c in &right_only_columns {
            result_columns.try_push(c.clone());
        }

        let prepared = expr.prepare();
        let result_rows = if let Some((left_expr, right_expr)) = decompose_hash_equality(&prepared) {
            self.hash_join(&left_state.rows, &right_state.rows, &left_expr, &right_expr, &right_only_columns, join_type, &result_columns, job)
        } else {
            let pairs = left_state.rows.len() as u64 * right_state.rows.len() as u64;
            if pairs > crate::config::DEFAULT_CARTESIAN_WARN_ROWS {
                tracing::warn!(pairs, "join expression did not decompose into a hash equality; falling back to cartesian scan");
            }
            self.cartesian_join(&left_state.rows, &right_state.rows, &prepared, &right_only_columns, join_type, &result_columns, job)
        };

        Raster::new(result_columns, result_rows)
    }

    fn hash_join(
        &self,
        left_rows: &[Row],
        right_rows: &[Row],
        left_expr: &Expression,
        right_expr: &Expression,
        right_only_columns: &[Column],
        join_type: JoinType,
        result_columns: &OrderedColumnSet,
        job: &Job,
    ) -> Vec<Row> {
        let mut right_hash: HashMap<Value, Vec<usize>> = HashMap::new();
        for (i, r) in right_rows.iter().enumerate() {
            let key = right_expr.apply(r, None, None);
            if !key.is_invalid() && !key.is_empty() {
                right_hash.entry(key).or_default().push(i);
            }
        }

        left_rows
            .par_chunks(job_chunk_size(left_rows.len()))
            .flat_map(|chunk| {
                let mut out = Vec::new();
                if job.is_cancelled() {
                    return out;
                }
                for left_row in chunk {
                    let key = left_expr.apply(left_row, None, None);
                    let matches = right_hash.get(&key);
                    match matches {
                        Some(indexes) if !indexes.is_empty() => {
                            for &ri in indexes {
                                out.push(join_row(left_row, Some(&right_rows[ri]), right_only_columns, result_columns));
                            }
                        }
                        _ if join_type == JoinType::Left => {
                            out.push(join_row(left_row, None, right_only_columns, result_columns));
                        }
                        _ => {}
                    }
                }
                out
            })
            .collect()
    }

    fn cartesian_join(
        &self,
        left_rows: &[Row],
        right_rows: &[Row],
        expr: &Expression,
        right_only_columns: &[Column],
        join_type: JoinType,
        result_columns: &OrderedColumnSet,
        job: &Job,
    ) -> Vec<Row> {
        left_rows
            .par_chunks(job_chunk_size(left_rows.len()))
            .flat_map(|chunk| {
                let mut out = Vec::new();
                if job.is_cancelled() {
                    return out;
                }
                for left_row in chunk {
                    let mut any_match = false;
                    for right_row in right_rows {
                        if matches!(expr.apply(left_row, Some(right_row), None), Value::Bool(true)) {
                            any_match = true;
                            out.push(join_row(left_row, Some(right_row), right_only_columns, result_columns));
                        }
                    }
                    if !any_match && join_type == JoinType::Left {
                        out.push(join_row(left_row, None, right_only_columns, result_columns));
                    }
                }
                out
            })
            .collect::<Vec<_>>()
            .into_iter()
            .take_while(|_| !job.is_cancelled())
            .collect()
    }
}

fn job_chunk_size(len: usize) -> usize {
    let workers = rayon::current_num_threads().max(1);
    (len / workers.max(1)).max(1)
}

fn join_row(left: &Row, right: Option<&Row>, right_only_columns: &[Column], result_columns: &OrderedColumnSet) -> Row {
    let mut values = left.values().to_vec();
    for c in right_only_columns {
        let v = right.map(|r| r.get(c)).unwrap_or(Value::Empty);
        values.push(v);
    }
    Row::new(values, result_columns.clone())
}

/// Recognizes `Sibling(a) = Foreign(b)` (either operand order) as a
/// hash-joinable equality, returning `(left-side expr, right-side expr)`.
fn decompose_hash_equality(expr: &Expression) -> Option<(Expression, Expression)> {
    let Expression::Comparison(a, b, Binary::Equal) = expr else {
        return None;
    };
    let a_siblings_only = a.depends_on_siblings() && !a.depends_on_foreigns();
    let a_foreigns_only = a.depends_on_foreigns() && !a.depends_on_siblings();
    let b_siblings_only = b.depends_on_siblings() && !b.depends_on_foreigns();
    let b_foreigns_only = b.depends_on_foreigns() && !b.depends_on_siblings();

    if a_siblings_only && b_foreigns_only {
        Some(((**a).clone(), (**b).clone().expression_for_foreign_to_sibling()))
    } else if a_foreigns_only && b_siblings_only {
        Some(((**b).clone(), (**a).clone().expression_for_foreign_to_sibling()))
    } else {
        None
    }
}

impl Expression {
    /// Inverse of `expression_for_foreign_filtering`: rewrites `Foreign`
    /// references back to `Sibling` so a foreign-side expression can be
    /// evaluated directly against a right-hand row.
    fn expression_for_foreign_to_sibling(self) -> Expression {
        match self {
            Expression::Foreign(c) => Expression::Sibling(c),
            Expression::Call(f, args) => {
                Expression::Call(f, args.into_iter().map(Expression::expression_for_foreign_to_sibling).collect())
            }
            Expression::Comparison(a, b, op) => Expression::Comparison(
                Box::new(a.expression_for_foreign_to_sibling()),
                Box::new(b.expression_for_foreign_to_sibling()),
                op,
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;

    fn cols(names: &[&str]) -> OrderedColumnSet {
        OrderedColumnSet::from_names(names.iter().map(|s| s.to_string()))
    }

    fn raster(names: &[&str], rows: Vec<Vec<Value>>) -> Raster {
        let columns = cols(names);
        Raster::new(columns.clone(), rows.into_iter().map(|v| Row::new(v, columns.clone())).collect())
    }

    #[test]
    fn read_only_raster_refuses_mutation() {
        let r = Raster::read_only(cols(&["a"]), vec![]);
        assert!(r.add_row(Row::new(vec![Value::Int(1)], cols(&["a"]))).is_err());
    }

    #[test]
    fn set_value_with_if_matches_is_compare_and_swap() {
        let r = raster(&["a"], vec![vec![Value::Int(1)]]);
        let ok = r.set_value(Value::Int(2), &Column::new("a"), 0, Some(&Value::Int(1))).unwrap();
        assert!(ok);
        let refused = r.set_value(Value::Int(3), &Column::new("a"), 0, Some(&Value::Int(99))).unwrap();
        assert!(!refused);
        assert!(matches!(r.value(0, &Column::new("a")), Value::Int(2)));
    }

    #[test]
    fn hash_join_matches_on_equal_keys() {
        let left = raster(&["id", "name"], vec![vec![Value::Int(1), Value::String("a".into())], vec![Value::Int(2), Value::String("b".into())]]);
        let right = raster(&["id", "score"], vec![vec![Value::Int(1), Value::Int(100)]]);
        let expr = Expression::comparison(Expression::sibling("id"), Expression::foreign("id"), Binary::Equal);
        let job = Job::new();
        let joined = left.hash_or_cartesian_join(&right, &expr, JoinType::Inner, &job);
        assert_eq!(joined.row_count(), 1);
        assert!(matches!(joined.value(0, &Column::new("score")), Value::Int(100)));
    }

    #[test]
    fn left_join_pads_unmatched_rows_with_empty() {
        let left = raster(&["id"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        let right = raster(&["id", "score"], vec![vec![Value::Int(1), Value::Int(100)]]);
        let expr = Expression::comparison(Expression::sibling("id"), Expression::foreign("id"), Binary::Equal);
        let job = Job::new();
        let joined = left.hash_or_cartesian_join(&right, &expr, JoinType::Left, &job);
        assert_eq!(joined.row_count(), 2);
    }

    #[test]
    fn join_with_no_new_right_columns_early_exits() {
        let left = raster(&["id"], vec![vec![Value::Int(1)]]);
        let right = raster(&["id"], vec![vec![Value::Int(1)]]);
        let expr = Expression::comparison(Expression::sibling("id"), Expression::foreign("id"), Binary::Equal);
        let job = Job::new();
        let joined = left.hash_or_cartesian_join(&right, &expr, JoinType::Inner, &job);
        assert_eq!(joined.row_count(), 1);
    }

    #[test]
    fn remove_rows_by_key_drops_matching_tuples() {
        let r = raster(&["id"], vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(1)]]);
        r.remove_rows_by_key(&[Column::new("id")], &[vec![Value::Int(1)]]).unwrap();
        assert_eq!(r.row_count(), 1);
    }
}
