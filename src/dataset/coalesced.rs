//! # CoalescedDataset — the lazy pipeline optimizer (C7)
//!
//! Wraps a base dataset plus one deferred operation. `wrap()` is the
//! single entry point every fluent `Dataset` method goes through; it
//! implements the equational rewrites of spec §4.7 (limit∘limit,
//! offset∘offset, sort stacking, transpose/distinct idempotence, filter
//! fusion and filter/calculate commutation, calculate∘calculate fusion,
//! selectColumns intersection and calculate-fusion). Operations with no
//! optimization law (join/aggregate/pivot/flatten/random/union) never
//! produce a `CoalescedDataset` — see `dataset::materialize`.

use super::{Dataset, DatasetRef, SortOrder};
use crate::column::{Column, OrderedColumnSet};
use crate::error::Fallible;
use crate::expr::Expression;
use crate::job::Job;
use crate::raster::Raster;
use crate::row::Row;
use crate::stream::{InMemoryStream, Stream};
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

#[derive(Clone)]
pub enum DeferredOp {
    None,
    Limiting(usize),
    Offsetting(usize),
    Transposing,
    Filtering(Expression),
    Sorting(Vec<SortOrder>),
    SelectingColumns(OrderedColumnSet),
    /// Ordered target-column -> expression map, applied left to right.
    Calculating(Vec<(Column, Expression)>),
    CalculatingThenSelectingColumns(Vec<(Column, Expression)>, OrderedColumnSet),
    Distincting,
}

pub struct CoalescedDataset {
    base: DatasetRef,
    op: DeferredOp,
}

/// The single constructor for every fluent op: tries to fuse `op` into
/// `base` (if `base` is itself a `CoalescedDataset`) per spec §4.7, or
/// wraps fresh.
pub fn wrap(base: DatasetRef, op: DeferredOp) -> DatasetRef {
    if let Some(prior) = base.as_any().downcast_ref::<CoalescedDataset>() {
        if let Some(fused) = fuse(&prior.op, &op) {
            return Arc::new(CoalescedDataset { base: prior.base.clone(), op: fused });
        }
        if let Some(commuted) = commute_before_calculate_or_sort(prior, &op) {
            return commuted;
        }
    }
    Arc::new(CoalescedDataset { base, op })
}

/// Spec §4.7: `limit`/`offset` commute with a preceding `calculate` (moved
/// before it, since limiting/offsetting first means fewer rows to
/// calculate over); `filter` commutes past both a preceding `calculate`
/// (substituting calculated columns into the filter first, S8) and a
/// preceding `sort` (filtering first discards rows sort would otherwise
/// have to order). Reorders the pipeline into `base.<pushed-op>.<prior-op>`
/// instead of stacking the new op after the unchanged prior one.
fn commute_before_calculate_or_sort(prior: &CoalescedDataset, op: &DeferredOp) -> Option<DatasetRef> {
    use DeferredOp::*;
    match (&prior.op, op) {
        (Calculating(calcs), Limiting(_)) | (Calculating(calcs), Offsetting(_)) => {
            let pushed = wrap(prior.base.clone(), op.clone());
            Some(wrap(pushed, Calculating(calcs.clone())))
        }
        (Calculating(calcs), Filtering(filter_expr)) => {
            let pushed_filter = push_filter_through_calculate(filter_expr, calcs)?;
            let pushed = wrap(prior.base.clone(), Filtering(pushed_filter));
            Some(wrap(pushed, Calculating(calcs.clone())))
        }
        (Sorting(orders), Filtering(filter_expr)) => {
            let pushed = wrap(prior.base.clone(), Filtering(filter_expr.clone()));
            Some(wrap(pushed, Sorting(orders.clone())))
        }
        _ => None,
    }
}

/// Attempts to fuse a freshly-requested `next` op into the `prior`
/// deferred op, returning the single combined op on success. `None`
/// means "no law applies; stack a new wrapper around the whole prior
/// CoalescedDataset instead" — callers fall back to that in `wrap`.
fn fuse(prior: &DeferredOp, next: &DeferredOp) -> Option<DeferredOp> {
    use DeferredOp::*;
    match (prior, next) {
        (Limiting(a), Limiting(b)) => Some(Limiting((*a).min(*b))),
        (Offsetting(a), Offsetting(b)) => Some(Offsetting(a + b)),
        (Transposing, Transposing) => None, // transpose.transpose == id; handled as a rewrite below, not a fuse.
        (Distincting, Distincting) => Some(Distincting),
        (Filtering(e1), Filtering(e2)) => Some(Filtering(and_of(e1.clone(), e2.clone()))),
        (Sorting(a), Sorting(b)) => {
            // sort(A).sort(B): B becomes primary (applied last = read first).
            let mut combined = b.clone();
            combined.extend(a.clone());
            Some(Sorting(combined))
        }
        (SelectingColumns(a), SelectingColumns(b)) => Some(SelectingColumns(b.intersect_preserving_order_of(a))),
        (Calculating(a), Calculating(b)) => Some(Calculating(merge_calculations(a, b))),
        (Calculating(a), SelectingColumns(cols)) => {
            Some(CalculatingThenSelectingColumns(a.clone(), cols.clone()))
        }
        (Filtering(e), Calculating(_)) => {
            // filter is requested *after* an existing calculate in pipeline-build
            // order; nothing to fuse here (push-through is the opposite
            // direction and is handled in `with_calculate_pushed_through`,
            // invoked explicitly by callers building filter-after-calculate
            // pipelines via `push_filter_through_calculate`).
            let _ = e;
            None
        }
        _ => None,
    }
}

fn and_of(a: Expression, b: Expression) -> Expression {
    Expression::call(crate::expr::functions::Function::And, vec![a, b])
}

/// `calculate(A:x).calculate(B:y)`: if `y`'s sibling-dependencies are
/// disjoint from `A`'s keys (or `A == B`, an overwrite), merge; the
/// overwrite case additionally honors "prior calc of A is Identity ⇒ drop
/// it".
fn merge_calculations(prior: &[(Column, Expression)], next: &[(Column, Expression)]) -> Vec<(Column, Expression)> {
    let prior_keys: Vec<&Column> = prior.iter().map(|(c, _)| c).collect();
    let mut merged = prior.to_vec();
    for (col, expr) in next {
        if let Some(pos) = merged.iter().position(|(c, _)| c == col) {
            let is_identity_overwrite = matches!(merged[pos].1, Expression::Identity)
                || matches!(&merged[pos].1, Expression::Sibling(c) if c == col);
            if is_identity_overwrite || !expr.sibling_dependencies().iter().any(|d| prior_keys.contains(&d)) {
                merged[pos] = (col.clone(), expr.clone());
                continue;
            }
        }
        merged.push((col.clone(), expr.clone()));
    }
    merged
}

impl CoalescedDataset {
    pub fn deferred_op(&self) -> &DeferredOp {
        &self.op
    }

    pub fn base(&self) -> &DatasetRef {
        &self.base
    }

    /// Materializes the deferred op eagerly, returning a plain (no
    /// longer coalesced) dataset. This is what join/aggregate/pivot/
    /// flatten/random/union force before they run (spec §4.7).
    pub fn data(&self) -> DatasetRef {
        let job = Job::new();
        match self.to_raster(&job) {
            Ok(raster) => super::RasterDataset::new(raster),
            Err(_) => self.base.clone(),
        }
    }
}

impl Dataset for CoalescedDataset {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        use DeferredOp::*;
        match &self.op {
            None => self.base.columns(job),
            SelectingColumns(cols) => Ok(cols.clone()),
            CalculatingThenSelectingColumns(_, cols) => Ok(cols.clone()),
            Transposing => {
                // transpose swaps the row/column axes: emits one row per
                // original column plus a leading label column.
                let rows = self.base.to_raster(job)?.row_count();
                let mut cols = OrderedColumnSet::new();
                cols.try_push(Column::new("column"));
                for i in 0..rows {
                    cols.try_push(Column::new(OrderedColumnSet::default_name_for_index(i)));
                }
                Ok(cols)
            }
            Calculating(calcs) => {
                let mut cols = self.base.columns(job)?;
                for (c, _) in calcs {
                    cols.try_push(c.clone());
                }
                Ok(cols)
            }
            _ => self.base.columns(job),
        }
    }

    fn to_stream(&self) -> Arc<dyn Stream> {
        let job = Job::new();
        match self.to_raster(&job) {
            Ok(raster) => Arc::new(InMemoryStream::new(raster.columns(), raster.rows())),
            Err(_) => Arc::new(InMemoryStream::new(OrderedColumnSet::new(), vec![])),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(op = ?std::mem::discriminant(&self.op)))]
    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        use DeferredOp::*;
        let base_raster = self.base.to_raster(job)?;
        let columns = base_raster.columns();
        let mut rows = base_raster.rows();

        match &self.op {
            None => {}
            Limiting(n) => rows.truncate(*n),
            Offsetting(n) => {
                rows = rows.into_iter().skip(*n).collect();
            }
            Filtering(expr) => {
                let prepared = expr.prepare();
                rows.retain(|r| matches!(prepared.apply(r, None, None), Value::Bool(true)));
            }
            Sorting(orders) => {
                sort_rows(&mut rows, orders);
            }
            Distincting => {
                dedup_rows(&mut rows);
            }
            SelectingColumns(selected) => {
                rows = project(&rows, selected);
                return Ok(Raster::new(selected.clone(), rows));
            }
            Calculating(calcs) => {
                let mut result_columns = columns.clone();
                for (c, _) in calcs {
                    result_columns.try_push(c.clone());
                }
                rows = rows.into_iter().map(|r| apply_calculations(r, calcs, &result_columns)).collect();
                return Ok(Raster::new(result_columns, rows));
            }
            CalculatingThenSelectingColumns(calcs, selected) => {
                let mut calc_columns = columns.clone();
                for (c, _) in calcs {
                    calc_columns.try_push(c.clone());
                }
                let calculated: Vec<Row> = rows.into_iter().map(|r| apply_calculations(r, calcs, &calc_columns)).collect();
                let projected = project(&calculated, selected);
                return Ok(Raster::new(selected.clone(), projected));
            }
            Transposing => {
                return Ok(transpose(&columns, &rows));
            }
        }

        Ok(Raster::new(columns, rows))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn apply_calculations(mut row: Row, calcs: &[(Column, Expression)], result_columns: &OrderedColumnSet) -> Row {
    for (col, expr) in calcs {
        let prepared = expr.prepare();
        let current = row.get(col);
        let value = prepared.apply(&row, None, Some(&current));
        row.set(col.clone(), value);
    }
    // Ensure the row's column set matches result_columns exactly (covers
    // the case where `row` came from a differently-ordered base schema).
    let values: Vec<Value> = result_columns.iter().map(|c| row.get(c)).collect();
    Row::new(values, result_columns.clone())
}

fn project(rows: &[Row], selected: &OrderedColumnSet) -> Vec<Row> {
    rows.iter()
        .map(|r| {
            let values: Vec<Value> = selected.iter().map(|c| r.get(c)).collect();
            Row::new(values, selected.clone())
        })
        .collect()
}

fn sort_rows(rows: &mut [Row], orders: &[SortOrder]) {
    // Stable sort: later entries in `orders` are lower-priority tiebreakers.
    rows.sort_by(|a, b| {
        for order in orders {
            let prepared = order.expr.prepare();
            let va = prepared.apply(a, None, None);
            let vb = prepared.apply(b, None, None);
            let ord = compare_for_sort(&va, &vb);
            let ord = if order.ascending { ord } else { ord.reverse() };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_for_sort(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        _ if a.is_numeric() && b.is_numeric() => {
            a.as_f64().unwrap().partial_cmp(&b.as_f64().unwrap()).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Empty, _) => Ordering::Less,
        (_, Value::Empty) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn dedup_rows(rows: &mut Vec<Row>) {
    let mut seen: std::collections::HashSet<Vec<Value>> = std::collections::HashSet::new();
    rows.retain(|r| seen.insert(r.values().to_vec()));
}

fn transpose(columns: &OrderedColumnSet, rows: &[Row]) -> Raster {
    let mut result_columns = OrderedColumnSet::new();
    result_columns.try_push(Column::new("column"));
    for i in 0..rows.len() {
        result_columns.try_push(Column::new(OrderedColumnSet::default_name_for_index(i)));
    }
    let result_rows: Vec<Row> = columns
        .iter()
        .map(|c| {
            let mut values = vec![Value::String(c.name().to_string())];
            for r in rows {
                values.push(r.get(c));
            }
            Row::new(values, result_columns.clone())
        })
        .collect();
    Raster::new(result_columns, result_rows)
}

/// Pushes a filter expression through a preceding calculate when possible
/// (spec §4.7, S8): if the filter's sibling-dependencies are disjoint
/// from the calculated columns it commutes freely; if it depends on a
/// calculated column, substitute that column's expression (with
/// `Identity` replaced by `Sibling`) into the filter, then commute.
/// Returns `None` when no substitution or disjointness applies, meaning
/// the filter must stay deferred after the calculate.
pub fn push_filter_through_calculate(filter: &Expression, calcs: &[(Column, Expression)]) -> Option<Expression> {
    let calc_keys: Vec<&Column> = calcs.iter().map(|(c, _)| c).collect();
    let deps = filter.sibling_dependencies();
    if !deps.iter().any(|d| calc_keys.contains(&d)) {
        return Some(filter.clone());
    }
    let mut rewritten = filter.clone();
    for (col, expr) in calcs {
        let substituted_expr = replace_identity_with_sibling(expr.clone(), col);
        rewritten = substitute_sibling(&rewritten, col, &substituted_expr);
    }
    Some(rewritten)
}

fn replace_identity_with_sibling(expr: Expression, col: &Column) -> Expression {
    match expr {
        Expression::Identity => Expression::Sibling(col.clone()),
        Expression::Call(f, args) => Expression::Call(f, args.into_iter().map(|a| replace_identity_with_sibling(a, col)).collect()),
        Expression::Comparison(a, b, op) => Expression::Comparison(
            Box::new(replace_identity_with_sibling(*a, col)),
            Box::new(replace_identity_with_sibling(*b, col)),
            op,
        ),
        other => other,
    }
}

fn substitute_sibling(expr: &Expression, target: &Column, replacement: &Expression) -> Expression {
    match expr {
        Expression::Sibling(c) if c == target => replacement.clone(),
        Expression::Call(f, args) => {
            Expression::Call(*f, args.iter().map(|a| substitute_sibling(a, target, replacement)).collect())
        }
        Expression::Comparison(a, b, op) => Expression::Comparison(
            Box::new(substitute_sibling(a, target, replacement)),
            Box::new(substitute_sibling(b, target, replacement)),
            *op,
        ),
        other => other.clone(),
    }
}
