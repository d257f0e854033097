//! # Expression Tree
//!
//! Per-row formulas evaluated by `calculate`/`filter`/aggregator `map`
//! clauses. An expression is built from column references, literals, and
//! function calls; it carries no concrete syntax of its own (parsing text
//! into a tree is out of scope for this crate).
//!
//! ```text
//! Expression -> [optimize::prepare] -> Optimized Expression -> apply(row)
//! ```

pub mod functions;
pub mod optimize;

use crate::column::Column;
use crate::value::{Binary, Value};
use functions::Function;
use std::collections::HashSet;

/// A formula tree over a row, an optional "foreign" row (the right side of
/// a join or the previous row in a window), and an optional "input value"
/// (the accumulator `calculate` threads through `Identity`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant.
    Literal(Value),
    /// A column on the row being evaluated.
    Sibling(Column),
    /// A column on the foreign row supplied to a join predicate.
    Foreign(Column),
    /// The input value passed into `apply` — used by calculate expressions
    /// that refer to the existing value of the column they replace.
    Identity,
    /// A named function applied to argument expressions.
    Call(Function, Vec<Expression>),
    /// A comparison between two expressions, evaluated via `Value::apply_binary`.
    Comparison(Box<Expression>, Box<Expression>, Binary),
}

impl Expression {
    pub fn literal(v: impl Into<Value>) -> Self {
        Expression::Literal(v.into())
    }

    pub fn sibling(column: impl Into<Column>) -> Self {
        Expression::Sibling(column.into())
    }

    pub fn foreign(column: impl Into<Column>) -> Self {
        Expression::Foreign(column.into())
    }

    pub fn call(function: Function, args: Vec<Expression>) -> Self {
        Expression::Call(function, args)
    }

    pub fn comparison(left: Expression, right: Expression, op: Binary) -> Self {
        Expression::Comparison(Box::new(left), Box::new(right), op)
    }

    /// True if evaluating this expression can never depend on row data —
    /// literals, and calls over only-constant arguments using a
    /// deterministic function.
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Sibling(_) | Expression::Foreign(_) | Expression::Identity => false,
            Expression::Call(f, args) => f.is_deterministic() && args.iter().all(Expression::is_constant),
            Expression::Comparison(a, b, _) => a.is_constant() && b.is_constant(),
        }
    }

    pub fn depends_on_siblings(&self) -> bool {
        match self {
            Expression::Sibling(_) => true,
            Expression::Literal(_) | Expression::Foreign(_) | Expression::Identity => false,
            Expression::Call(_, args) => args.iter().any(Expression::depends_on_siblings),
            Expression::Comparison(a, b, _) => a.depends_on_siblings() || b.depends_on_siblings(),
        }
    }

    pub fn depends_on_foreigns(&self) -> bool {
        match self {
            Expression::Foreign(_) => true,
            Expression::Literal(_) | Expression::Sibling(_) | Expression::Identity => false,
            Expression::Call(_, args) => args.iter().any(Expression::depends_on_foreigns),
            Expression::Comparison(a, b, _) => a.depends_on_foreigns() || b.depends_on_foreigns(),
        }
    }

    /// Every distinct sibling column this expression reads, in first-seen
    /// order. Used by join predicate analysis to decide which columns must
    /// survive a projection pushed below a filter.
    pub fn sibling_dependencies(&self) -> Vec<Column> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_siblings(&mut seen, &mut out);
        out
    }

    fn collect_siblings(&self, seen: &mut HashSet<Column>, out: &mut Vec<Column>) {
        match self {
            Expression::Sibling(c) => {
                if seen.insert(c.clone()) {
                    out.push(c.clone());
                }
            }
            Expression::Call(_, args) => {
                for a in args {
                    a.collect_siblings(seen, out);
                }
            }
            Expression::Comparison(a, b, _) => {
                a.collect_siblings(seen, out);
                b.collect_siblings(seen, out);
            }
            Expression::Literal(_) | Expression::Foreign(_) | Expression::Identity => {}
        }
    }

    /// Evaluates this expression against `row`, an optional `foreign` row
    /// (absent outside join predicates), and an optional `input` value
    /// (absent outside calculate's replace-in-place form). Never panics —
    /// unresolvable references evaluate to `Value::Invalid`.
    pub fn apply(&self, row: &crate::row::Row, foreign: Option<&crate::row::Row>, input: Option<&Value>) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::Sibling(c) => row.get(c),
            Expression::Foreign(c) => foreign.map(|f| f.get(c)).unwrap_or(Value::Invalid),
            Expression::Identity => input.cloned().unwrap_or(Value::Empty),
            Expression::Call(f, args) => {
                let arg_values: Vec<Value> = args.iter().map(|a| a.apply(row, foreign, input)).collect();
                f.apply(&arg_values)
            }
            Expression::Comparison(a, b, op) => {
                let lv = a.apply(row, foreign, input);
                let rv = b.apply(row, foreign, input);
                lv.apply_binary(*op, &rv)
            }
        }
    }

    /// The subexpression relevant to filtering on the foreign side of a
    /// join: rewrites every `Sibling` reference to a `Foreign` reference
    /// of the same column, leaving `Foreign` references untouched. Used
    /// when a join predicate is pushed down to pre-filter the right-hand
    /// dataset before the cartesian/hash join runs.
    pub fn expression_for_foreign_filtering(&self) -> Expression {
        match self {
            Expression::Sibling(c) => Expression::Foreign(c.clone()),
            Expression::Literal(_) | Expression::Foreign(_) | Expression::Identity => self.clone(),
            Expression::Call(f, args) => Expression::Call(
                f.clone(),
                args.iter().map(Expression::expression_for_foreign_filtering).collect(),
            ),
            Expression::Comparison(a, b, op) => Expression::Comparison(
                Box::new(a.expression_for_foreign_filtering()),
                Box::new(b.expression_for_foreign_filtering()),
                *op,
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
