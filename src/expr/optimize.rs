//! # Expression Optimizer
//!
//! `prepare()` applies a fixed, single bottom-up pass of algebraic
//! rewrites to an [`Expression`] tree. Unlike the dataset-level optimizer
//! (`dataset::coalesced`), which iterates rewrite rules to a fixpoint,
//! these rewrites are confluent by construction — each one strictly
//! shrinks the tree or replaces a call with an equivalent simpler form,
//! so a single recursive pass suffices.
//!
//! ```text
//! NOT(a=b)        -> a<>b
//! NOT(IN(..))     -> NOTIN(..)
//! NOT(NOT(x))     -> x
//! OR(c=v1, c=v2)  -> IN(c, v1, v2)
//! f(f(x))         -> f(x)             (f idempotent)
//! ```

use super::functions::Function;
use super::Expression;
use crate::value::{Binary, Value};

impl Expression {
    /// Returns a semantically equivalent, simplified expression.
    pub fn prepare(&self) -> Expression {
        let rewritten = self.prepare_children();
        let rewritten = rewrite_identity_on_single_argument_aggregator(rewritten);
        let rewritten = rewrite_not(rewritten);
        let rewritten = flatten_and_or(rewritten);
        let rewritten = absorb_constants(rewritten);
        let rewritten = or_of_equalities_to_in(rewritten);
        let rewritten = collapse_idempotent(rewritten);
        fold_constant(rewritten)
    }

    fn prepare_children(&self) -> Expression {
        match self {
            Expression::Call(f, args) => Expression::Call(*f, args.iter().map(Expression::prepare).collect()),
            Expression::Comparison(a, b, op) => {
                Expression::Comparison(Box::new(a.prepare()), Box::new(b.prepare()), *op)
            }
            other => other.clone(),
        }
    }
}

const SINGLE_ARG_IDENTITY_FUNCTIONS: &[Function] = &[
    Function::Sum,
    Function::Min,
    Function::Max,
    Function::Average,
    Function::Concat,
    Function::Pack,
    Function::Median,
    Function::And,
    Function::Or,
    Function::RandomItem,
];

fn rewrite_identity_on_single_argument_aggregator(e: Expression) -> Expression {
    if let Expression::Call(f, args) = &e {
        if args.len() == 1 && SINGLE_ARG_IDENTITY_FUNCTIONS.contains(f) {
            return args[0].clone();
        }
    }
    e
}

fn rewrite_not(e: Expression) -> Expression {
    let Expression::Call(Function::Not, args) = &e else {
        return e;
    };
    let inner = &args[0];
    match inner {
        // NOT(NOT(x)) -> x
        Expression::Call(Function::Not, inner_args) => inner_args[0].clone(),
        // NOT(a = b) -> a <> b
        Expression::Comparison(a, b, Binary::Equal) => {
            Expression::Comparison(a.clone(), b.clone(), Binary::NotEqual)
        }
        // NOT(IN(..)) -> NOTIN(..)
        Expression::Call(Function::In, in_args) => Expression::Call(Function::NotIn, in_args.clone()),
        // NOT(OR(c=v1, c=v2, ..)) -> NOTIN(c, v1, v2, ..), same-column check as `or_of_equalities_to_in`.
        Expression::Call(Function::Or, or_args) => {
            match same_column_equality_operands(or_args) {
                Some((column, values)) => {
                    let mut call_args = vec![column];
                    call_args.extend(values);
                    Expression::Call(Function::NotIn, call_args)
                }
                None => e,
            }
        }
        _ => e,
    }
}

fn flatten_and_or(e: Expression) -> Expression {
    match &e {
        Expression::Call(f @ (Function::And | Function::Or), args) => {
            let mut flattened = Vec::with_capacity(args.len());
            for a in args {
                match a {
                    Expression::Call(inner_f, inner_args) if inner_f == f => {
                        flattened.extend(inner_args.iter().cloned());
                    }
                    other => flattened.push(other.clone()),
                }
            }
            Expression::Call(*f, flattened)
        }
        _ => e,
    }
}

fn absorb_constants(e: Expression) -> Expression {
    match &e {
        Expression::Call(Function::And, args) => {
            if args.iter().any(|a| matches!(a, Expression::Literal(Value::Bool(false)))) {
                return Expression::Literal(Value::Bool(false));
            }
            e
        }
        Expression::Call(Function::Or, args) => {
            if args.iter().any(|a| matches!(a, Expression::Literal(Value::Bool(true)))) {
                return Expression::Literal(Value::Bool(true));
            }
            e
        }
        _ => e,
    }
}

/// If every element of `args` is `Comparison(column_ref, value, Equal)` over
/// the *same* column reference (all `Sibling` or all `Foreign`, identical
/// name), returns that column reference plus the list of compared-against
/// expressions. Order of `args` is preserved in the returned value list.
fn same_column_equality_operands(args: &[Expression]) -> Option<(Expression, Vec<Expression>)> {
    if args.len() < 2 {
        return None;
    }
    let mut column_ref: Option<Expression> = None;
    let mut values = Vec::with_capacity(args.len());
    for a in args {
        let Expression::Comparison(left, right, Binary::Equal) = a else {
            return None;
        };
        let (candidate_ref, candidate_value) = match (&**left, &**right) {
            (Expression::Sibling(_), _) | (Expression::Foreign(_), _) => ((**left).clone(), (**right).clone()),
            (_, Expression::Sibling(_)) | (_, Expression::Foreign(_)) => ((**right).clone(), (**left).clone()),
            _ => return None,
        };
        match &column_ref {
            None => column_ref = Some(candidate_ref),
            Some(existing) => {
                if !same_column(existing, &candidate_ref) {
                    return None;
                }
            }
        }
        values.push(candidate_value);
    }
    column_ref.map(|c| (c, values))
}

fn same_column(a: &Expression, b: &Expression) -> bool {
    match (a, b) {
        (Expression::Sibling(x), Expression::Sibling(y)) => x == y,
        (Expression::Foreign(x), Expression::Foreign(y)) => x == y,
        _ => false,
    }
}

fn or_of_equalities_to_in(e: Expression) -> Expression {
    match &e {
        Expression::Call(Function::Or, args) => match same_column_equality_operands(args) {
            Some((column, values)) => {
                let mut call_args = vec![column];
                call_args.extend(values);
                Expression::Call(Function::In, call_args)
            }
            None => e,
        },
        _ => e,
    }
}

fn collapse_idempotent(e: Expression) -> Expression {
    if let Expression::Call(f, args) = &e {
        if args.len() == 1 && f.is_idempotent() {
            if let Expression::Call(inner_f, inner_args) = &args[0] {
                if inner_f == f {
                    return Expression::Call(*f, inner_args.clone());
                }
            }
        }
    }
    e
}

/// Evaluates deterministic calls over all-literal arguments once, ahead of
/// time: `Call(f, [Literal, Literal, ...])` with `f.is_deterministic()`
/// collapses to the `Literal` of its result.
fn fold_constant(e: Expression) -> Expression {
    if let Expression::Call(f, args) = &e {
        if f.is_deterministic() && args.iter().all(|a| matches!(a, Expression::Literal(_))) {
            let values: Vec<Value> = args
                .iter()
                .map(|a| match a {
                    Expression::Literal(v) => v.clone(),
                    _ => unreachable!(),
                })
                .collect();
            return Expression::Literal(f.apply(&values));
        }
    }
    e
}
