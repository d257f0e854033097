//! Property-based tests (spec §8) over `Value` arithmetic/comparison
//! invariants and the `Expression::prepare()` optimizer.

use proptest::prelude::*;
use raveldb::expr::Expression;
use raveldb::value::{Binary, Value};

proptest! {
    /// `Invalid` is absorbing: any binary operator applied with an
    /// `Invalid` operand on either side produces `Invalid`.
    #[test]
    fn invalid_absorbs_every_binary_operator(a in -1_000_000i64..1_000_000, op in binary_strategy()) {
        let left = Value::Int(a);
        let invalid = Value::Invalid;
        prop_assert!(matches!(left.apply_binary(op, &invalid), Value::Invalid));
        prop_assert!(matches!(invalid.apply_binary(op, &left), Value::Invalid));
    }

    /// Equality is reflexive for every non-`Invalid` int (per spec,
    /// `Invalid != Invalid` even to itself, so it is deliberately excluded).
    #[test]
    fn int_equality_is_reflexive(a in any::<i64>()) {
        let v = Value::Int(a);
        prop_assert!(matches!(v.apply_binary(Binary::Equal, &v), Value::Bool(true)));
    }

    /// Addition is commutative over ints whose sum does not overflow.
    #[test]
    fn int_addition_is_commutative(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
        let x = Value::Int(a);
        let y = Value::Int(b);
        let forward = x.apply_binary(Binary::Add, &y);
        let backward = y.apply_binary(Binary::Add, &x);
        prop_assert_eq!(format!("{forward:?}"), format!("{backward:?}"));
    }

    /// `prepare()` is idempotent: optimizing an already-optimized
    /// expression tree is a no-op (spec §4.4's rewrite laws all converge
    /// to a fixed point after one pass).
    #[test]
    fn prepare_is_idempotent(values in prop::collection::vec(-100i64..100, 1..6)) {
        let mut expr = Expression::literal(values[0]);
        for v in &values[1..] {
            expr = Expression::comparison(expr, Expression::literal(*v), Binary::Add);
        }
        let once = expr.prepare();
        let twice = once.prepare();
        prop_assert_eq!(once, twice);
    }
}

fn binary_strategy() -> impl Strategy<Value = Binary> {
    prop_oneof![
        Just(Binary::Add),
        Just(Binary::Subtract),
        Just(Binary::Multiply),
        Just(Binary::Equal),
        Just(Binary::NotEqual),
        Just(Binary::Less),
        Just(Binary::Greater),
    ]
}
