//! # Value Type System (C1)
//!
//! Core tagged scalar used by every row, column, and formula result:
//! `Int`, `Double`, `Bool`, `String`, `Date`, `Blob`, `Empty`, `Invalid`.
//!
//! `Empty` denotes "no value supplied"; `Invalid` denotes "computation
//! failed" and propagates through most operators. Grounded on the teacher's
//! `value::Value` tagged union (`Int32`/`Int64`/`Float64`/`String`/`Bool`/
//! `Null`/`Timestamp`), reworked to the eight-variant scalar this engine's
//! formula layer operates over. Arrow/Parquet interop is dropped since this
//! engine is in-process only — see DESIGN.md.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    /// Seconds since the engine's agreed reference epoch (UTC,
    /// 2001-01-01T00:00:00Z — see `datetime::EPOCH_OFFSET_SECONDS`), as a
    /// double so fractional seconds survive Excel-date round trips.
    Date(f64),
    Blob(Vec<u8>),
    /// No value was supplied.
    Empty,
    /// A computation failed. Propagates through most operators; by design,
    /// `Invalid != Invalid` even to itself.
    Invalid,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Blob(_) => "blob",
            Value::Empty => "empty",
            Value::Invalid => "invalid",
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Numeric projection used by arithmetic and `count`/reducers: `Int`
    /// and `Double` only (strings are never silently coerced to numbers
    /// by arithmetic).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Exact integer projection, used for hashing/equality of numeric
    /// values so `Int(1) == Double(1.0)` hash identically.
    fn as_exact_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// `to_string` coercion used by `&` and string functions: every
    /// variant has a canonical display form; `Empty`/`Invalid` render as
    /// the empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            Value::String(s) => s.clone(),
            Value::Date(secs) => crate::datetime::to_utc_iso8601(*secs),
            Value::Blob(b) => format!("<blob:{}b>", b.len()),
            Value::Empty | Value::Invalid => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Applies a [`Binary`] operator, following this engine's coercion and
    /// propagation rules for mixed-type operands.
    pub fn apply_binary(&self, op: Binary, other: &Value) -> Value {
        use Binary::*;

        if matches!(self, Value::Invalid) || matches!(other, Value::Invalid) {
            return Value::Invalid;
        }

        match op {
            Concat => return concat(self, other),
            _ => {}
        }

        match op {
            Add | Subtract | Multiply | Divide | Modulo | Power => {
                arithmetic(op, self, other)
            }
            Equal => Value::Bool(values_equal_coercing(self, other)),
            NotEqual => Value::Bool(!values_equal_coercing(self, other)),
            Less | LessOrEqual | Greater | GreaterOrEqual => {
                compare(op, self, other)
            }
            ContainsCaseInsensitive => substring_match(self, other, false),
            ContainsCaseSensitive => substring_match(self, other, true),
            MatchesRegexCaseInsensitive => regex_match(self, other, false),
            MatchesRegexCaseSensitive => regex_match(self, other, true),
            Concat => unreachable!("handled above"),
        }
    }
}

pub(crate) fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{d}")
    }
}

fn concat(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Empty, x) => x.clone(),
        (x, Value::Empty) => x.clone(),
        _ => Value::String(format!("{}{}", a.to_display_string(), b.to_display_string())),
    }
}

fn arithmetic(op: Binary, a: &Value, b: &Value) -> Value {
    let (a_num, b_num) = match (numeric_operand(a), numeric_operand(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return Value::Invalid,
    };

    // int-preserving promotion: int op int -> int, anything with a double -> double.
    if let (NumOperand::Int(x), NumOperand::Int(y)) = (&a_num, &b_num) {
        return int_arithmetic(op, *x, *y);
    }
    let x = a_num.as_f64();
    let y = b_num.as_f64();
    double_arithmetic(op, x, y)
}

enum NumOperand {
    Int(i64),
    Double(f64),
}

impl NumOperand {
    fn as_f64(&self) -> f64 {
        match self {
            NumOperand::Int(i) => *i as f64,
            NumOperand::Double(d) => *d,
        }
    }
}

/// Arithmetic coerces only `Int`/`Double` operands — strings are
/// deliberately *not* parsed as numbers here.
fn numeric_operand(v: &Value) -> Option<NumOperand> {
    match v {
        Value::Int(i) => Some(NumOperand::Int(*i)),
        Value::Double(d) => Some(NumOperand::Double(*d)),
        _ => None,
    }
}

fn int_arithmetic(op: Binary, x: i64, y: i64) -> Value {
    use Binary::*;
    match op {
        Add => Value::Int(x.wrapping_add(y)),
        Subtract => Value::Int(x.wrapping_sub(y)),
        Multiply => Value::Int(x.wrapping_mul(y)),
        Divide => {
            if y == 0 {
                Value::Invalid
            } else if x % y == 0 {
                Value::Int(x / y)
            } else {
                Value::Double(x as f64 / y as f64)
            }
        }
        Modulo => {
            if y == 0 {
                Value::Invalid
            } else {
                Value::Int(x % y)
            }
        }
        Power => Value::Double((x as f64).powf(y as f64)),
        _ => unreachable!("non-arithmetic op routed to int_arithmetic"),
    }
}

fn double_arithmetic(op: Binary, x: f64, y: f64) -> Value {
    use Binary::*;
    match op {
        Add => Value::Double(x + y),
        Subtract => Value::Double(x - y),
        Multiply => Value::Double(x * y),
        Divide => {
            if y == 0.0 {
                Value::Invalid
            } else {
                Value::Double(x / y)
            }
        }
        Modulo => {
            if y == 0.0 {
                Value::Invalid
            } else {
                Value::Double(x % y)
            }
        }
        Power => Value::Double(x.powf(y)),
        _ => unreachable!("non-arithmetic op routed to double_arithmetic"),
    }
}

fn compare(op: Binary, a: &Value, b: &Value) -> Value {
    use Binary::*;
    let ordering = match compare_values(a, b) {
        Some(o) => o,
        None => return Value::Invalid,
    };
    let result = match op {
        Less => ordering.is_lt(),
        LessOrEqual => ordering.is_le(),
        Greater => ordering.is_gt(),
        GreaterOrEqual => ordering.is_ge(),
        _ => unreachable!(),
    };
    Value::Bool(result)
}

/// Orders values that are comparable: numeric (with int/double coercion),
/// string (codepoint order), bool (`false < true`), date (numeric order).
/// Returns `None` (→ `Invalid`) for incomparable pairs.
fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => x.partial_cmp(y),
        _ => {
            let x = a.as_f64()?;
            let y = b.as_f64()?;
            x.partial_cmp(&y)
        }
    }
}

/// Equality used by the `=`/`<>` binary operators: numeric coercion
/// int<->double, `Empty == Empty`, everything else structural. Distinct
/// from [`Value`]'s `PartialEq` impl, which additionally special-cases
/// `Invalid != Invalid` for use as a hash-map / dedup key.
fn values_equal_coercing(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Empty, Value::Empty) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Blob(x), Value::Blob(y)) => x == y,
        _ if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

fn substring_match(haystack: &Value, needle: &Value, case_sensitive: bool) -> Value {
    let h = haystack.to_display_string();
    let n = needle.to_display_string();
    if case_sensitive {
        Value::Bool(h.contains(&n))
    } else {
        Value::Bool(h.to_lowercase().contains(&n.to_lowercase()))
    }
}

fn regex_match(haystack: &Value, pattern: &Value, case_sensitive: bool) -> Value {
    let h = haystack.to_display_string();
    let p = pattern.to_display_string();
    let pattern_str = if case_sensitive { p } else { format!("(?i){p}") };
    match regex::Regex::new(&pattern_str) {
        Ok(re) => Value::Bool(re.is_match(&h)),
        Err(_) => Value::Invalid,
    }
}

/// Structural equality for use as a dedup/hash key (reducers' distinct
/// count, raster row comparisons). `Invalid != Invalid`; numeric
/// values still coerce so `Int(1)` and `Double(1.0)` collapse to one key.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if matches!(self, Value::Invalid) || matches!(other, Value::Invalid) {
            return false;
        }
        values_equal_coercing(self, other)
    }
}

/// Claimed despite `Invalid`'s non-reflexivity (mirrors the float-key
/// convention used throughout the corpus, e.g. ordered-float) — callers
/// must not rely on two `Invalid` cells deduping against each other.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Invalid => 0u8.hash(state),
            Value::Empty => 1u8.hash(state),
            _ if self.is_numeric() => {
                2u8.hash(state);
                match self.as_exact_i64() {
                    Some(i) => i.hash(state),
                    None => self.as_f64().unwrap().to_bits().hash(state),
                }
            }
            Value::Bool(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Date(d) => {
                5u8.hash(state);
                d.to_bits().hash(state);
            }
            Value::Blob(b) => {
                6u8.hash(state);
                b.hash(state);
            }
            Value::Int(_) | Value::Double(_) => unreachable!("handled by is_numeric arm"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// The 17 binary operators of the formula sublanguage .
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// `&` — string concatenation; `Empty & x = x`.
    Concat,
    /// `~=` — case-insensitive substring.
    ContainsCaseInsensitive,
    /// `~~=` — case-sensitive substring.
    ContainsCaseSensitive,
    /// `±=` — case-insensitive regex match.
    MatchesRegexCaseInsensitive,
    /// `±±=` — case-sensitive regex match.
    MatchesRegexCaseSensitive,
}

impl Binary {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Binary::Add | Binary::Multiply | Binary::Equal | Binary::NotEqual
        )
    }

    pub fn is_comparative(self) -> bool {
        matches!(
            self,
            Binary::Equal
                | Binary::NotEqual
                | Binary::Less
                | Binary::LessOrEqual
                | Binary::Greater
                | Binary::GreaterOrEqual
        )
    }

    /// The operator that preserves truth value when its two operands are
    /// swapped (e.g. `a < b` and `b > a` agree), or `None` if swapping
    /// operands changes meaning for any non-comparative operator.
    pub fn mirror(self) -> Option<Binary> {
        use Binary::*;
        match self {
            Equal => Some(Equal),
            NotEqual => Some(NotEqual),
            Less => Some(Greater),
            Greater => Some(Less),
            LessOrEqual => Some(GreaterOrEqual),
            GreaterOrEqual => Some(LessOrEqual),
            Add => Some(Add),
            Multiply => Some(Multiply),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        use Binary::*;
        match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            Power => "^",
            Equal => "=",
            NotEqual => "<>",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Concat => "&",
            ContainsCaseInsensitive => "~=",
            ContainsCaseSensitive => "~~=",
            MatchesRegexCaseInsensitive => "\u{b1}=",
            MatchesRegexCaseSensitive => "\u{b1}\u{b1}=",
        }
    }
}
