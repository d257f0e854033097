//! # Function Library
//!
//! Every named function the formula layer can call, grouped into bands
//! (math, string, logic, date/time, numeric, space-filling-curve, blob,
//! pack accessors, and the aggregate-eligible reducer-backed functions).
//! Each function carries its arity requirement, whether repeated calls
//! with the same arguments are guaranteed to return the same result
//! (`is_deterministic`), whether applying it twice is the same as
//! applying it once (`is_idempotent`), and — for the functions that can
//! also act as a bucket reducer inside `aggregate` — a constructor for
//! the matching [`crate::reducers::Reducer`].

use crate::datetime;
use crate::pack;
use crate::reducers::{
    AverageReducer, ConcatReducer, CountAllReducer, CountDistinctReducer, CountReducer, MaxReducer, MedianMode,
    MedianPackReducer, MedianReducer, MinReducer, PackReducer, RandomItemReducer, Reducer, StdevReducer, SumReducer,
    VarianceReducer,
};
use crate::value::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How many arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Between(usize, usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n == k,
            Arity::Between(lo, hi) => n >= lo && n <= hi,
            Arity::AtLeast(lo) => n >= lo,
            Arity::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    // ---- unary math ----
    Negate,
    Absolute,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Asin,
    Acos,
    Atan,
    Exp,
    Ln,
    Log,
    Floor,
    Ceiling,
    Sign,

    // ---- string ----
    Upper,
    Lower,
    Left,
    Right,
    Mid,
    Length,
    Substitute,
    RegexSubstitute,
    Trim,
    Capitalize,
    UrlEncode,
    Levenshtein,
    Split,
    RandomString,

    // ---- logic ----
    Not,
    And,
    Or,
    Xor,
    If,
    Coalesce,
    IfError,
    In,
    NotIn,

    // ---- date/time ----
    Now,
    FromUnix,
    ToUnix,
    FromIso8601,
    ToUtcIso8601,
    ToLocalIso8601,
    FromExcelDate,
    ToExcelDate,
    UtcDate,
    UtcYear,
    UtcMonth,
    UtcDay,
    UtcHour,
    UtcMinute,
    UtcSecond,
    Duration,
    After,
    FromUnicodeDate,
    ToUnicodeDate,

    // ---- numeric ----
    Round,
    ParseNumber,
    Power,
    Random,
    RandomBetween,
    Uuid,

    // ---- space-filling curve ----
    HilbertXyToD,
    HilbertDToX,
    HilbertDToY,

    // ---- blob ----
    NumberOfBytes,
    Encode,
    Decode,

    // ---- pack accessors ----
    Nth,
    Items,
    ValueForKey,

    // ---- aggregate-eligible (reducer-backed) ----
    Sum,
    Average,
    Min,
    Max,
    Count,
    CountAll,
    CountDistinct,
    Concat,
    Pack,
    Median,
    MedianLow,
    MedianHigh,
    MedianPack,
    VariancePopulation,
    VarianceSample,
    StdevPopulation,
    StdevSample,
    RandomItem,
}

impl Function {
    pub fn name(self) -> &'static str {
        use Function::*;
        match self {
            Negate => "negate",
            Absolute => "absolute",
            Sqrt => "sqrt",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Sinh => "sinh",
            Cosh => "cosh",
            Tanh => "tanh",
            Asin => "asin",
            Acos => "acos",
            Atan => "atan",
            Exp => "exp",
            Ln => "ln",
            Log => "log",
            Floor => "floor",
            Ceiling => "ceiling",
            Sign => "sign",
            Upper => "upper",
            Lower => "lower",
            Left => "left",
            Right => "right",
            Mid => "mid",
            Length => "length",
            Substitute => "substitute",
            RegexSubstitute => "regex_substitute",
            Trim => "trim",
            Capitalize => "capitalize",
            UrlEncode => "url_encode",
            Levenshtein => "levenshtein",
            Split => "split",
            RandomString => "random_string",
            Not => "not",
            And => "and",
            Or => "or",
            Xor => "xor",
            If => "if",
            Coalesce => "coalesce",
            IfError => "if_error",
            In => "in",
            NotIn => "not_in",
            Now => "now",
            FromUnix => "from_unix",
            ToUnix => "to_unix",
            FromIso8601 => "from_iso8601",
            ToUtcIso8601 => "to_utc_iso8601",
            ToLocalIso8601 => "to_local_iso8601",
            FromExcelDate => "from_excel_date",
            ToExcelDate => "to_excel_date",
            UtcDate => "utc_date",
            UtcYear => "utc_year",
            UtcMonth => "utc_month",
            UtcDay => "utc_day",
            UtcHour => "utc_hour",
            UtcMinute => "utc_minute",
            UtcSecond => "utc_second",
            Duration => "duration",
            After => "after",
            FromUnicodeDate => "from_unicode_date",
            ToUnicodeDate => "to_unicode_date",
            Round => "round",
            ParseNumber => "parse_number",
            Power => "power",
            Random => "random",
            RandomBetween => "random_between",
            Uuid => "uuid",
            HilbertXyToD => "hilbert_xy_to_d",
            HilbertDToX => "hilbert_d_to_x",
            HilbertDToY => "hilbert_d_to_y",
            NumberOfBytes => "number_of_bytes",
            Encode => "encode",
            Decode => "decode",
            Nth => "nth",
            Items => "items",
            ValueForKey => "value_for_key",
            Sum => "sum",
            Average => "average",
            Min => "min",
            Max => "max",
            Count => "count",
            CountAll => "count_all",
            CountDistinct => "count_distinct",
            Concat => "concat",
            Pack => "pack",
            Median => "median",
            MedianLow => "median_low",
            MedianHigh => "median_high",
            MedianPack => "median_pack",
            VariancePopulation => "variance_population",
            VarianceSample => "variance_sample",
            StdevPopulation => "stdev_population",
            StdevSample => "stdev_sample",
            RandomItem => "random_item",
        }
    }

    pub fn arity(self) -> Arity {
        use Function::*;
        match self {
            Negate | Absolute | Sqrt | Sin | Cos | Tan | Sinh | Cosh | Tanh | Asin | Acos | Atan | Exp | Ln | Floor
            | Ceiling | Sign => Arity::Fixed(1),
            Log => Arity::Between(1, 2),

            Upper | Lower | Length | Trim | Capitalize | UrlEncode | RandomString => Arity::Fixed(1),
            Left | Right => Arity::Fixed(2),
            Mid => Arity::Fixed(3),
            Substitute | RegexSubstitute => Arity::Fixed(3),
            Levenshtein | Split => Arity::Fixed(2),

            Not => Arity::Fixed(1),
            And | Or => Arity::AtLeast(1),
            Xor => Arity::Fixed(2),
            If => Arity::Fixed(3),
            Coalesce => Arity::AtLeast(1),
            IfError => Arity::Fixed(2),
            In | NotIn => Arity::AtLeast(2),

            Now | Random | Uuid => Arity::Fixed(0),
            FromUnix | ToUnix | FromIso8601 | ToUtcIso8601 | ToLocalIso8601 | FromExcelDate | ToExcelDate | UtcDate
            | UtcYear | UtcMonth | UtcDay | UtcHour | UtcMinute | UtcSecond => Arity::Fixed(1),
            Duration | After | FromUnicodeDate | ToUnicodeDate | RandomBetween | Power => Arity::Fixed(2),

            Round => Arity::Between(1, 2),
            ParseNumber => Arity::Fixed(1),

            HilbertXyToD => Arity::Fixed(3),
            HilbertDToX | HilbertDToY => Arity::Fixed(2),

            NumberOfBytes | Encode | Decode => Arity::Fixed(1),

            Nth | ValueForKey => Arity::Fixed(2),
            Items => Arity::Fixed(1),

            Count | CountAll => Arity::Any,
            Sum | Average | Min | Max | CountDistinct | Concat | Pack | Median | MedianLow | MedianHigh
            | MedianPack | VariancePopulation | VarianceSample | StdevPopulation | StdevSample | RandomItem => {
                Arity::AtLeast(1)
            }
        }
    }

    /// False for the handful of functions whose result legitimately
    /// varies call to call with identical arguments: `random`,
    /// `random_between`, `random_string`, `random_item`, `now`, `uuid`.
    pub fn is_deterministic(self) -> bool {
        !matches!(
            self,
            Function::Random | Function::RandomBetween | Function::RandomString | Function::RandomItem | Function::Now | Function::Uuid
        )
    }

    /// True for functions where `f(f(x)) == f(x)`: case folding, rounding
    /// family, trimming, capitalization — applying them again is a no-op.
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            Function::Upper
                | Function::Lower
                | Function::Trim
                | Function::Absolute
                | Function::Floor
                | Function::Ceiling
                | Function::Capitalize
        )
    }

    /// The reducer constructor backing this function when used as an
    /// aggregator's `reduce` clause, or `None` for scalar-only functions.
    pub fn reducer(self) -> Option<Box<dyn Reducer>> {
        use Function::*;
        Some(match self {
            Sum => Box::new(SumReducer::default()),
            Average => Box::new(AverageReducer::default()),
            Min => Box::new(MinReducer::default()),
            Max => Box::new(MaxReducer::default()),
            Count => Box::new(CountReducer::default()),
            CountAll => Box::new(CountAllReducer::default()),
            CountDistinct => Box::new(CountDistinctReducer::default()),
            Concat => Box::new(ConcatReducer::default()),
            Pack => Box::new(PackReducer::default()),
            Median => Box::new(MedianReducer::new(MedianMode::Average)),
            MedianLow => Box::new(MedianReducer::new(MedianMode::Low)),
            MedianHigh => Box::new(MedianReducer::new(MedianMode::High)),
            MedianPack => Box::new(MedianPackReducer::default()),
            VariancePopulation => Box::new(VarianceReducer::new(true)),
            VarianceSample => Box::new(VarianceReducer::new(false)),
            StdevPopulation => Box::new(StdevReducer::new(true)),
            StdevSample => Box::new(StdevReducer::new(false)),
            RandomItem => Box::new(RandomItemReducer::default()),
            _ => return None,
        })
    }

    pub fn is_aggregate_eligible(self) -> bool {
        self.reducer().is_some()
    }

    /// Evaluates this function over already-evaluated argument values.
    /// Arity mismatches return `Value::Invalid` rather than panicking —
    /// `Expression::apply` never validates arity ahead of time.
    pub fn apply(self, args: &[Value]) -> Value {
        if !self.arity().accepts(args.len()) {
            return Value::Invalid;
        }
        if self.is_aggregate_eligible() {
            return apply_as_reducer(self, args);
        }
        match self {
            Function::Negate => unary_numeric(&args[0], |x| -x),
            Function::Absolute => unary_numeric(&args[0], f64::abs),
            Function::Sqrt => unary_numeric(&args[0], f64::sqrt),
            Function::Sin => unary_numeric(&args[0], f64::sin),
            Function::Cos => unary_numeric(&args[0], f64::cos),
            Function::Tan => unary_numeric(&args[0], f64::tan),
            Function::Sinh => unary_numeric(&args[0], f64::sinh),
            Function::Cosh => unary_numeric(&args[0], f64::cosh),
            Function::Tanh => unary_numeric(&args[0], f64::tanh),
            Function::Asin => unary_numeric(&args[0], f64::asin),
            Function::Acos => unary_numeric(&args[0], f64::acos),
            Function::Atan => unary_numeric(&args[0], f64::atan),
            Function::Exp => unary_numeric(&args[0], f64::exp),
            Function::Ln => unary_numeric(&args[0], f64::ln),
            Function::Log => log(args),
            Function::Floor => unary_numeric(&args[0], f64::floor),
            Function::Ceiling => unary_numeric(&args[0], f64::ceil),
            Function::Sign => unary_numeric(&args[0], f64::signum),

            Function::Upper => unary_string(&args[0], |s| s.to_uppercase()),
            Function::Lower => unary_string(&args[0], |s| s.to_lowercase()),
            Function::Left => left(args),
            Function::Right => right(args),
            Function::Mid => mid(args),
            Function::Length => length(&args[0]),
            Function::Substitute => substitute(args),
            Function::RegexSubstitute => regex_substitute(args),
            Function::Trim => unary_string(&args[0], |s| s.trim().to_string()),
            Function::Capitalize => unary_string(&args[0], capitalize),
            Function::UrlEncode => unary_string(&args[0], |s| urlencoding_encode(&s)),
            Function::Levenshtein => levenshtein_fn(args),
            Function::Split => split(args),
            Function::RandomString => random_string(&args[0]),

            Function::Not => not(&args[0]),
            Function::And => and(args),
            Function::Or => or(args),
            Function::Xor => xor(args),
            Function::If => if_fn(args),
            Function::Coalesce => coalesce(args),
            Function::IfError => if_error(args),
            Function::In => in_fn(args, false),
            Function::NotIn => in_fn(args, true),

            Function::Now => Value::Date(datetime::now()),
            Function::FromUnix => with_f64(&args[0], datetime::from_unix).map(Value::Date).unwrap_or(Value::Invalid),
            Function::ToUnix => with_f64(&args[0], datetime::to_unix).map(Value::Double).unwrap_or(Value::Invalid),
            Function::FromIso8601 => args[0].as_str().and_then(datetime::from_iso8601).map(Value::Date).unwrap_or(Value::Invalid),
            Function::ToUtcIso8601 => with_date(&args[0], |s| Some(datetime::to_utc_iso8601(s))).map(Value::String).unwrap_or(Value::Invalid),
            Function::ToLocalIso8601 => with_date(&args[0], |s| Some(datetime::to_local_iso8601(s))).map(Value::String).unwrap_or(Value::Invalid),
            Function::FromExcelDate => with_f64(&args[0], |d| datetime::from_excel_date(d).unwrap_or(f64::NAN)).map(Value::Date).unwrap_or(Value::Invalid),
            Function::ToExcelDate => with_date(&args[0], datetime::to_excel_date).map(Value::Double).unwrap_or(Value::Invalid),
            Function::UtcDate => with_date(&args[0], datetime::utc_date).map(Value::Date).unwrap_or(Value::Invalid),
            Function::UtcYear => with_date(&args[0], datetime::utc_year).map(Value::Int).unwrap_or(Value::Invalid),
            Function::UtcMonth => with_date(&args[0], datetime::utc_month).map(Value::Int).unwrap_or(Value::Invalid),
            Function::UtcDay => with_date(&args[0], datetime::utc_day).map(Value::Int).unwrap_or(Value::Invalid),
            Function::UtcHour => with_date(&args[0], datetime::utc_hour).map(Value::Int).unwrap_or(Value::Invalid),
            Function::UtcMinute => with_date(&args[0], datetime::utc_minute).map(Value::Int).unwrap_or(Value::Invalid),
            Function::UtcSecond => with_date(&args[0], datetime::utc_second).map(Value::Int).unwrap_or(Value::Invalid),
            Function::Duration => duration(args),
            Function::After => after(args),
            Function::FromUnicodeDate => from_unicode_date(args),
            Function::ToUnicodeDate => to_unicode_date(args),

            Function::Round => round(args),
            Function::ParseNumber => parse_number(&args[0]),
            Function::Power => power(args),
            Function::Random => Value::Double(rand::random::<f64>()),
            Function::RandomBetween => random_between(args),
            Function::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),

            Function::HilbertXyToD => hilbert_xy_to_d(args),
            Function::HilbertDToX => hilbert_d_to_xy(args).0,
            Function::HilbertDToY => hilbert_d_to_xy(args).1,

            Function::NumberOfBytes => number_of_bytes(&args[0]),
            Function::Encode => encode(&args[0]),
            Function::Decode => decode(&args[0]),

            Function::Nth => nth(args),
            Function::Items => items(&args[0]),
            Function::ValueForKey => value_for_key(args),

            _ => unreachable!("aggregate-eligible functions handled above"),
        }
    }
}

/// Evaluates an aggregate-eligible function used outside of an
/// aggregator's `reduce` slot (e.g. `sum(a, b, c)` as a plain call over a
/// literal argument list): folds the arguments through a fresh reducer.
fn apply_as_reducer(f: Function, args: &[Value]) -> Value {
    let mut reducer = f.reducer().expect("checked by caller");
    for a in args {
        reducer.add(a);
    }
    reducer.result()
}

// ============================================================================
// math
// ============================================================================

fn unary_numeric(v: &Value, f: impl Fn(f64) -> f64) -> Value {
    match v.as_f64() {
        Some(n) => Value::Double(f(n)),
        None => Value::Invalid,
    }
}

fn log(args: &[Value]) -> Value {
    let x = match args[0].as_f64() {
        Some(n) => n,
        None => return Value::Invalid,
    };
    let base = if args.len() == 2 {
        match args[1].as_f64() {
            Some(b) => b,
            None => return Value::Invalid,
        }
    } else {
        std::f64::consts::E
    };
    Value::Double(x.log(base))
}

// ============================================================================
// string
// ============================================================================

fn unary_string(v: &Value, f: impl Fn(String) -> String) -> Value {
    if v.is_empty() || v.is_invalid() {
        return Value::Invalid;
    }
    Value::String(f(v.to_display_string()))
}

fn capitalize(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => s,
    }
}

fn urlencoding_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn left(args: &[Value]) -> Value {
    let s = args[0].to_display_string();
    let n = match args[1].as_f64() {
        Some(n) if n >= 0.0 => n as usize,
        _ => return Value::Invalid,
    };
    Value::String(s.chars().take(n).collect())
}

fn right(args: &[Value]) -> Value {
    let s = args[0].to_display_string();
    let n = match args[1].as_f64() {
        Some(n) if n >= 0.0 => n as usize,
        _ => return Value::Invalid,
    };
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    Value::String(chars[start..].iter().collect())
}

fn mid(args: &[Value]) -> Value {
    let s = args[0].to_display_string();
    let (start, len) = match (args[1].as_f64(), args[2].as_f64()) {
        (Some(a), Some(b)) if a >= 0.0 && b >= 0.0 => (a as usize, b as usize),
        _ => return Value::Invalid,
    };
    let chars: Vec<char> = s.chars().collect();
    if start >= chars.len() {
        return Value::String(String::new());
    }
    let end = (start + len).min(chars.len());
    Value::String(chars[start..end].iter().collect())
}

fn length(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::Int(s.chars().count() as i64),
        Value::Blob(b) => Value::Int(b.len() as i64),
        Value::Empty => Value::Int(0),
        _ => Value::Int(v.to_display_string().chars().count() as i64),
    }
}

fn substitute(args: &[Value]) -> Value {
    let text = args[0].to_display_string();
    let from = args[1].to_display_string();
    let to = args[2].to_display_string();
    if from.is_empty() {
        return Value::String(text);
    }
    Value::String(text.replace(&from, &to))
}

fn regex_substitute(args: &[Value]) -> Value {
    let text = args[0].to_display_string();
    let pattern = args[1].to_display_string();
    let replacement = args[2].to_display_string();
    match regex::Regex::new(&pattern) {
        Ok(re) => Value::String(re.replace_all(&text, replacement.as_str()).into_owned()),
        Err(_) => Value::Invalid,
    }
}

fn levenshtein_fn(args: &[Value]) -> Value {
    let a = args[0].to_display_string();
    let b = args[1].to_display_string();
    Value::Int(levenshtein_distance(&a, &b) as i64)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = temp;
        }
    }
    row[b.len()]
}

fn split(args: &[Value]) -> Value {
    let text = args[0].to_display_string();
    let sep = args[1].to_display_string();
    let fields: Vec<String> = if sep.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(&sep).map(|s| s.to_string()).collect()
    };
    Value::String(pack::pack(&fields))
}

fn random_string(pattern: &Value) -> Value {
    let pattern = pattern.to_display_string();
    match crate::sequencer::Sequencer::parse(&pattern) {
        Ok(seq) => seq.random(),
        Err(_) => Value::Invalid,
    }
}

// ============================================================================
// logic
// ============================================================================

fn not(v: &Value) -> Value {
    match v.as_bool() {
        Some(b) => Value::Bool(!b),
        None => Value::Invalid,
    }
}

fn and(args: &[Value]) -> Value {
    for a in args {
        match a.as_bool() {
            Some(false) => return Value::Bool(false),
            Some(true) => continue,
            None => return Value::Invalid,
        }
    }
    Value::Bool(true)
}

fn or(args: &[Value]) -> Value {
    for a in args {
        match a.as_bool() {
            Some(true) => return Value::Bool(true),
            Some(false) => continue,
            None => return Value::Invalid,
        }
    }
    Value::Bool(false)
}

fn xor(args: &[Value]) -> Value {
    match (args[0].as_bool(), args[1].as_bool()) {
        (Some(a), Some(b)) => Value::Bool(a != b),
        _ => Value::Invalid,
    }
}

fn if_fn(args: &[Value]) -> Value {
    match args[0].as_bool() {
        Some(true) => args[1].clone(),
        Some(false) => args[2].clone(),
        None => Value::Invalid,
    }
}

fn coalesce(args: &[Value]) -> Value {
    for a in args {
        if !a.is_empty() && !a.is_invalid() {
            return a.clone();
        }
    }
    Value::Empty
}

fn if_error(args: &[Value]) -> Value {
    if args[0].is_invalid() {
        args[1].clone()
    } else {
        args[0].clone()
    }
}

fn in_fn(args: &[Value], negate: bool) -> Value {
    let needle = &args[0];
    let found = args[1..].iter().any(|candidate| needle == candidate);
    Value::Bool(found != negate)
}

// ============================================================================
// date/time
// ============================================================================

fn with_f64(v: &Value, f: impl Fn(f64) -> f64) -> Option<f64> {
    v.as_f64().map(f)
}

fn with_date<T>(v: &Value, f: impl Fn(f64) -> Option<T>) -> Option<T> {
    match v {
        Value::Date(s) => f(*s),
        _ => None,
    }
}

fn duration(args: &[Value]) -> Value {
    match (&args[0], &args[1]) {
        (Value::Date(a), Value::Date(b)) => Value::Double(a - b),
        _ => Value::Invalid,
    }
}

fn after(args: &[Value]) -> Value {
    match (&args[0], &args[1]) {
        (Value::Date(a), Value::Date(b)) => Value::Bool(a > b),
        _ => Value::Invalid,
    }
}

fn from_unicode_date(args: &[Value]) -> Value {
    let s = args[0].to_display_string();
    let format = args[1].to_display_string();
    datetime::from_unicode_date(&s, &format).map(Value::Date).unwrap_or(Value::Invalid)
}

fn to_unicode_date(args: &[Value]) -> Value {
    let format = args[1].to_display_string();
    with_date(&args[0], |s| datetime::to_unicode_date(s, &format)).map(Value::String).unwrap_or(Value::Invalid)
}

// ============================================================================
// numeric
// ============================================================================

fn round(args: &[Value]) -> Value {
    let x = match args[0].as_f64() {
        Some(n) => n,
        None => return Value::Invalid,
    };
    let digits = if args.len() == 2 { args[1].as_f64().unwrap_or(0.0) as i32 } else { 0 };
    if digits < 0 {
        return Value::Invalid;
    }
    let factor = 10f64.powi(digits);
    let rounded = (x * factor).round() / factor;
    if digits <= 0 && rounded.fract() == 0.0 {
        Value::Int(rounded as i64)
    } else {
        Value::Double(rounded)
    }
}

fn parse_number(v: &Value) -> Value {
    let s = match v {
        Value::String(s) => s.trim(),
        _ => return v.clone(),
    };
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    match s.parse::<f64>() {
        Ok(d) => Value::Double(d),
        Err(_) => Value::Invalid,
    }
}

fn power(args: &[Value]) -> Value {
    args[0].apply_binary(crate::value::Binary::Power, &args[1])
}

fn random_between(args: &[Value]) -> Value {
    let (lo, hi) = match (args[0].as_f64(), args[1].as_f64()) {
        (Some(lo), Some(hi)) if lo.fract() == 0.0 && hi.fract() == 0.0 => (lo as i64, hi as i64),
        _ => return Value::Invalid,
    };
    if hi <= lo {
        return Value::Invalid;
    }
    Value::Int(rand::thread_rng().gen_range(lo..=hi))
}

// ============================================================================
// space-filling curve (Hilbert d <-> (x, y) on an n*n grid, n a power of two)
// ============================================================================

fn is_power_of_two(n: u64) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

fn hilbert_xy_to_d(args: &[Value]) -> Value {
    let (n, mut x, mut y) = match (args[0].as_f64(), args[1].as_f64(), args[2].as_f64()) {
        (Some(n), Some(x), Some(y)) if n >= 1.0 && x >= 0.0 && y >= 0.0 => (n as u64, x as u64, y as u64),
        _ => return Value::Invalid,
    };
    if !is_power_of_two(n) || x >= n || y >= n {
        return Value::Invalid;
    }
    let mut d: u64 = 0;
    let mut s: u64 = n / 2;
    while s > 0 {
        let rx = if (x & s) > 0 { 1 } else { 0 };
        let ry = if (y & s) > 0 { 1 } else { 0 };
        d += s * s * ((3 * rx) ^ ry);
        hilbert_rotate(s, &mut x, &mut y, rx, ry);
        s >>= 1;
    }
    Value::Int(d as i64)
}

fn hilbert_d_to_xy(args: &[Value]) -> (Value, Value) {
    let (n, mut d) = match (args[0].as_f64(), args[1].as_f64()) {
        (Some(n), Some(d)) if n >= 1.0 && d >= 0.0 => (n as u64, d as u64),
        _ => return (Value::Invalid, Value::Invalid),
    };
    if !is_power_of_two(n) || d >= n * n {
        return (Value::Invalid, Value::Invalid);
    }
    let (mut x, mut y) = (0u64, 0u64);
    let mut s: u64 = 1;
    while s < n {
        let rx = 1 & (d / 2);
        let ry = 1 & (d ^ rx);
        hilbert_rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        d /= 4;
        s <<= 1;
    }
    (Value::Int(x as i64), Value::Int(y as i64))
}

fn hilbert_rotate(s: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = s.wrapping_sub(1).wrapping_sub(*x);
            *y = s.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}

// ============================================================================
// blob
// ============================================================================

fn number_of_bytes(v: &Value) -> Value {
    match v {
        Value::Blob(b) => Value::Int(b.len() as i64),
        Value::String(s) => Value::Int(s.len() as i64),
        _ => Value::Invalid,
    }
}

fn encode(v: &Value) -> Value {
    match v {
        Value::Blob(b) => Value::String(base64::encode(b)),
        Value::String(s) => Value::String(base64::encode(s.as_bytes())),
        _ => Value::Invalid,
    }
}

fn decode(v: &Value) -> Value {
    let s = match v {
        Value::String(s) => s,
        _ => return Value::Invalid,
    };
    match base64::decode(s) {
        Ok(bytes) => Value::Blob(bytes),
        Err(_) => Value::Invalid,
    }
}

// ============================================================================
// pack accessors
// ============================================================================

fn nth(args: &[Value]) -> Value {
    let packed = args[0].to_display_string();
    match args[1].as_f64() {
        Some(i) => pack::nth(&packed, i as i64).map(Value::String).unwrap_or(Value::Invalid),
        None => Value::Invalid,
    }
}

fn items(v: &Value) -> Value {
    Value::Int(pack::items(&v.to_display_string()) as i64)
}

fn value_for_key(args: &[Value]) -> Value {
    let packed = args[0].to_display_string();
    let key = args[1].to_display_string();
    pack::value_for_key(&packed, &key).map(Value::String).unwrap_or(Value::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_is_idempotent_and_deterministic() {
        assert!(Function::Absolute.is_idempotent());
        assert!(Function::Absolute.is_deterministic());
        assert!(!Function::Random.is_deterministic());
    }

    #[test]
    fn arity_mismatch_returns_invalid_without_panicking() {
        assert!(Function::Left.apply(&[Value::String("hi".into())]).is_invalid());
    }

    #[test]
    fn if_fn_dispatches_on_condition() {
        let r = Function::If.apply(&[Value::Bool(true), Value::Int(1), Value::Int(2)]);
        assert!(matches!(r, Value::Int(1)));
    }

    #[test]
    fn coalesce_skips_empty_and_invalid() {
        let r = Function::Coalesce.apply(&[Value::Empty, Value::Invalid, Value::Int(7)]);
        assert!(matches!(r, Value::Int(7)));
    }

    #[test]
    fn in_checks_membership_with_value_equality() {
        let r = Function::In.apply(&[Value::Int(2), Value::Int(1), Value::Double(2.0)]);
        assert!(matches!(r, Value::Bool(true)));
    }

    #[test]
    fn sum_used_as_a_plain_call_folds_through_a_reducer() {
        let r = Function::Sum.apply(&[Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(matches!(r, Value::Int(6)));
    }

    #[test]
    fn round_to_two_digits() {
        let r = Function::Round.apply(&[Value::Double(3.14159), Value::Int(2)]);
        assert!(matches!(r, Value::Double(d) if (d - 3.14).abs() < 1e-9));
    }

    #[test]
    fn round_rejects_negative_digits() {
        let r = Function::Round.apply(&[Value::Double(314.159), Value::Int(-1)]);
        assert!(matches!(r, Value::Invalid));
    }

    #[test]
    fn random_between_returns_integer_in_closed_range() {
        for _ in 0..50 {
            let r = Function::RandomBetween.apply(&[Value::Int(2), Value::Int(5)]);
            match r {
                Value::Int(v) => assert!((2..=5).contains(&v)),
                other => panic!("expected Int, got {other:?}"),
            }
        }
    }

    #[test]
    fn random_between_rejects_non_strict_bounds() {
        let r = Function::RandomBetween.apply(&[Value::Int(5), Value::Int(5)]);
        assert!(matches!(r, Value::Invalid));
    }

    #[test]
    fn random_between_rejects_non_integer_bounds() {
        let r = Function::RandomBetween.apply(&[Value::Double(1.5), Value::Int(5)]);
        assert!(matches!(r, Value::Invalid));
    }

    fn round_trip_hilbert(n: i64, x: i64, y: i64) {
        let d = Function::HilbertXyToD.apply(&[Value::Int(n), Value::Int(x), Value::Int(y)]);
        let back_x = Function::HilbertDToX.apply(&[Value::Int(n), d.clone()]);
        let back_y = Function::HilbertDToY.apply(&[Value::Int(n), d]);
        assert!(matches!(back_x, Value::Int(v) if v == x));
        assert!(matches!(back_y, Value::Int(v) if v == y));
    }

    #[test]
    fn hilbert_curve_round_trips() {
        round_trip_hilbert(16, 3, 9);
        round_trip_hilbert(8, 1, 1);
    }

    #[test]
    fn hilbert_rejects_non_power_of_two_n() {
        let r = Function::HilbertXyToD.apply(&[Value::Int(6), Value::Int(1), Value::Int(1)]);
        assert!(matches!(r, Value::Invalid));
    }

    #[test]
    fn hilbert_rejects_coordinates_at_or_beyond_n() {
        let r = Function::HilbertXyToD.apply(&[Value::Int(4), Value::Int(3), Value::Int(9)]);
        assert!(matches!(r, Value::Invalid));
    }

    #[test]
    fn left_and_right_take_unicode_scalar_values() {
        let r = Function::Left.apply(&[Value::String("café".into()), Value::Int(3)]);
        assert_eq!(r.to_display_string(), "caf");
    }

    #[test]
    fn encode_then_decode_preserves_bytes() {
        let blob = Value::Blob(vec![1, 2, 3, 255]);
        let encoded = Function::Encode.apply(&[blob.clone()]);
        let decoded = Function::Decode.apply(&[encoded]);
        assert!(matches!(decoded, Value::Blob(b) if b == vec![1, 2, 3, 255]));
    }
}
