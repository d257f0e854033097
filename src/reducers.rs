//! # Reducers
//!
//! Incremental accumulators backing the aggregate-eligible functions and
//! the `aggregate` transform (`Catalog` groups rows into buckets, one
//! `Reducer` instance per bucket per aggregator). Each reducer consumes
//! values one at a time via [`Reducer::add`] and can report a result at
//! any point via [`Reducer::result`] — neither call requires the full
//! input to be buffered, so aggregation is a single streaming pass.
//!
//! Non-numeric input to a reducer that only makes sense over numbers
//! (`sum`, `average`, variance/stdev) is skipped rather than propagated as
//! `Invalid` — an aggregate over a column with occasional blanks should
//! not poison the whole bucket.

use crate::pack;
use crate::value::Value;
use std::collections::HashSet;

pub trait Reducer: Send {
    fn add(&mut self, value: &Value);
    fn result(&self) -> Value;
}

#[derive(Default)]
pub struct SumReducer {
    int_total: i64,
    double_total: f64,
    saw_double: bool,
    saw_any: bool,
}

impl Reducer for SumReducer {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Int(i) => {
                self.saw_any = true;
                if self.saw_double {
                    self.double_total += *i as f64;
                } else {
                    self.int_total += i;
                }
            }
            Value::Double(d) => {
                self.saw_any = true;
                if !self.saw_double {
                    self.double_total = self.int_total as f64;
                    self.saw_double = true;
                }
                self.double_total += d;
            }
            _ => {}
        }
    }

    fn result(&self) -> Value {
        if !self.saw_any {
            return Value::Int(0);
        }
        if self.saw_double {
            Value::Double(self.double_total)
        } else {
            Value::Int(self.int_total)
        }
    }
}

#[derive(Default)]
pub struct AverageReducer {
    total: f64,
    count: u64,
}

impl Reducer for AverageReducer {
    fn add(&mut self, value: &Value) {
        if let Some(n) = value.as_f64() {
            self.total += n;
            self.count += 1;
        }
    }

    fn result(&self) -> Value {
        if self.count == 0 {
            Value::Invalid
        } else {
            Value::Double(self.total / self.count as f64)
        }
    }
}

#[derive(Default)]
pub struct CountReducer {
    count: u64,
}

impl Reducer for CountReducer {
    /// Counts only values whose numeric projection succeeds — a string or
    /// date cell does not count, even though it is neither empty nor
    /// invalid.
    fn add(&mut self, value: &Value) {
        if value.as_f64().is_some() {
            self.count += 1;
        }
    }

    fn result(&self) -> Value {
        Value::Int(self.count as i64)
    }
}

/// Counts every row, including empty and invalid cells — used by
/// `count_all`, whose contract is "number of rows in the bucket".
#[derive(Default)]
pub struct CountAllReducer {
    count: u64,
}

impl Reducer for CountAllReducer {
    fn add(&mut self, _value: &Value) {
        self.count += 1;
    }

    fn result(&self) -> Value {
        Value::Int(self.count as i64)
    }
}

#[derive(Default)]
pub struct CountDistinctReducer {
    seen: HashSet<Value>,
}

impl Reducer for CountDistinctReducer {
    fn add(&mut self, value: &Value) {
        if !value.is_empty() && !value.is_invalid() {
            self.seen.insert(value.clone());
        }
    }

    fn result(&self) -> Value {
        Value::Int(self.seen.len() as i64)
    }
}

pub struct MinReducer {
    best: Option<Value>,
}

impl Default for MinReducer {
    fn default() -> Self {
        MinReducer { best: None }
    }
}

impl Reducer for MinReducer {
    fn add(&mut self, value: &Value) {
        if value.is_empty() || value.is_invalid() {
            return;
        }
        let replace = match &self.best {
            None => true,
            Some(current) => matches!(value.apply_binary(crate::value::Binary::Less, current), Value::Bool(true)),
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.best.clone().unwrap_or(Value::Invalid)
    }
}

pub struct MaxReducer {
    best: Option<Value>,
}

impl Default for MaxReducer {
    fn default() -> Self {
        MaxReducer { best: None }
    }
}

impl Reducer for MaxReducer {
    fn add(&mut self, value: &Value) {
        if value.is_empty() || value.is_invalid() {
            return;
        }
        let replace = match &self.best {
            None => true,
            Some(current) => matches!(value.apply_binary(crate::value::Binary::Greater, current), Value::Bool(true)),
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.best.clone().unwrap_or(Value::Invalid)
    }
}

#[derive(Default)]
pub struct ConcatReducer {
    parts: Vec<String>,
}

impl Reducer for ConcatReducer {
    fn add(&mut self, value: &Value) {
        if !value.is_empty() {
            self.parts.push(value.to_display_string());
        }
    }

    fn result(&self) -> Value {
        Value::String(self.parts.concat())
    }
}

#[derive(Default)]
pub struct PackReducer {
    fields: Vec<String>,
}

impl Reducer for PackReducer {
    fn add(&mut self, value: &Value) {
        self.fields.push(value.to_display_string());
    }

    fn result(&self) -> Value {
        Value::String(pack::pack(&self.fields))
    }
}

pub struct RandomItemReducer {
    seen: u64,
    chosen: Option<Value>,
}

impl Default for RandomItemReducer {
    fn default() -> Self {
        RandomItemReducer { seen: 0, chosen: None }
    }
}

impl Reducer for RandomItemReducer {
    /// Reservoir sampling of size 1: each new element replaces the current
    /// choice with probability `1/seen`, so every element seen so far has
    /// equal probability of being the final pick regardless of stream length.
    fn add(&mut self, value: &Value) {
        if value.is_empty() {
            return;
        }
        self.seen += 1;
        let replace = self.seen == 1 || rand::random::<u64>() % self.seen == 0;
        if replace {
            self.chosen = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.chosen.clone().unwrap_or(Value::Empty)
    }
}

/// Which quantile a median reducer reports when the bucket has an even
/// element count: the average of the two middle elements, the lower of
/// the two, or the higher of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedianMode {
    Average,
    Low,
    High,
}

#[derive(Default)]
pub struct MedianReducer {
    values: Vec<f64>,
    mode: Option<MedianMode>,
}

impl MedianReducer {
    pub fn new(mode: MedianMode) -> Self {
        MedianReducer { values: Vec::new(), mode: Some(mode) }
    }
}

impl Reducer for MedianReducer {
    fn add(&mut self, value: &Value) {
        if let Some(n) = value.as_f64() {
            self.values.push(n);
        }
    }

    fn result(&self) -> Value {
        let mode = self.mode.unwrap_or(MedianMode::Average);
        if self.values.is_empty() {
            return Value::Invalid;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = sorted.len();
        let mid = n / 2;
        let value = if n % 2 == 1 {
            sorted[mid]
        } else {
            match mode {
                MedianMode::Average => (sorted[mid - 1] + sorted[mid]) / 2.0,
                MedianMode::Low => sorted[mid - 1],
                MedianMode::High => sorted[mid],
            }
        };
        Value::Double(value)
    }
}

/// Packs the sorted numeric values as a pack string, rather than
/// collapsing to a single quantile — useful for downstream percentile
/// lookups via `nth`.
#[derive(Default)]
pub struct MedianPackReducer {
    values: Vec<f64>,
}

impl Reducer for MedianPackReducer {
    fn add(&mut self, value: &Value) {
        if let Some(n) = value.as_f64() {
            self.values.push(n);
        }
    }

    fn result(&self) -> Value {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        Value::String(pack::pack(&sorted.iter().map(|n| n.to_string()).collect::<Vec<_>>()))
    }
}

fn variance(values: &[f64], population: bool) -> Option<f64> {
    let n = values.len();
    if n == 0 || (!population && n < 2) {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    let divisor = if population { n } else { n - 1 };
    Some(sum_sq / divisor as f64)
}

#[derive(Default)]
pub struct VarianceReducer {
    values: Vec<f64>,
    population: bool,
    /// Set once a non-empty, non-numeric value is seen; a poisoned
    /// reducer reports `Invalid` forever, even if later values are numeric.
    poisoned: bool,
}

impl VarianceReducer {
    pub fn new(population: bool) -> Self {
        VarianceReducer { values: Vec::new(), population, poisoned: false }
    }
}

impl Reducer for VarianceReducer {
    fn add(&mut self, value: &Value) {
        if value.is_empty() {
            return;
        }
        match value.as_f64() {
            Some(n) => self.values.push(n),
            None => self.poisoned = true,
        }
    }

    fn result(&self) -> Value {
        if self.poisoned {
            return Value::Invalid;
        }
        variance(&self.values, self.population).map(Value::Double).unwrap_or(Value::Invalid)
    }
}

#[derive(Default)]
pub struct StdevReducer {
    values: Vec<f64>,
    population: bool,
    poisoned: bool,
}

impl StdevReducer {
    pub fn new(population: bool) -> Self {
        StdevReducer { values: Vec::new(), population, poisoned: false }
    }
}

impl Reducer for StdevReducer {
    fn add(&mut self, value: &Value) {
        if value.is_empty() {
            return;
        }
        match value.as_f64() {
            Some(n) => self.values.push(n),
            None => self.poisoned = true,
        }
    }

    fn result(&self) -> Value {
        if self.poisoned {
            return Value::Invalid;
        }
        variance(&self.values, self.population).map(|v| Value::Double(v.sqrt())).unwrap_or(Value::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(mut r: impl Reducer, values: &[Value]) -> Value {
        for v in values {
            r.add(v);
        }
        r.result()
    }

    #[test]
    fn sum_stays_integer_until_a_double_appears() {
        let r = reduce(SumReducer::default(), &[Value::Int(1), Value::Int(2)]);
        assert!(matches!(r, Value::Int(3)));
        let r2 = reduce(SumReducer::default(), &[Value::Int(1), Value::Double(2.5)]);
        assert!(matches!(r2, Value::Double(d) if (d - 3.5).abs() < 1e-9));
    }

    #[test]
    fn average_of_empty_bucket_is_invalid() {
        let r = reduce(AverageReducer::default(), &[]);
        assert!(r.is_invalid());
    }

    #[test]
    fn count_skips_empty_and_invalid() {
        let r = reduce(CountReducer::default(), &[Value::Int(1), Value::Empty, Value::Invalid, Value::Int(2)]);
        assert!(matches!(r, Value::Int(2)));
    }

    #[test]
    fn count_all_counts_every_row() {
        let r = reduce(CountAllReducer::default(), &[Value::Int(1), Value::Empty, Value::Invalid]);
        assert!(matches!(r, Value::Int(3)));
    }

    #[test]
    fn count_distinct_dedupes_coercing_numerics() {
        let r = reduce(CountDistinctReducer::default(), &[Value::Int(1), Value::Double(1.0), Value::Int(2)]);
        assert!(matches!(r, Value::Int(2)));
    }

    #[test]
    fn count_distinct_excludes_invalid_values() {
        let r = reduce(
            CountDistinctReducer::default(),
            &[Value::Int(1), Value::Invalid, Value::Invalid, Value::Empty, Value::Int(2)],
        );
        assert!(matches!(r, Value::Int(2)));
    }

    #[test]
    fn min_and_max_ignore_invalid_and_empty() {
        let min = reduce(MinReducer::default(), &[Value::Int(3), Value::Invalid, Value::Int(1)]);
        assert!(matches!(min, Value::Int(1)));
        let max = reduce(MaxReducer::default(), &[Value::Int(3), Value::Empty, Value::Int(9)]);
        assert!(matches!(max, Value::Int(9)));
    }

    #[test]
    fn median_average_mode_averages_the_two_middle_values() {
        let r = reduce(
            MedianReducer::new(MedianMode::Average),
            &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
        );
        assert!(matches!(r, Value::Double(d) if (d - 2.5).abs() < 1e-9));
    }

    #[test]
    fn variance_sample_requires_at_least_two_values() {
        let r = reduce(VarianceReducer::new(false), &[Value::Int(5)]);
        assert!(r.is_invalid());
    }

    #[test]
    fn variance_is_permanently_poisoned_by_a_non_numeric_value() {
        let r = reduce(
            VarianceReducer::new(true),
            &[Value::Int(1), Value::String("nope".into()), Value::Int(2)],
        );
        assert!(r.is_invalid());
    }

    #[test]
    fn stdev_population_is_sqrt_of_variance_population() {
        let r = reduce(StdevReducer::new(true), &[Value::Int(2), Value::Int(4), Value::Int(4), Value::Int(4)]);
        assert!(matches!(r, Value::Double(d) if (d - 0.8660254).abs() < 1e-6));
    }

    #[test]
    fn concat_joins_display_strings_with_no_separator() {
        let r = reduce(ConcatReducer::default(), &[Value::Int(1), Value::String("x".into())]);
        assert_eq!(r.to_display_string(), "1x");
    }
}
