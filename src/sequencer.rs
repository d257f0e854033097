//! # Sequencer (C10)
//!
//! A parser for a small regex-like pattern language describing a
//! (finite) value sequence: sequential concatenation, alternation
//! (`a|b`), maybe (`x?`), character choice (`[abc]`) and range
//! (`[a-z]`, with `[a-Z]`/`[A-z]` expanding to the full alphabet),
//! grouping (`(...)`), repeat (`x{n}`), and backslash escapes. Backs
//! the `randomString` function and a pattern-seeded column stream.
//!
//! Grammar lives in `sequencer/grammar.pest`, parsed the way
//! `syntax/mod.rs` parses Datalog for highlighting — `pest`/`pest_derive`
//! are already in the dependency table for that, reused here for a
//! second, unrelated small grammar.

use crate::error::{EngineError, Fallible};
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use rand::Rng;

#[derive(Parser)]
#[grammar = "sequencer/grammar.pest"]
struct SequencerParser;

/// One node of a parsed sequencer pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A literal run of characters (a plain run of `literal_char`s, or an
    /// escape's resolved character).
    Literal(String),
    /// `[abc]` / `[a-z]` — a single character drawn from this set, in
    /// the order written.
    Choice(Vec<char>),
    /// Sequential concatenation of sibling nodes (`ab`, grouping content).
    Concat(Vec<Node>),
    /// `a|b` — alternation.
    Alternation(Vec<Node>),
    /// `x?` — equivalent to `Alternation([Literal(""), x])`, kept distinct
    /// so cardinality/iteration read naturally as "x, or nothing."
    Maybe(Box<Node>),
    /// `x{n}` — equivalent to `Concat([x; n])`, kept distinct for the
    /// same reason.
    Repeat(Box<Node>, usize),
}

/// A compiled sequencer pattern, ready for `iter`/`random`/`cardinality`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequencer {
    root: Node,
}

impl Sequencer {
    pub fn parse(pattern: &str) -> Fallible<Sequencer> {
        let mut pairs = SequencerParser::parse(Rule::pattern, pattern)
            .map_err(|e| EngineError::Schema(format!("invalid sequencer pattern: {e}")))?;
        let pattern_pair = pairs.next().expect("pattern rule always produces one pair");
        let alternation_pair = pattern_pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::alternation)
            .expect("pattern always contains exactly one alternation");
        Ok(Sequencer { root: build_alternation(alternation_pair) })
    }

    /// Every value this pattern can produce, in lexicographic order —
    /// for a concatenation, the rightmost component cycles fastest.
    pub fn iter(&self) -> SequencerIter<'_> {
        SequencerIter { node: &self.root, index: 0 }
    }

    /// One uniformly-random branch taken at each choice point. Not
    /// weighted by subtree cardinality — `a|bb` picks between `a` and
    /// `bb` with equal probability, not in proportion to how many total
    /// values each side can produce.
    pub fn random(&self) -> Value {
        Value::String(self.root.random())
    }

    /// `None` once the total count would reach or exceed `i64::MAX` —
    /// the count is still finite, just not worth representing exactly.
    pub fn cardinality(&self) -> Option<usize> {
        self.root.cardinality()
    }
}

const CARDINALITY_CEILING: usize = i64::MAX as usize;

impl Node {
    fn cardinality(&self) -> Option<usize> {
        match self {
            Node::Literal(_) => Some(1),
            Node::Choice(chars) => Some(chars.len()),
            Node::Concat(children) => children.iter().try_fold(1usize, |acc, child| {
                let product = acc.checked_mul(child.cardinality()?)?;
                (product < CARDINALITY_CEILING).then_some(product)
            }),
            Node::Alternation(children) => children.iter().try_fold(0usize, |acc, child| {
                let sum = acc.checked_add(child.cardinality()?)?;
                (sum < CARDINALITY_CEILING).then_some(sum)
            }),
            Node::Maybe(inner) => inner.cardinality().and_then(|c| c.checked_add(1)),
            Node::Repeat(inner, n) => {
                let base = inner.cardinality()?;
                let mut total = 1usize;
                for _ in 0..*n {
                    total = total.checked_mul(base)?;
                    if total >= CARDINALITY_CEILING {
                        return None;
                    }
                }
                Some(total)
            }
        }
    }

    /// The `index`-th value in this node's lexicographic enumeration, or
    /// `None` if `index` is out of range.
    fn nth(&self, index: usize) -> Option<String> {
        match self {
            Node::Literal(s) => (index == 0).then(|| s.clone()),
            Node::Choice(chars) => chars.get(index).map(|c| c.to_string()),
            Node::Concat(children) => nth_of_sequence(children, index),
            Node::Alternation(children) => {
                let mut remaining = index;
                for child in children {
                    let card = child.cardinality().unwrap_or(usize::MAX);
                    if remaining < card {
                        return child.nth(remaining);
                    }
                    remaining -= card;
                }
                None
            }
            Node::Maybe(inner) => {
                if index == 0 {
                    Some(String::new())
                } else {
                    inner.nth(index - 1)
                }
            }
            Node::Repeat(inner, n) => {
                let children: Vec<Node> = std::iter::repeat((**inner).clone()).take(*n).collect();
                nth_of_sequence(&children, index)
            }
        }
    }

    /// Structural random draw: one random pick per choice point.
    fn random(&self) -> String {
        let mut rng = rand::thread_rng();
        match self {
            Node::Literal(s) => s.clone(),
            Node::Choice(chars) => chars[rng.gen_range(0..chars.len())].to_string(),
            Node::Concat(children) => children.iter().map(|c| c.random()).collect(),
            Node::Alternation(children) => children[rng.gen_range(0..children.len())].random(),
            Node::Maybe(inner) => {
                if rng.gen_bool(0.5) {
                    inner.random()
                } else {
                    String::new()
                }
            }
            Node::Repeat(inner, n) => (0..*n).map(|_| inner.random()).collect(),
        }
    }
}

/// Decodes `index` into per-child digits, least-significant digit last
/// (so the rightmost child cycles fastest), and concatenates each
/// child's corresponding value in original order.
fn nth_of_sequence(children: &[Node], index: usize) -> Option<String> {
    if children.is_empty() {
        return (index == 0).then(String::new);
    }
    let mut digits = vec![0usize; children.len()];
    let mut remaining = index;
    for (i, child) in children.iter().enumerate().rev() {
        let card = child.cardinality().unwrap_or(usize::MAX);
        digits[i] = remaining % card;
        remaining /= card;
    }
    if remaining != 0 {
        return None;
    }
    let mut out = String::new();
    for (child, digit) in children.iter().zip(digits) {
        out.push_str(&child.nth(digit)?);
    }
    Some(out)
}

/// Lazy iterator over a [`Sequencer`]'s full value sequence.
pub struct SequencerIter<'a> {
    node: &'a Node,
    index: usize,
}

impl<'a> Iterator for SequencerIter<'a> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let value = self.node.nth(self.index)?;
        self.index += 1;
        Some(Value::String(value))
    }
}

// ---------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------

fn build_alternation(pair: Pair<'_, Rule>) -> Node {
    let mut branches: Vec<Node> = pair.into_inner().map(build_concat).collect();
    if branches.len() == 1 {
        branches.remove(0)
    } else {
        Node::Alternation(branches)
    }
}

fn build_concat(pair: Pair<'_, Rule>) -> Node {
    let mut nodes: Vec<Node> = pair.into_inner().map(build_unary).collect();
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        Node::Concat(nodes)
    }
}

fn build_unary(pair: Pair<'_, Rule>) -> Node {
    let mut inner = pair.into_inner();
    let atom_pair = inner.next().expect("unary always has an atom");
    let atom = build_atom(atom_pair);
    match inner.next() {
        None => atom,
        Some(suffix) => match suffix.as_rule() {
            Rule::maybe => Node::Maybe(Box::new(atom)),
            Rule::repeat => {
                let number_pair = suffix.into_inner().next().expect("repeat always has a number");
                let n: usize = number_pair.as_str().parse().unwrap_or(0);
                Node::Repeat(Box::new(atom), n)
            }
            other => unreachable!("unexpected unary suffix rule: {other:?}"),
        },
    }
}

fn build_atom(pair: Pair<'_, Rule>) -> Node {
    let inner = pair.into_inner().next().expect("atom always wraps exactly one child");
    match inner.as_rule() {
        Rule::group => {
            let alternation = inner.into_inner().next().expect("group always wraps an alternation");
            build_alternation(alternation)
        }
        Rule::char_class => build_char_class(inner),
        Rule::escape => Node::Literal(resolve_escape(inner.as_str())),
        Rule::literal_char => Node::Literal(inner.as_str().to_string()),
        other => unreachable!("unexpected atom child rule: {other:?}"),
    }
}

fn build_char_class(pair: Pair<'_, Rule>) -> Node {
    let mut chars = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::range => {
                let mut class_chars = item.into_inner();
                let lo = single_char(class_chars.next().unwrap());
                let hi = single_char(class_chars.next().unwrap());
                push_range(&mut chars, lo, hi);
            }
            Rule::class_char => chars.push(single_char(item)),
            other => unreachable!("unexpected char_class item rule: {other:?}"),
        }
    }
    Node::Choice(chars)
}

fn single_char(pair: Pair<'_, Rule>) -> char {
    pair.as_str().chars().next().expect("class_char always has exactly one character")
}

/// Expands `lo..=hi`; the special case `[a-Z]`/`[A-z]` (a range that
/// spans the gap between uppercase and lowercase letters in ASCII)
/// expands to the full alphabet in both cases rather than including the
/// punctuation characters that sit between `Z` and `a`.
fn push_range(chars: &mut Vec<char>, lo: char, hi: char) {
    let spans_case_gap = (lo == 'a' && hi == 'Z') || (lo == 'A' && hi == 'z');
    if spans_case_gap {
        chars.extend('A'..='Z');
        chars.extend('a'..='z');
        return;
    }
    let (lo, hi) = if lo as u32 <= hi as u32 { (lo, hi) } else { (hi, lo) };
    for c in lo as u32..=hi as u32 {
        if let Some(c) = char::from_u32(c) {
            chars.push(c);
        }
    }
}

fn resolve_escape(escaped: &str) -> String {
    let c = escaped.chars().nth(1).expect("escape always has a character after the backslash");
    match c {
        't' => "\t".to_string(),
        'n' => "\n".to_string(),
        'r' => "\r".to_string(),
        's' if escaped == "\\space" => " ".to_string(),
        _ => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_has_cardinality_one() {
        let seq = Sequencer::parse("hello").unwrap();
        assert_eq!(seq.cardinality(), Some(1));
        assert_eq!(seq.iter().collect::<Vec<_>>(), vec![Value::String("hello".into())]);
    }

    #[test]
    fn s6_char_class_repeat_enumerates_in_right_inner_order() {
        let seq = Sequencer::parse("[A-C]{2}").unwrap();
        assert_eq!(seq.cardinality(), Some(9));
        let values: Vec<String> = seq.iter().map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["AA", "AB", "AC", "BA", "BB", "BC", "CA", "CB", "CC"]);
    }

    #[test]
    fn alternation_enumerates_each_branch_in_order() {
        let seq = Sequencer::parse("a|bb|c").unwrap();
        assert_eq!(seq.cardinality(), Some(3));
        let values: Vec<String> = seq.iter().map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["a", "bb", "c"]);
    }

    #[test]
    fn maybe_enumerates_empty_then_the_value() {
        let seq = Sequencer::parse("x?").unwrap();
        assert_eq!(seq.cardinality(), Some(2));
        let values: Vec<String> = seq.iter().map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["", "x"]);
    }

    #[test]
    fn grouping_and_concatenation_compose() {
        let seq = Sequencer::parse("(ab|c)d").unwrap();
        let values: Vec<String> = seq.iter().map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["abd", "cd"]);
    }

    #[test]
    fn case_gap_range_expands_to_full_alphabet() {
        let seq = Sequencer::parse("[a-Z]").unwrap();
        assert_eq!(seq.cardinality(), Some(52));
    }

    #[test]
    fn escape_resolves_reserved_characters_literally() {
        let seq = Sequencer::parse("a\\|b").unwrap();
        let values: Vec<String> = seq.iter().map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["a|b"]);
    }

    #[test]
    fn random_draws_a_value_within_the_enumerated_set() {
        let seq = Sequencer::parse("[xyz]{3}").unwrap();
        let all: std::collections::HashSet<String> = seq.iter().map(|v| v.to_display_string()).collect();
        for _ in 0..20 {
            let drawn = seq.random();
            assert!(all.contains(&drawn.to_display_string()));
        }
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(Sequencer::parse("[abc").is_err());
    }
}
