//! Integration tests for the sequencer pattern language (spec §4.10 /
//! scenario S6): enumeration order and cardinality.

use raveldb::sequencer::Sequencer;
use raveldb::value::Value;

fn strings_of(seq: &Sequencer) -> Vec<String> {
    seq.iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => panic!("sequencer produced a non-string value: {other:?}"),
        })
        .collect()
}

#[test]
fn choice_enumerates_every_character_in_written_order() {
    let seq = Sequencer::parse("[abc]").unwrap();
    assert_eq!(strings_of(&seq), vec!["a", "b", "c"]);
    assert_eq!(seq.cardinality(), Some(3));
}

#[test]
fn range_expands_to_every_character_in_between() {
    let seq = Sequencer::parse("[a-e]").unwrap();
    assert_eq!(strings_of(&seq), vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn concatenation_cycles_the_rightmost_component_fastest() {
    let seq = Sequencer::parse("[ab][xy]").unwrap();
    assert_eq!(strings_of(&seq), vec!["ax", "ay", "bx", "by"]);
}

#[test]
fn alternation_enumerates_each_branch_in_order() {
    let seq = Sequencer::parse("a|bb").unwrap();
    assert_eq!(strings_of(&seq), vec!["a", "bb"]);
    assert_eq!(seq.cardinality(), Some(2));
}

#[test]
fn maybe_prepends_the_empty_alternative() {
    let seq = Sequencer::parse("x?").unwrap();
    assert_eq!(strings_of(&seq), vec!["", "x"]);
}

#[test]
fn repeat_concatenates_the_same_node_n_times() {
    let seq = Sequencer::parse("[ab]{2}").unwrap();
    assert_eq!(strings_of(&seq), vec!["aa", "ab", "ba", "bb"]);
    assert_eq!(seq.cardinality(), Some(4));
}

#[test]
fn random_always_produces_a_value_from_the_enumeration() {
    let seq = Sequencer::parse("[abc]|[xy]{2}").unwrap();
    let universe = strings_of(&seq);
    for _ in 0..50 {
        let sampled = match seq.random() {
            Value::String(s) => s,
            other => panic!("unexpected sequencer value: {other:?}"),
        };
        assert!(universe.contains(&sampled), "sampled {sampled:?} not in {universe:?}");
    }
}
