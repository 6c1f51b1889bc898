//! Integration tests for parameter encoding.

use proptest::prelude::*;
use restwire::encoding::{form_url_encode, params, ParamValue, Params};
use std::collections::BTreeSet;

fn nested(key: &str, value: ParamValue) -> Params {
    let mut map = Params::new();
    map.insert(key.to_string(), value);
    map
}

#[test]
fn test_keys_sorted_regardless_of_insertion_order() {
    let query = params([("b", "2"), ("a", "1")]);
    assert_eq!(form_url_encode(&query).as_deref(), Some("a=1&b=2"));
}

#[test]
fn test_nested_maps() {
    let query = nested("key", nested("key", "value".into()).into());
    assert_eq!(form_url_encode(&query).as_deref(), Some("key[key]=value"));

    let inner = params([("+", "v v"), ("-", ";")]);
    let query = nested("key", nested("key", inner.into()).into());
    assert_eq!(
        form_url_encode(&query).as_deref(),
        Some("key[key][%2B]=v%20v&key[key][-]=%3B")
    );
}

#[test]
fn test_list_values() {
    let query = nested("propArr1", vec!["a[]", "b"].into());
    let encoded = form_url_encode(&query).unwrap();
    assert!(encoded.contains("propArr1[]=a%5B%5D&propArr1[]=b"));
}

#[test]
fn test_set_values_sorted() {
    let set: BTreeSet<String> = ["z", "a"].iter().map(|s| s.to_string()).collect();
    let query = nested("tag", set.into());
    assert_eq!(form_url_encode(&query).as_deref(), Some("tag=a&tag=z"));
}

#[test]
fn test_reserved_characters_escaped() {
    let query = params([("key", " !\"#$%&'()*+,/[]")]);
    let encoded = form_url_encode(&query).unwrap();
    let value = encoded.strip_prefix("key=").unwrap();
    for c in " !\"#$%&'()*+,/[]".chars() {
        if c == '%' {
            continue;
        }
        assert!(!value.contains(c), "{:?} left unescaped in {}", c, value);
    }
    assert_eq!(value, "%20%21%22%23%24%25%26%27%28%29%2A%2B%2C%2F%5B%5D");
}

#[test]
fn test_already_encoded_value_is_escaped_again() {
    let query = params([("q", "a%20b")]);
    assert_eq!(form_url_encode(&query).as_deref(), Some("q=a%2520b"));
}

#[test]
fn test_empty_mapping_has_no_encoding() {
    assert_eq!(form_url_encode(&Params::new()), None);
}

proptest! {
    #[test]
    fn prop_encoding_independent_of_insertion_order(
        pairs in proptest::collection::hash_map("[a-z]{1,6}", "[ -~]{0,8}", 0..8)
    ) {
        let forward: Vec<(String, String)> = pairs.into_iter().collect();
        let reversed: Vec<(String, String)> = forward.iter().rev().cloned().collect();
        prop_assert_eq!(
            form_url_encode(&params(forward)),
            form_url_encode(&params(reversed))
        );
    }

    #[test]
    fn prop_values_never_contain_reserved_bytes(value in "[ -~]{0,16}") {
        let encoded = form_url_encode(&params([("k", value.as_str())])).unwrap();
        let escaped = encoded.strip_prefix("k=").unwrap();
        prop_assert!(escaped.chars().all(|c| c.is_ascii_alphanumeric() || "-._~%".contains(c)));
    }
}
