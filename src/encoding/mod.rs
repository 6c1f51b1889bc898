//! Deterministic form/query parameter encoding.
//!
//! Parameters are a tree of strings, maps, lists and sets. Encoding flattens
//! the tree into `key=value` pairs using bracket syntax for nesting
//! (`outer[inner]`, `list[]`) and joins them with `&`. Map keys and set
//! members are visited in ascending order so the output never depends on
//! insertion order.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::{BTreeMap, BTreeSet};

/// Characters escaped in parameter values.
///
/// Everything except ASCII alphanumerics and `- . _ ~`, so sub-delimiters
/// such as `: / ? & = ; + ! @ # $ ( ) ' , *` are always escaped.
pub const VALUE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Characters escaped in parameter keys. Brackets stay literal so nested
/// keys remain readable.
pub const KEY_ENCODE_SET: &AsciiSet = &VALUE_ENCODE_SET.remove(b'[').remove(b']');

/// An ordered parameter mapping.
pub type Params = BTreeMap<String, ParamValue>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A scalar value.
    String(String),
    /// A nested mapping, encoded as `key[inner]`.
    Map(Params),
    /// An ordered list, encoded as repeated `key[]`.
    List(Vec<ParamValue>),
    /// An unordered set, encoded as repeated `key` in ascending order.
    Set(BTreeSet<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<Params> for ParamValue {
    fn from(value: Params) -> Self {
        ParamValue::Map(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeSet<String>> for ParamValue {
    fn from(value: BTreeSet<String>) -> Self {
        ParamValue::Set(value)
    }
}

macro_rules! display_param {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(value: $t) -> Self {
                    ParamValue::String(value.to_string())
                }
            }
        )*
    };
}

display_param!(bool, i32, i64, u32, u64, usize, f64);

/// Builds a [`Params`] mapping from key/value pairs.
///
/// ```
/// use restwire::encoding::{params, form_url_encode};
///
/// let query = params([("page", "2"), ("q", "rust")]);
/// assert_eq!(form_url_encode(&query).as_deref(), Some("page=2&q=rust"));
/// ```
pub fn params<K, V, I>(pairs: I) -> Params
where
    K: Into<String>,
    V: Into<ParamValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Flattens a mapping into `(key, value)` pairs in encoding order.
pub fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten_value(key, value, &mut pairs);
    }
    pairs
}

fn flatten_value(key: &str, value: &ParamValue, out: &mut Vec<(String, String)>) {
    match value {
        ParamValue::String(s) => out.push((key.to_string(), s.clone())),
        ParamValue::Map(map) => {
            for (inner, nested) in map {
                flatten_value(&format!("{}[{}]", key, inner), nested, out);
            }
        }
        ParamValue::List(items) => {
            let list_key = format!("{}[]", key);
            for item in items {
                flatten_value(&list_key, item, out);
            }
        }
        ParamValue::Set(members) => {
            for member in members {
                out.push((key.to_string(), member.clone()));
            }
        }
    }
}

/// Percent-encodes a parameter key.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Percent-encodes a parameter value.
///
/// Input is never decoded first, so an already-encoded value has its `%`
/// escaped again.
pub fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, VALUE_ENCODE_SET).to_string()
}

/// Encodes a parameter mapping as `application/x-www-form-urlencoded` text.
///
/// Returns `None` for an empty mapping, and `Some("")` when the mapping is
/// non-empty but produced no pairs (for example a key holding an empty list).
pub fn form_url_encode(params: &Params) -> Option<String> {
    if params.is_empty() {
        return None;
    }

    let encoded = flatten(params)
        .iter()
        .map(|(k, v)| format!("{}={}", encode_key(k), encode_value(v)))
        .collect::<Vec<_>>()
        .join("&");

    Some(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn test_determinism() {
        let p = params([("b", "2"), ("a", "1")]);
        assert_eq!(form_url_encode(&p).as_deref(), Some("a=1&b=2"));
    }

    #[test]
    fn test_empty_mapping_is_none() {
        assert_eq!(form_url_encode(&Params::new()), None);
    }

    #[test]
    fn test_empty_list_encodes_to_empty_string() {
        let p = params([("list", ParamValue::List(vec![]))]);
        assert_eq!(form_url_encode(&p).as_deref(), Some(""));
    }

    #[test]
    fn test_nested_map() {
        let p = params([("key", params([("key", "value")]))]);
        assert_eq!(form_url_encode(&p).as_deref(), Some("key[key]=value"));
    }

    #[test]
    fn test_deeply_nested_escapes_inner_keys() {
        let inner = params([("+", "value value"), ("-", ";")]);
        let p = params([("key", params([("key", inner)]))]);
        assert_eq!(
            form_url_encode(&p).as_deref(),
            Some("key[key][%2B]=value%20value&key[key][-]=%3B")
        );
    }

    #[test]
    fn test_mixed_object() {
        let p = params([
            ("propStr1", ParamValue::from("str1")),
            ("propStr2", ParamValue::from("str2")),
            ("propArr1", ParamValue::from(vec!["arrStr1[]", "arrStr2"])),
        ]);
        assert_eq!(
            form_url_encode(&p).as_deref(),
            Some("propArr1[]=arrStr1%5B%5D&propArr1[]=arrStr2&propStr1=str1&propStr2=str2")
        );
    }

    #[test]
    fn test_set_members_sorted_under_plain_key() {
        let set: BTreeSet<String> = ["z", "a", "m"].iter().map(|s| s.to_string()).collect();
        let p = params([("tag", set)]);
        assert_eq!(form_url_encode(&p).as_deref(), Some("tag=a&tag=m&tag=z"));
    }

    #[test]
    fn test_list_of_maps() {
        let p = params([(
            "items",
            ParamValue::List(vec![params([("id", "1")]).into(), params([("id", "2")]).into()]),
        )]);
        assert_eq!(form_url_encode(&p).as_deref(), Some("items[][id]=1&items[][id]=2"));
    }

    #[test_case(" !\"#$%&'()*+,/[]", "%20%21%22%23%24%25%26%27%28%29%2A%2B%2C%2F%5B%5D" ; "reserved characters")]
    #[test_case(":?=;@", "%3A%3F%3D%3B%40" ; "sub delimiters")]
    #[test_case("-._~", "-._~" ; "unreserved marks")]
    #[test_case("%20%21", "%2520%2521" ; "double encoding")]
    #[test_case("caf\u{e9}", "caf%C3%A9" ; "utf8")]
    fn test_value_escaping(input: &str, expected: &str) {
        let p = params([("key", input)]);
        assert_eq!(form_url_encode(&p), Some(format!("key={}", expected)));
    }

    #[test]
    fn test_key_keeps_brackets() {
        assert_eq!(encode_key("a[b] c"), "a[b]%20c");
        assert_eq!(encode_value("a[b]"), "a%5Bb%5D");
    }

    #[test]
    fn test_scalar_conversions() {
        let p = params([("n", ParamValue::from(42)), ("flag", ParamValue::from(true))]);
        assert_eq!(form_url_encode(&p).as_deref(), Some("flag=true&n=42"));
    }

    proptest! {
        #[test]
        fn prop_order_independent(pairs in proptest::collection::vec(("[a-z]{1,6}", "[ -~]{0,12}"), 1..8)) {
            let forward: Params = params(pairs.clone());
            let reversed: Params = params(pairs.into_iter().rev().collect::<Vec<_>>());
            // Duplicate keys resolve differently by order, so compare only the key sets' encodings.
            let forward_keys: Vec<_> = flatten(&forward).into_iter().map(|(k, _)| k).collect();
            let reversed_keys: Vec<_> = flatten(&reversed).into_iter().map(|(k, _)| k).collect();
            prop_assert_eq!(forward_keys, reversed_keys);
        }

        #[test]
        fn prop_encoded_value_is_url_safe(value in "\\PC{0,24}") {
            let encoded = encode_value(&value);
            prop_assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || "-._~%".contains(c)));
        }
    }
}
