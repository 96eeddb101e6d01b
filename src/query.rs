//! Query-string codec for structured values.
//!
//! Nesting is flattened into dotted keys: `a.b=1&list.0=x&list.1=y`. Empty
//! containers are sent as `key=` and null as `key=null`, matching what
//! [`Mode::QueryString`](crate::validate::Mode::QueryString) validation accepts.

use indexmap::IndexMap;
use thiserror::Error;
use url::form_urlencoded;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryStringError {
    #[error("Invalid key/value pair '{0}'")]
    InvalidPair(String),
}

pub fn encode_query_string(values: &IndexMap<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in values {
        flatten(key.clone(), value, &mut pairs);
    }
    form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

fn flatten(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) if items.is_empty() => out.push((key, String::new())),
        Value::Object(map) if map.is_empty() => out.push((key, String::new())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(format!("{key}.{index}"), item, out);
            }
        }
        Value::Object(map) => {
            for (child, item) in map {
                flatten(format!("{key}.{child}"), item, out);
            }
        }
        scalar => out.push((key, scalar.scalar_text().unwrap_or_default())),
    }
}

/// Inverse of [`encode_query_string`]; every leaf comes back as text.
pub fn decode_query_string(text: &str) -> Result<IndexMap<String, Value>, QueryStringError> {
    let mut root = IndexMap::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let invalid = || QueryStringError::InvalidPair(pair.to_string());
        if !pair.contains('=') {
            return Err(invalid());
        }
        let (key, value) = form_urlencoded::parse(pair.as_bytes()).next().ok_or_else(invalid)?;
        let parts: Vec<&str> = key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        insert_entry(&mut root, &parts, Value::String(value.into_owned())).ok_or_else(invalid)?;
    }
    Ok(root)
}

fn empty_container(next: &str) -> Value {
    if next.parse::<usize>().is_ok() {
        Value::Array(Vec::new())
    } else {
        Value::Object(IndexMap::new())
    }
}

/// `None` on a shape conflict or an out-of-order array index.
fn insert_entry(map: &mut IndexMap<String, Value>, parts: &[&str], leaf: Value) -> Option<()> {
    let (part, rest) = parts.split_first()?;
    if rest.is_empty() {
        if matches!(map.get(*part), Some(Value::Array(_) | Value::Object(_))) {
            return None;
        }
        map.insert(part.to_string(), leaf);
        return Some(());
    }
    let slot = map.entry(part.to_string()).or_insert_with(|| empty_container(rest[0]));
    insert(slot, rest, leaf)
}

fn insert(target: &mut Value, parts: &[&str], leaf: Value) -> Option<()> {
    match target {
        Value::Object(map) => insert_entry(map, parts, leaf),
        Value::Array(items) => {
            let (part, rest) = parts.split_first()?;
            let index: usize = part.parse().ok()?;
            if index > items.len() {
                return None;
            }
            if rest.is_empty() {
                if matches!(items.get(index), Some(Value::Array(_) | Value::Object(_))) {
                    return None;
                }
                if index == items.len() {
                    items.push(leaf);
                } else {
                    items[index] = leaf;
                }
                return Some(());
            }
            if index == items.len() {
                items.push(empty_container(rest[0]));
            }
            insert(&mut items[index], rest, leaf)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::validate::Mode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn encodes_dotted_keys() {
        let value = Value::from(json!({
            "a": {"b": 1, "c": [true, "x y"]},
            "empty": [],
            "none": null,
        }));
        let Value::Object(map) = value else { panic!("object expected") };
        assert_eq!(encode_query_string(&map), "a.b=1&a.c.0=true&a.c.1=x+y&empty=&none=null");
    }

    #[test]
    fn decodes_into_text_leaves() {
        let map = decode_query_string("a.b=1&a.c.0=x&a.c.1=y%26z&e=&&").unwrap();
        assert_eq!(
            Value::Object(map),
            Value::from(json!({"a": {"b": "1", "c": ["x", "y&z"]}, "e": ""}))
        );
    }

    #[test]
    fn decode_errors() {
        assert_eq!(
            decode_query_string("a=1&novalue").unwrap_err().to_string(),
            "Invalid key/value pair 'novalue'"
        );
        assert!(decode_query_string("list.1=x").is_err());
        assert!(decode_query_string("a=1&a.b=2").is_err());
        assert_eq!(
            decode_query_string("a.b=1&a=2").unwrap_err(),
            QueryStringError::InvalidPair("a=2".to_string())
        );
        assert!(decode_query_string("l.0.x=1&l.0=2").is_err());
        assert!(decode_query_string("a..b=1").is_err());
    }

    #[test]
    fn round_trip_through_validation() {
        let schema = Schema::parse(
            "\
struct Inner
    float ratio
    optional nullable int maybe
struct Outer
    int count
    bool flag
    string name
    date day
    datetime at
    uuid id
    int[] nums
    Inner inner
    int{} scores
    string[] none
",
            "q.chsl",
        )
        .unwrap();
        let input = Value::from(json!({
            "count": 3,
            "flag": false,
            "name": "a b&c",
            "day": "2024-02-29",
            "at": "2024-02-29T08:15:30+02:00",
            "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "nums": [1, 2, 3],
            "inner": {"ratio": 0.25, "maybe": null},
            "scores": {"x": 1},
            "none": [],
        }));
        let typed = schema.validate("Outer", &input, Mode::JsonInput).unwrap().into_owned();
        let Value::Object(map) = &typed else { panic!("object expected") };

        let decoded = Value::Object(decode_query_string(&encode_query_string(map)).unwrap());
        let back = schema.validate("Outer", &decoded, Mode::QueryString).unwrap();
        assert_eq!(*back, typed);
    }
}
