//! Values flowing through validation.
//!
//! Input arrives untyped (parsed JSON, query-string text) and leaves typed
//! (dates, datetimes, UUIDs). Both ends share this one representation so the
//! validator can hand back the input untouched when nothing was coerced.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use uuid::Uuid;

/// Longest value text quoted back in an error message.
pub const VALUE_REPR_MAX: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Uuid(Uuid),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

/// Runtime kind of a value, as reported in validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Date,
    DateTime,
    Uuid,
    Array,
    Dict,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Uuid => "uuid",
            ValueKind::Array => "array",
            ValueKind::Dict => "dict",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Dict,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Text form used by the query-string encoder. Containers have none.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
            Value::Uuid(u) => Some(u.hyphenated().to_string()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::Array(xs) => J::Array(xs.iter().map(Value::to_json).collect()),
            Value::Object(m) => J::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            other => other.scalar_text().map(J::String).unwrap_or(J::Null),
        }
    }

    /// JSON-ish rendering for error messages, bounded to [`VALUE_REPR_MAX`] chars.
    pub fn repr(&self) -> String {
        let text = self.to_json().to_string();
        if text.chars().count() > VALUE_REPR_MAX {
            let mut short: String = text.chars().take(VALUE_REPR_MAX).collect();
            short.push_str("...");
            short
        } else {
            text
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::String(s),
            J::Array(xs) => Value::Array(xs.into_iter().map(Value::from).collect()),
            J::Object(m) => Value::Object(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Array(xs) => {
                let mut seq = serializer.serialize_seq(Some(xs.len()))?;
                for x in xs {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            Value::Object(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            other => match other.scalar_text() {
                Some(text) => serializer.serialize_str(&text),
                None => serializer.serialize_unit(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_split_into_int_and_float() {
        assert_eq!(Value::from(json!(5)), Value::Int(5));
        assert_eq!(Value::from(json!(5.5)), Value::Float(5.5));
        assert_eq!(Value::from(json!(u64::MAX)).kind(), ValueKind::Float);
    }

    #[test]
    fn object_keys_keep_input_order() {
        let v = Value::from(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn typed_scalars_serialize_as_text() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let uuid = Uuid::parse_str("184EB00A-E4A3-4B5C-A5F6-4B2D56ED7D9F").unwrap();
        let v = Value::Array(vec![Value::Date(date), Value::Uuid(uuid)]);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!(["2024-02-29", "184eb00a-e4a3-4b5c-a5f6-4b2d56ed7d9f"])
        );
    }

    #[test]
    fn repr_is_bounded() {
        let long = Value::String("x".repeat(5000));
        let repr = long.repr();
        assert!(repr.ends_with("..."));
        assert_eq!(repr.chars().count(), VALUE_REPR_MAX + 3);
        assert_eq!(Value::from("abc").repr(), "\"abc\"");
    }
}
