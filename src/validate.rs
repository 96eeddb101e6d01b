//! Validation engine: check and coerce a value against a compiled type.
//!
//! Validation is a pure recursive descent over (type graph, value, mode). It
//! stops at the first failing node and reports where it failed with a dotted
//! member path (`a.b.0.c`). When no coercion happens the input is handed back
//! borrowed, so re-validating an already validated value costs no allocation.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::attr::{Constraint, Constraints};
use crate::types::{ArrayType, BaseKind, DictType, EnumType, StructType, Type, TypedefType, Types, UserType};
use crate::value::{Value, ValueKind};

/// Which encodings the input may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Already correctly typed, usually the output of an earlier validation.
    Immutable,
    /// Every scalar is text; `""` may stand for an empty container and `"null"` for null.
    QueryString,
    /// JSON-native types; numbers may be widened and temporal/uuid text parsed.
    JsonInput,
}

pub type ValidationResult<'v> = Result<Cow<'v, Value>, ValidationError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{}", invalid_value_message(.value, .kind, .member, .expected, .constraint))]
    InvalidValue {
        /// Bounded JSON-ish text of the offending value.
        value: String,
        kind: ValueKind,
        member: Option<String>,
        expected: String,
        constraint: Option<Constraint>,
    },

    #[error("Required member '{member}' missing")]
    RequiredMember { member: String },

    #[error("Unknown member '{member}'")]
    UnknownMember { member: String },

    #[error("Unknown type '{name}'")]
    UnknownType { name: String },
}

fn invalid_value_message(
    value: &str,
    kind: &ValueKind,
    member: &Option<String>,
    expected: &str,
    constraint: &Option<Constraint>,
) -> String {
    let mut msg = format!("Invalid value {value} (type '{kind}')");
    if let Some(member) = member {
        msg.push_str(&format!(" for member '{member}'"));
    }
    msg.push_str(&format!(", expected type '{expected}'"));
    if let Some(constraint) = constraint {
        msg.push_str(&format!(" [{constraint}]"));
    }
    msg
}

impl ValidationError {
    pub fn invalid(value: &Value, member: Option<&str>, expected: &str) -> Self {
        ValidationError::InvalidValue {
            value: value.repr(),
            kind: value.kind(),
            member: member.map(str::to_string),
            expected: expected.to_string(),
            constraint: None,
        }
    }

    pub fn constraint(value: &Value, member: Option<&str>, expected: &str, constraint: Constraint) -> Self {
        ValidationError::InvalidValue {
            value: value.repr(),
            kind: value.kind(),
            member: member.map(str::to_string),
            expected: expected.to_string(),
            constraint: Some(constraint),
        }
    }

    /// Member path of the failure, if it happened below the root.
    pub fn member(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidValue { member, .. } => member.as_deref(),
            ValidationError::RequiredMember { member } | ValidationError::UnknownMember { member } => {
                Some(member)
            }
            ValidationError::UnknownType { .. } => None,
        }
    }
}

/// `parent.key`, or just `key` at the root.
pub fn member_path(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{key}"),
        None => key.to_string(),
    }
}

fn check_constraints(
    constraints: &Constraints,
    value: &Value,
    member: Option<&str>,
    expected: &str,
) -> Result<(), ValidationError> {
    constraints
        .check(value)
        .map_err(|c| ValidationError::constraint(value, member, expected, c))
}

// ————————————————————————————————————————————————————————————————————————————
// DISPATCH
// ————————————————————————————————————————————————————————————————————————————

impl Type {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        let result = match self {
            Type::String => match value {
                Value::String(_) => Ok(Cow::Borrowed(value)),
                _ => Err(ValidationError::invalid(value, member, "string")),
            },
            Type::Int => validate_int(value, mode, member),
            Type::Float => validate_float(value, mode, member),
            Type::Bool => validate_bool(value, mode, member),
            Type::Date => validate_date(value, mode, member),
            Type::DateTime => validate_datetime(value, mode, member),
            Type::Uuid => validate_uuid(value, mode, member),
            Type::Object => match value {
                Value::Null => Err(ValidationError::invalid(value, member, "object")),
                _ => Ok(Cow::Borrowed(value)),
            },
            Type::Array(array) => array.validate(types, value, mode, member),
            Type::Dict(dict) => dict.validate(types, value, mode, member),
            Type::User(name) => match types.get(name) {
                Some(user_type) => user_type.validate(types, value, mode, member),
                None => Err(ValidationError::UnknownType { name: name.clone() }),
            },
        };
        if let Err(error) = &result {
            tracing::trace!(%error, expected = self.type_name(), "validation failed");
        }
        result
    }
}

impl UserType {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        match self {
            UserType::Struct(st) => st.validate(types, value, mode, member),
            UserType::Enum(en) => en.validate(types, value, member),
            UserType::Typedef(td) => td.validate(types, value, mode, member),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCALARS
// ————————————————————————————————————————————————————————————————————————————

fn exact_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn validate_int<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    let parsed = match value {
        Value::Int(_) => return Ok(Cow::Borrowed(value)),
        Value::Float(f) => exact_i64(*f),
        Value::String(s) if mode == Mode::QueryString => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(exact_i64))
        }
        _ => None,
    };
    parsed
        .map(|i| Cow::Owned(Value::Int(i)))
        .ok_or_else(|| ValidationError::invalid(value, member, "int"))
}

fn validate_float<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    let parsed = match value {
        Value::Float(_) => return Ok(Cow::Borrowed(value)),
        Value::Int(i) => Some(*i as f64),
        Value::String(s) if mode == Mode::QueryString => {
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    };
    parsed
        .map(|f| Cow::Owned(Value::Float(f)))
        .ok_or_else(|| ValidationError::invalid(value, member, "float"))
}

fn validate_bool<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    match value {
        Value::Bool(_) => Ok(Cow::Borrowed(value)),
        Value::String(s) if mode == Mode::QueryString && s == "true" => Ok(Cow::Owned(Value::Bool(true))),
        Value::String(s) if mode == Mode::QueryString && s == "false" => Ok(Cow::Owned(Value::Bool(false))),
        _ => Err(ValidationError::invalid(value, member, "bool")),
    }
}

/// Text is parsed for temporal/uuid kinds in every mode but `Immutable`.
fn parses_text(mode: Mode) -> bool {
    mode != Mode::Immutable
}

fn validate_date<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    match value {
        Value::Date(_) => Ok(Cow::Borrowed(value)),
        Value::String(s) if parses_text(mode) => parse_iso8601_date(s)
            .map(|d| Cow::Owned(Value::Date(d)))
            .ok_or_else(|| ValidationError::invalid(value, member, "date")),
        _ => Err(ValidationError::invalid(value, member, "date")),
    }
}

fn validate_datetime<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    match value {
        Value::DateTime(_) => Ok(Cow::Borrowed(value)),
        Value::String(s) if parses_text(mode) => parse_iso8601_datetime(s)
            .map(|dt| Cow::Owned(Value::DateTime(dt)))
            .ok_or_else(|| ValidationError::invalid(value, member, "datetime")),
        _ => Err(ValidationError::invalid(value, member, "datetime")),
    }
}

fn validate_uuid<'v>(value: &'v Value, mode: Mode, member: Option<&str>) -> ValidationResult<'v> {
    match value {
        Value::Uuid(_) => Ok(Cow::Borrowed(value)),
        Value::String(s) if parses_text(mode) => Uuid::parse_str(s.trim())
            .map(|u| Cow::Owned(Value::Uuid(u)))
            .map_err(|_| ValidationError::invalid(value, member, "uuid")),
        _ => Err(ValidationError::invalid(value, member, "uuid")),
    }
}

pub fn parse_iso8601_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// ISO-8601 datetime; a missing offset means UTC, a bare date means midnight UTC.
pub fn parse_iso8601_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    const WITH_OFFSET: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%:z"];
    const NAIVE: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in NAIVE {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(utc.from_utc_datetime(&naive));
        }
    }
    let date = parse_iso8601_date(s)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

// ————————————————————————————————————————————————————————————————————————————
// CONTAINERS
// ————————————————————————————————————————————————————————————————————————————

fn is_empty_text(value: &Value, mode: Mode) -> bool {
    mode == Mode::QueryString && matches!(value, Value::String(s) if s.is_empty())
}

impl ArrayType {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        let items = match value {
            Value::Array(items) => items,
            _ if is_empty_text(value, mode) => return Ok(Cow::Owned(Value::Array(Vec::new()))),
            _ => return Err(ValidationError::invalid(value, member, "array")),
        };

        let mut out = Vec::with_capacity(items.len());
        let mut changed = false;
        for (index, item) in items.iter().enumerate() {
            let item_path = member_path(member, &index.to_string());
            let checked = self.element.validate(types, item, mode, Some(&item_path))?;
            check_constraints(&self.element_constraints, &checked, Some(&item_path), self.element.type_name())?;
            changed |= matches!(checked, Cow::Owned(_));
            out.push(checked);
        }

        if changed {
            Ok(Cow::Owned(Value::Array(out.into_iter().map(Cow::into_owned).collect())))
        } else {
            Ok(Cow::Borrowed(value))
        }
    }
}

impl DictType {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        let map = match value {
            Value::Object(map) => map,
            _ if is_empty_text(value, mode) => return Ok(Cow::Owned(Value::Object(IndexMap::new()))),
            _ => return Err(ValidationError::invalid(value, member, "dict")),
        };

        let mut out = IndexMap::with_capacity(map.len());
        let mut changed = false;
        for (key, item) in map {
            let item_path = member_path(member, key);
            let key_value = Value::String(key.clone());
            let checked_key = self.key.validate(types, &key_value, mode, Some(&item_path))?;
            check_constraints(&self.key_constraints, &checked_key, Some(&item_path), self.key.type_name())?;

            let checked = self.value.validate(types, item, mode, Some(&item_path))?;
            check_constraints(&self.value_constraints, &checked, Some(&item_path), self.value.type_name())?;
            changed |= matches!(checked, Cow::Owned(_));
            out.insert(key.clone(), checked);
        }

        if changed {
            Ok(Cow::Owned(Value::Object(
                out.into_iter().map(|(k, v)| (k, v.into_owned())).collect(),
            )))
        } else {
            Ok(Cow::Borrowed(value))
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// USER TYPES
// ————————————————————————————————————————————————————————————————————————————

impl StructType {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        static EMPTY: once_cell::sync::Lazy<IndexMap<String, Value>> = once_cell::sync::Lazy::new(IndexMap::new);

        let (map, mut changed) = match value {
            Value::Object(map) => (map, false),
            _ if is_empty_text(value, mode) => (&*EMPTY, true),
            _ => return Err(ValidationError::invalid(value, member, &self.name)),
        };

        if self.union && map.len() != 1 {
            return Err(ValidationError::invalid(value, member, &self.name));
        }

        let members = types.struct_members(self);
        let mut out: IndexMap<String, Cow<'v, Value>> = IndexMap::with_capacity(map.len());
        for m in &members {
            let path = member_path(member, &m.name);
            let Some(item) = map.get(&m.name) else {
                if !m.optional && !self.union {
                    return Err(ValidationError::RequiredMember { member: path });
                }
                continue;
            };

            if m.nullable && item.is_null() {
                out.insert(m.name.clone(), Cow::Owned(Value::Null));
                continue;
            }
            if m.nullable
                && mode == Mode::QueryString
                && item.as_str() == Some("null")
                && types.base_kind(&m.ty) != Some(BaseKind::String)
            {
                changed = true;
                out.insert(m.name.clone(), Cow::Owned(Value::Null));
                continue;
            }

            let checked = m.ty.validate(types, item, mode, Some(&path))?;
            check_constraints(&m.constraints, &checked, Some(&path), m.ty.type_name())?;
            changed |= matches!(checked, Cow::Owned(_));
            out.insert(m.name.clone(), checked);
        }

        if let Some(unknown) = map.keys().find(|key| !members.iter().any(|m| &m.name == *key)) {
            return Err(ValidationError::UnknownMember { member: member_path(member, unknown) });
        }

        // untouched values already in member order: the input already is the result
        if !changed && map.keys().eq(out.keys()) {
            return Ok(Cow::Borrowed(value));
        }
        Ok(Cow::Owned(Value::Object(
            out.into_iter().map(|(k, v)| (k, v.into_owned())).collect(),
        )))
    }
}

impl EnumType {
    pub fn validate<'v>(&self, types: &Types, value: &'v Value, member: Option<&str>) -> ValidationResult<'v> {
        let known = value
            .as_str()
            .is_some_and(|s| types.enum_values(self).iter().any(|v| v.value == s));
        if known {
            Ok(Cow::Borrowed(value))
        } else {
            Err(ValidationError::invalid(value, member, &self.name))
        }
    }
}

impl TypedefType {
    pub fn validate<'v>(
        &self,
        types: &Types,
        value: &'v Value,
        mode: Mode,
        member: Option<&str>,
    ) -> ValidationResult<'v> {
        let checked = self.target.validate(types, value, mode, member)?;
        check_constraints(&self.constraints, &checked, member, &self.name)?;
        Ok(checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> Schema {
        Schema::parse(src, "test.chsl").unwrap_or_else(|e| panic!("{e}"))
    }

    fn json(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    fn query(pairs: &[(&str, &str)]) -> Value {
        Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect())
    }

    #[test]
    fn query_string_coerces_and_reports_unknown_members() {
        let schema = compile("struct P\n    int a\n    optional string b\n");
        let input = query(&[("a", "5")]);
        let ok = schema.validate("P", &input, Mode::QueryString).unwrap();
        assert_eq!(ok.into_owned(), json(json!({"a": 5})));

        let err = schema
            .validate("P", &query(&[("a", "5"), ("c", "x")]), Mode::QueryString)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown member 'c'");
        assert_eq!(err.member(), Some("c"));
    }

    #[test]
    fn required_member_missing() {
        let schema = compile("struct P\n    int a\n    Q q\nstruct Q\n    string name\n");
        let err = schema.validate("P", &json(json!({"a": 1, "q": {}})), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Required member 'q.name' missing");
    }

    #[test]
    fn invalid_value_message_shape() {
        let schema = compile("struct P\n    int a\n");
        let err = schema.validate("P", &json(json!({"a": "x"})), Mode::JsonInput).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value \"x\" (type 'string') for member 'a', expected type 'int'"
        );
        let err = schema.validate("P", &json(json!([1])), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value [1] (type 'array'), expected type 'P'");
    }

    #[test]
    fn array_length_constraint() {
        let schema = compile("typedef int[len > 2] Triple\n");
        let err = schema.validate("Triple", &json(json!([1, 2])), Mode::JsonInput).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value [1,2] (type 'array'), expected type 'Triple' [len > 2]"
        );
        assert!(schema.validate("Triple", &json(json!([1, 2, 3])), Mode::JsonInput).is_ok());
    }

    #[test]
    fn element_constraints_use_element_paths() {
        let schema = compile("struct S\n    int(>= 0)[] counts\n");
        let err = schema
            .validate("S", &json(json!({"counts": [3, 0, -1]})), Mode::JsonInput)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value -1 (type 'int') for member 'counts.2', expected type 'int' [>= 0]"
        );
    }

    #[test]
    fn union_requires_exactly_one_member() {
        let schema = compile("union U\n    int x\n    string y\n");
        assert!(schema.validate("U", &json(json!({})), Mode::JsonInput).is_err());
        assert!(schema.validate("U", &json(json!({"x": 1, "y": "a"})), Mode::JsonInput).is_err());
        assert!(schema.validate("U", &json(json!({"x": 1})), Mode::JsonInput).is_ok());
        let err = schema.validate("U", &json(json!({"z": 1})), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Unknown member 'z'");
    }

    #[test]
    fn enum_accepts_inherited_values() {
        let schema = compile("enum Base\n    a\n    b\nenum E (Base)\n    c\n");
        assert!(schema.validate("E", &json(json!("a")), Mode::JsonInput).is_ok());
        assert!(schema.validate("E", &json(json!("c")), Mode::JsonInput).is_ok());
        let err = schema.validate("E", &json(json!("d")), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value \"d\" (type 'string'), expected type 'E'");
        assert!(schema.validate("Base", &json(json!("c")), Mode::JsonInput).is_err());
    }

    #[test]
    fn int_widening_by_mode() {
        let schema = compile("typedef int I\n");
        let whole = Value::Float(5.0);
        let v = schema.validate("I", &whole, Mode::JsonInput).unwrap();
        assert_eq!(*v, Value::Int(5));
        assert!(schema.validate("I", &Value::Float(5.5), Mode::JsonInput).is_err());
        assert!(schema.validate("I", &Value::from("5"), Mode::JsonInput).is_err());
        assert_eq!(*schema.validate("I", &Value::from("5.0"), Mode::QueryString).unwrap(), Value::Int(5));
        assert!(schema.validate("I", &Value::from("abc"), Mode::QueryString).is_err());
    }

    #[test]
    fn float_text_rejects_non_finite() {
        let schema = compile("typedef float F\n");
        assert_eq!(*schema.validate("F", &Value::from("2.5"), Mode::QueryString).unwrap(), Value::Float(2.5));
        assert!(schema.validate("F", &Value::from("nan"), Mode::QueryString).is_err());
        assert!(schema.validate("F", &Value::from("inf"), Mode::QueryString).is_err());
        assert_eq!(*schema.validate("F", &Value::Int(2), Mode::Immutable).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn bool_literals_only() {
        let schema = compile("typedef bool B\n");
        assert_eq!(*schema.validate("B", &Value::from("true"), Mode::QueryString).unwrap(), Value::Bool(true));
        assert!(schema.validate("B", &Value::from("True"), Mode::QueryString).is_err());
        assert!(schema.validate("B", &Value::from("true"), Mode::JsonInput).is_err());
        assert!(schema.validate("B", &Value::Int(1), Mode::JsonInput).is_err());
    }

    #[test]
    fn temporal_and_uuid_text() {
        let schema = compile("struct T\n    date d\n    datetime dt\n    uuid id\n");
        let input = json(json!({
            "d": "2024-03-01",
            "dt": "2024-03-01T12:30:00",
            "id": "a5e8fa37-0ad4-4b0c-9bc5-7d2cb4d5c7a3",
        }));
        let out = schema.validate("T", &input, Mode::JsonInput).unwrap().into_owned();
        let obj = out.as_object().unwrap();
        assert_eq!(obj["d"].kind(), ValueKind::Date);
        match &obj["dt"] {
            Value::DateTime(dt) => assert_eq!(dt.offset().local_minus_utc(), 0),
            other => panic!("expected datetime, got {other:?}"),
        }
        assert_eq!(obj["id"].kind(), ValueKind::Uuid);

        // already typed values do not parse text in immutable mode
        let err = schema.validate("T", &input, Mode::Immutable).unwrap_err();
        assert_eq!(err.member(), Some("d"));
    }

    #[test]
    fn datetime_keeps_explicit_offset() {
        let dt = parse_iso8601_datetime("2024-03-01T12:30:00+05:30").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
        let dt = parse_iso8601_datetime("2024-03-01T12:30:00.25Z").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 250);
        let dt = parse_iso8601_datetime("2024-03-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_iso8601_datetime("yesterday").is_none());
    }

    #[test]
    fn query_string_empty_text_and_null_conventions() {
        let schema = compile(
            "struct Q\n    int[] xs\n    int{} d\n    E e\n    optional nullable int n\n    optional nullable string s\nstruct E\n    optional int z\n",
        );
        let input = query(&[("xs", ""), ("d", ""), ("e", ""), ("n", "null"), ("s", "null")]);
        let out = schema.validate("Q", &input, Mode::QueryString).unwrap().into_owned();
        assert_eq!(out, json(json!({"xs": [], "d": {}, "e": {}, "n": null, "s": "null"})));

        // JSON input has no such conventions
        let err = schema
            .validate("Q", &json(json!({"xs": "", "d": {}, "e": {}})), Mode::JsonInput)
            .unwrap_err();
        assert_eq!(err.member(), Some("xs"));
    }

    #[test]
    fn null_needs_nullable() {
        let schema = compile("struct N\n    optional int a\n    nullable int b\n");
        let err = schema.validate("N", &json(json!({"a": null, "b": null})), Mode::JsonInput).unwrap_err();
        assert_eq!(err.member(), Some("a"));
        assert!(schema.validate("N", &json(json!({"b": null})), Mode::JsonInput).is_ok());
        let err = schema.validate("N", &json(json!({})), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Required member 'b' missing");
    }

    #[test]
    fn dict_keys_validate_against_enum() {
        let schema = compile("enum Color\n    red\n    green\n    blue\nstruct S\n    Color : int(> 0){len < 3} scores\n");
        assert!(schema.validate("S", &json(json!({"scores": {"red": 1}})), Mode::JsonInput).is_ok());
        let err = schema
            .validate("S", &json(json!({"scores": {"purple": 1}})), Mode::JsonInput)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value \"purple\" (type 'string') for member 'scores.purple', expected type 'Color'"
        );
        let err = schema
            .validate("S", &json(json!({"scores": {"red": 0}})), Mode::JsonInput)
            .unwrap_err();
        assert_eq!(err.member(), Some("scores.red"));
        let err = schema
            .validate("S", &json(json!({"scores": {"red": 1, "green": 2, "blue": 3}})), Mode::JsonInput)
            .unwrap_err();
        assert_eq!(err.member(), Some("scores"));
        assert!(err.to_string().ends_with("[len < 3]"), "{err}");
    }

    #[test]
    fn typedef_layers_constraints_on_target() {
        let schema = compile("typedef string(len <= 3) Short\ntypedef Short(len >= 2) Code\n");
        assert!(schema.validate("Code", &Value::from("ab"), Mode::JsonInput).is_ok());
        let err = schema.validate("Code", &Value::from("a"), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value \"a\" (type 'string'), expected type 'Code' [len >= 2]");
        let err = schema.validate("Code", &Value::from("abcd"), Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value \"abcd\" (type 'string'), expected type 'Short' [len <= 3]");
    }

    #[test]
    fn object_accepts_anything_but_null() {
        let schema = compile("struct O\n    object o\n");
        assert!(schema.validate("O", &json(json!({"o": [1, {"a": 2}]})), Mode::JsonInput).is_ok());
        assert!(schema.validate("O", &json(json!({"o": null})), Mode::JsonInput).is_err());
    }

    #[test]
    fn immutable_returns_borrowed_and_is_idempotent() {
        let schema = compile("struct P\n    int a\n    float f\n    string[] tags\n    date d\n");
        let input = json(json!({"a": 1.0, "f": 2, "tags": ["x"], "d": "2020-01-01"}));
        let first = schema.validate("P", &input, Mode::JsonInput).unwrap().into_owned();
        let second = schema.validate("P", &first, Mode::Immutable).unwrap();
        assert!(matches!(second, Cow::Borrowed(_)));
        assert_eq!(*second, first);
    }

    #[test]
    fn effective_member_order_in_output() {
        let schema = compile("struct A\n    int a\nstruct B (A)\n    int b\n");
        let out = schema
            .validate("B", &json(json!({"b": "2", "a": "1"})), Mode::QueryString)
            .unwrap()
            .into_owned();
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["a", "b"]);

        // nothing coerced, still reordered
        let input = json(json!({"b": 2, "a": 1}));
        let out = schema.validate("B", &input, Mode::JsonInput).unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        assert_eq!(serde_json::to_string(&*out).unwrap(), r#"{"a":1,"b":2}"#);

        let input = json(json!({"a": 1, "b": 2}));
        let out = schema.validate("B", &input, Mode::JsonInput).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn unknown_type_name() {
        let schema = compile("struct A\n    int a\n");
        let err = schema.validate("Nope", &Value::Null, Mode::JsonInput).unwrap_err();
        assert_eq!(err.to_string(), "Unknown type 'Nope'");
    }
}
