//! Attribute constraints: value and length comparisons attached to a type or member.
//!
//! Syntax, as written inside parens/brackets/braces of a type expression:
//!
//! ```text
//! > 0, <= 100          value comparisons (int, float)
//! len > 2, len <= 10   length comparisons (string, array, dict)
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde::Serialize;

use crate::value::Value;

static RE_VALUE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<op><=|<|>=|>|==)\s*(?P<num>-?\d+(?:\.\d+)?)$").expect("value attr regex")
});

static RE_LENGTH_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^len\s*(?P<op><=|<|>=|>|==)\s*(?P<num>\d+)$").expect("length attr regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CmpOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
}

impl CmpOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(CmpOp::Eq),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Lte),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Gte),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }

    /// True when `lhs <op> rhs` holds.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Lte => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Gte => lhs >= rhs,
        }
    }
}

/// What a single comparison looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Value,
    Length,
}

/// One predicate, e.g. `> 2` or `len <= 10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub target: Target,
    pub op: CmpOp,
    pub threshold: OrderedFloat<f64>,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target == Target::Length {
            f.write_str("len ")?;
        }
        write!(f, "{} {}", self.op.symbol(), format_number(self.threshold.0))
    }
}

/// Fixed-point, six decimals, trailing zeros stripped: `2.500000` → `2.5`, `3.000000` → `3`.
pub fn format_number(n: f64) -> String {
    let text = format!("{n:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

/// The full predicate set of one declaration. Absent fields impose nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eq: Option<OrderedFloat<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<OrderedFloat<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<OrderedFloat<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<OrderedFloat<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<OrderedFloat<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_eq: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_lt: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_lte: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_gt: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_gte: Option<usize>,
}

impl Constraints {
    /// Parse a comma-separated attribute list. On failure returns the offending item text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut out = Self::default();
        for item in text.split(',').map(str::trim) {
            if let Some(caps) = RE_VALUE_ATTR.captures(item) {
                let op = CmpOp::parse(&caps["op"]).ok_or_else(|| item.to_string())?;
                let num: f64 = caps["num"].parse().map_err(|_| item.to_string())?;
                out.set(Target::Value, op, num);
            } else if let Some(caps) = RE_LENGTH_ATTR.captures(item) {
                let op = CmpOp::parse(&caps["op"]).ok_or_else(|| item.to_string())?;
                let num: usize = caps["num"].parse().map_err(|_| item.to_string())?;
                out.set(Target::Length, op, num as f64);
            } else {
                return Err(item.to_string());
            }
        }
        Ok(out)
    }

    fn set(&mut self, target: Target, op: CmpOp, num: f64) {
        let slot_value = OrderedFloat(num);
        let slot_len = num as usize;
        match (target, op) {
            (Target::Value, CmpOp::Eq) => self.eq = Some(slot_value),
            (Target::Value, CmpOp::Lt) => self.lt = Some(slot_value),
            (Target::Value, CmpOp::Lte) => self.lte = Some(slot_value),
            (Target::Value, CmpOp::Gt) => self.gt = Some(slot_value),
            (Target::Value, CmpOp::Gte) => self.gte = Some(slot_value),
            (Target::Length, CmpOp::Eq) => self.len_eq = Some(slot_len),
            (Target::Length, CmpOp::Lt) => self.len_lt = Some(slot_len),
            (Target::Length, CmpOp::Lte) => self.len_lte = Some(slot_len),
            (Target::Length, CmpOp::Gt) => self.len_gt = Some(slot_len),
            (Target::Length, CmpOp::Gte) => self.len_gte = Some(slot_len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Every present predicate, value comparisons first.
    pub fn iter(&self) -> impl Iterator<Item = Constraint> + '_ {
        let values = [
            (CmpOp::Lt, self.lt),
            (CmpOp::Lte, self.lte),
            (CmpOp::Gt, self.gt),
            (CmpOp::Gte, self.gte),
            (CmpOp::Eq, self.eq),
        ]
        .into_iter()
        .filter_map(|(op, n)| n.map(|threshold| Constraint { target: Target::Value, op, threshold }));

        let lengths = [
            (CmpOp::Lt, self.len_lt),
            (CmpOp::Lte, self.len_lte),
            (CmpOp::Gt, self.len_gt),
            (CmpOp::Gte, self.len_gte),
            (CmpOp::Eq, self.len_eq),
        ]
        .into_iter()
        .filter_map(|(op, n)| {
            n.map(|n| Constraint { target: Target::Length, op, threshold: OrderedFloat(n as f64) })
        });

        values.chain(lengths)
    }

    /// First predicate not allowed on a type, given which targets that type supports.
    pub fn first_disallowed(&self, allow_value: bool, allow_length: bool) -> Option<Constraint> {
        self.iter().find(|c| match c.target {
            Target::Value => !allow_value,
            Target::Length => !allow_length,
        })
    }

    /// Check a post-validation value; returns the first violated predicate.
    ///
    /// Numbers are compared by value; strings by char count; arrays and
    /// dicts by element count. Kinds without an ordering are never rejected here.
    pub fn check(&self, value: &Value) -> Result<(), Constraint> {
        let (number, length) = match value {
            Value::Int(i) => (Some(*i as f64), None),
            Value::Float(f) => (Some(*f), None),
            Value::String(s) => (None, Some(s.chars().count())),
            Value::Array(xs) => (None, Some(xs.len())),
            Value::Object(m) => (None, Some(m.len())),
            _ => (None, None),
        };
        for c in self.iter() {
            let lhs = match c.target {
                Target::Value => number,
                Target::Length => length.map(|n| n as f64),
            };
            if let Some(lhs) = lhs {
                if !c.op.holds(lhs, c.threshold.0) {
                    return Err(c);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_value_and_length_items() {
        let c = Constraints::parse(">= 1, < 10.5, len == 3").unwrap();
        assert_eq!(c.gte, Some(OrderedFloat(1.0)));
        assert_eq!(c.lt, Some(OrderedFloat(10.5)));
        assert_eq!(c.len_eq, Some(3));
        assert_eq!(c.iter().count(), 3);
    }

    #[test]
    fn rejects_garbage_items() {
        assert_eq!(Constraints::parse("> 1, bogus"), Err("bogus".to_string()));
        assert_eq!(Constraints::parse("len > -1"), Err("len > -1".to_string()));
    }

    #[test]
    fn later_items_overwrite_earlier() {
        let c = Constraints::parse("> 1, > 5").unwrap();
        assert_eq!(c.gt, Some(OrderedFloat(5.0)));
    }

    #[test]
    fn renders_trailing_zero_stripped() {
        let c = Constraints::parse("> 2, <= 1.250, len < 7").unwrap();
        let rendered: Vec<String> = c.iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, ["<= 1.25", "> 2", "len < 7"]);
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-3.5), "-3.5");
    }

    #[test]
    fn checks_by_value_kind() {
        let c = Constraints::parse("len > 2").unwrap();
        let err = c.check(&Value::Array(vec![Value::Int(1), Value::Int(2)])).unwrap_err();
        assert_eq!(err.to_string(), "len > 2");
        assert!(c.check(&Value::String("abc".into())).is_ok());
        // "é" is one char even though it is two bytes
        assert!(c.check(&Value::String("éé".into())).is_err());

        let c = Constraints::parse("< 5").unwrap();
        assert!(c.check(&Value::Int(4)).is_ok());
        assert_eq!(c.check(&Value::Float(5.0)).unwrap_err().op, CmpOp::Lt);
    }

    #[test]
    fn applicability() {
        let c = Constraints::parse("len < 3").unwrap();
        assert!(c.first_disallowed(false, true).is_none());
        assert_eq!(c.first_disallowed(true, false).unwrap().to_string(), "len < 3");
    }
}
