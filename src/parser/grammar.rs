//! Line shapes of the schema language and the type-expression builder.
//!
//! ```text
//! action <name>
//!   path|query|input|output [(<Base>, ...)]
//!   errors [(<Base>, ...)]
//!   url
//!     <METHOD|*> [/path/{arg}]
//! struct|union|enum <Name> [(<Base>, ...)]
//!     [optional] [nullable] <type-expr> <member>
//!     <value>
//! typedef <type-expr> <Name>
//! group ["Title"]
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::attr::Constraints;
use crate::types::Type;

const ID: &str = r"[A-Za-z_]\w*";

/// `ID (attrs)? ( [attrs] | (: ID (attrs)?)? {attrs} )?`
fn type_expr_pattern() -> String {
    format!(
        r"(?P<type>{ID})(?:\s*\(\s*(?P<attrs>[^)]*?)\s*\))?(?:\s*\[\s*(?P<array>[^\]]*?)\s*\]|(?:\s*:\s*(?P<dict_type>{ID})(?:\s*\(\s*(?P<dict_attrs>[^)]*?)\s*\))?)?\s*\{{\s*(?P<dict>[^}}]*?)\s*\}})?"
    )
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|error| panic!("invalid grammar regex {pattern:?}: {error}"))
}

pub(crate) static RE_CONTINUATION: Lazy<Regex> = Lazy::new(|| compile(r"\\\s*$"));

pub(crate) static RE_COMMENT: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(?:#-.*|#(?P<doc>.*))?$"));

pub(crate) static RE_GROUP: Lazy<Regex> = Lazy::new(|| compile(r#"^group(?:\s+"(?P<group>.+?)")?\s*$"#));

pub(crate) static RE_ACTION: Lazy<Regex> = Lazy::new(|| compile(&format!(r"^action\s+(?P<id>{ID})\s*$")));

pub(crate) static RE_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"^(?P<kind>struct|union|enum)\s+(?P<id>{ID})(?:\s*\(\s*(?P<bases>[^)]*?)\s*\))?\s*$"
    ))
});

pub(crate) static RE_SECTION: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\s+(?P<section>path|query|input|output|errors)(?:\s*\(\s*(?P<bases>[^)]*?)\s*\))?\s*$")
});

pub(crate) static RE_URL_SECTION: Lazy<Regex> = Lazy::new(|| compile(r"^\s+url\s*$"));

pub(crate) static RE_URL: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s+(?P<method>[A-Za-z]+|\*)(?:\s+(?P<path>/\S*))?\s*$"));

pub(crate) static RE_VALUE: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r#"^\s+(?P<id>{ID}|"[^"]+")\s*$"#)));

pub(crate) static RE_MEMBER: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"^\s+(?P<optional>optional\s+)?(?P<nullable>nullable\s+)?{}\s+(?P<id>{ID})\s*$",
        type_expr_pattern()
    ))
});

pub(crate) static RE_TYPEDEF: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(r"^typedef\s+{}\s+(?P<id>{ID})\s*$", type_expr_pattern()))
});

/// Comma-separated base list; empty items are dropped.
pub(crate) fn split_bases(text: Option<&str>) -> Vec<String> {
    text.map(|text| {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Empty or missing text means no constraints.
fn parse_attrs(text: Option<&str>) -> Result<Constraints, String> {
    match text.map(str::trim) {
        None | Some("") => Ok(Constraints::default()),
        Some(text) => Constraints::parse(text),
    }
}

/// A parsed type expression, plus what finalize must check about it.
#[derive(Debug)]
pub(crate) struct TypeExpr {
    pub ty: Type,
    /// Constraints on the declared thing itself (member or typedef).
    pub constraints: Constraints,
    /// User type names referenced, in order of appearance.
    pub refs: Vec<String>,
    /// Every non-empty constraint set with the type it constrains.
    pub attr_checks: Vec<(Type, Constraints)>,
    pub dict_key: Option<Type>,
}

impl TypeExpr {
    /// Build from a `RE_MEMBER`/`RE_TYPEDEF` match. On failure returns the bad attribute text.
    pub(crate) fn from_captures(caps: &Captures<'_>) -> Result<Self, String> {
        let first = Type::named(&caps["type"]);
        let first_attrs = parse_attrs(caps.name("attrs").map(|m| m.as_str()))?;

        let mut expr = TypeExpr {
            ty: first.clone(),
            constraints: Constraints::default(),
            refs: Vec::new(),
            attr_checks: Vec::new(),
            dict_key: None,
        };
        expr.note_ref(&first);

        if let Some(array) = caps.name("array") {
            let container = parse_attrs(Some(array.as_str()))?;
            expr.ty = Type::array(first.clone(), first_attrs.clone());
            expr.check(first, first_attrs);
            expr.constraints = container;
        } else if let Some(dict) = caps.name("dict") {
            let container = parse_attrs(Some(dict.as_str()))?;
            let (key, key_attrs, value, value_attrs) = match caps.name("dict_type") {
                Some(value_name) => {
                    let value = Type::named(value_name.as_str());
                    let value_attrs = parse_attrs(caps.name("dict_attrs").map(|m| m.as_str()))?;
                    expr.note_ref(&value);
                    (first, first_attrs, value, value_attrs)
                }
                None => (Type::String, Constraints::default(), first, first_attrs),
            };
            expr.ty = Type::dict(key.clone(), key_attrs.clone(), value.clone(), value_attrs.clone());
            expr.check(key.clone(), key_attrs);
            expr.check(value, value_attrs);
            expr.dict_key = Some(key);
            expr.constraints = container;
        } else {
            expr.constraints = first_attrs;
        }

        let own = expr.constraints.clone();
        expr.check(expr.ty.clone(), own);
        Ok(expr)
    }

    fn note_ref(&mut self, ty: &Type) {
        if let Type::User(name) = ty {
            self.refs.push(name.clone());
        }
    }

    fn check(&mut self, ty: Type, constraints: Constraints) {
        if !constraints.is_empty() {
            self.attr_checks.push((ty, constraints));
        }
    }
}
