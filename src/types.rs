//! Compiled type model.
//!
//! `Type` is what a member, element, key or typedef target points at; user
//! types are referenced by name and looked up in `Types`, the registry built
//! by the parser. Nothing here owns a pointer to another user type, so the
//! graph may be cyclic (a struct holding an optional member of its own type).

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::attr::Constraints;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    String,
    Int,
    Float,
    Bool,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Uuid,
    Object,
    Array(Box<ArrayType>),
    Dict(Box<DictType>),
    /// Struct, union, enum or typedef, by name.
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayType {
    pub element: Type,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub element_constraints: Constraints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DictType {
    pub value: Type,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub value_constraints: Constraints,
    pub key: Type,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub key_constraints: Constraints,
}

impl Type {
    /// Builtin keyword lookup.
    pub fn builtin(name: &str) -> Option<Type> {
        match name {
            "string" => Some(Type::String),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "bool" => Some(Type::Bool),
            "date" => Some(Type::Date),
            "datetime" => Some(Type::DateTime),
            "uuid" => Some(Type::Uuid),
            "object" => Some(Type::Object),
            _ => None,
        }
    }

    /// Builtin if the name is a keyword, otherwise a (possibly forward) user reference.
    pub fn named(name: &str) -> Type {
        Type::builtin(name).unwrap_or_else(|| Type::User(name.to_string()))
    }

    /// Name reported as "expected type" in validation errors.
    pub fn type_name(&self) -> &str {
        match self {
            Type::String => "string",
            Type::Int => "int",
            Type::Float => "float",
            Type::Bool => "bool",
            Type::Date => "date",
            Type::DateTime => "datetime",
            Type::Uuid => "uuid",
            Type::Object => "object",
            Type::Array(_) => "array",
            Type::Dict(_) => "dict",
            Type::User(name) => name,
        }
    }

    pub fn array(element: Type, element_constraints: Constraints) -> Type {
        Type::Array(Box::new(ArrayType { element, element_constraints }))
    }

    pub fn dict(key: Type, key_constraints: Constraints, value: Type, value_constraints: Constraints) -> Type {
        Type::Dict(Box::new(DictType { value, value_constraints, key, key_constraints }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub optional: bool,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructType {
    pub name: String,
    pub union: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    /// Directly declared members; see [`Types::struct_members`] for the inherited view.
    pub members: Vec<StructMember>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_group: Option<String>,
}

impl StructType {
    pub fn new(name: impl Into<String>, union: bool) -> Self {
        Self {
            name: name.into(),
            union,
            bases: Vec::new(),
            members: Vec::new(),
            doc: Vec::new(),
            doc_group: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumType {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    pub values: Vec<EnumValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_group: Option<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            values: Vec::new(),
            doc: Vec::new(),
            doc_group: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedefType {
    pub name: String,
    #[serde(rename = "type")]
    pub target: Type,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserType {
    Struct(StructType),
    Enum(EnumType),
    Typedef(TypedefType),
}

impl UserType {
    pub fn name(&self) -> &str {
        match self {
            UserType::Struct(s) => &s.name,
            UserType::Enum(e) => &e.name,
            UserType::Typedef(t) => &t.name,
        }
    }

    pub fn doc(&self) -> &[String] {
        match self {
            UserType::Struct(s) => &s.doc,
            UserType::Enum(e) => &e.doc,
            UserType::Typedef(t) => &t.doc,
        }
    }

    pub fn doc_group(&self) -> Option<&str> {
        match self {
            UserType::Struct(s) => s.doc_group.as_deref(),
            UserType::Enum(e) => e.doc_group.as_deref(),
            UserType::Typedef(t) => t.doc_group.as_deref(),
        }
    }

    pub fn bases(&self) -> &[String] {
        match self {
            UserType::Struct(s) => &s.bases,
            UserType::Enum(e) => &e.bases,
            UserType::Typedef(_) => &[],
        }
    }
}

/// Kind a type boils down to once typedef chains are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Uuid,
    Object,
    Array,
    Dict,
    Struct,
    Enum,
}

impl BaseKind {
    /// (value comparisons allowed, length comparisons allowed)
    pub fn allowed_constraints(self) -> (bool, bool) {
        match self {
            BaseKind::Int | BaseKind::Float => (true, false),
            BaseKind::String | BaseKind::Array | BaseKind::Dict => (false, true),
            _ => (false, false),
        }
    }
}

/// The type registry: user types by name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Types(IndexMap<String, UserType>);

impl Types {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&UserType> {
        self.0.get(name)
    }

    /// Like [`Types::get`], also handing back the registry-owned name.
    pub fn get_entry(&self, name: &str) -> Option<(&str, &UserType)> {
        self.0.get_key_value(name).map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut UserType> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub(crate) fn insert(&mut self, user_type: UserType) {
        self.0.insert(user_type.name().to_string(), user_type);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserType)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructType> {
        match self.get(name) {
            Some(UserType::Struct(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_enum(&self, name: &str) -> Option<&EnumType> {
        match self.get(name) {
            Some(UserType::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Effective members: each base's effective members, left to right, then own members.
    ///
    /// Bases that are missing, of the wrong kind, or already on the walk are skipped,
    /// so this terminates even on a registry that failed finalize.
    pub fn struct_members<'a>(&'a self, st: &'a StructType) -> Vec<&'a StructMember> {
        let mut out = Vec::new();
        let mut walk = HashSet::new();
        walk.insert(st.name.as_str());
        self.collect_members(st, &mut walk, &mut out);
        out
    }

    fn collect_members<'a>(
        &'a self,
        st: &'a StructType,
        walk: &mut HashSet<&'a str>,
        out: &mut Vec<&'a StructMember>,
    ) {
        for base in &st.bases {
            if let Some(base_st) = self.get_struct(base) {
                if walk.insert(base_st.name.as_str()) {
                    self.collect_members(base_st, walk, out);
                    walk.remove(base_st.name.as_str());
                }
            }
        }
        out.extend(st.members.iter());
    }

    /// Effective enum values: bases first, then own values.
    pub fn enum_values<'a>(&'a self, en: &'a EnumType) -> Vec<&'a EnumValue> {
        let mut out = Vec::new();
        let mut walk = HashSet::new();
        walk.insert(en.name.as_str());
        self.collect_values(en, &mut walk, &mut out);
        out
    }

    fn collect_values<'a>(
        &'a self,
        en: &'a EnumType,
        walk: &mut HashSet<&'a str>,
        out: &mut Vec<&'a EnumValue>,
    ) {
        for base in &en.bases {
            if let Some(base_en) = self.get_enum(base) {
                if walk.insert(base_en.name.as_str()) {
                    self.collect_values(base_en, walk, out);
                    walk.remove(base_en.name.as_str());
                }
            }
        }
        out.extend(en.values.iter());
    }

    /// Follow typedefs down to a concrete kind. `None` for unresolved names or typedef cycles.
    pub fn base_kind(&self, ty: &Type) -> Option<BaseKind> {
        let mut seen = HashSet::new();
        let mut ty = ty;
        loop {
            return match ty {
                Type::String => Some(BaseKind::String),
                Type::Int => Some(BaseKind::Int),
                Type::Float => Some(BaseKind::Float),
                Type::Bool => Some(BaseKind::Bool),
                Type::Date => Some(BaseKind::Date),
                Type::DateTime => Some(BaseKind::DateTime),
                Type::Uuid => Some(BaseKind::Uuid),
                Type::Object => Some(BaseKind::Object),
                Type::Array(_) => Some(BaseKind::Array),
                Type::Dict(_) => Some(BaseKind::Dict),
                Type::User(name) => match self.get(name)? {
                    UserType::Struct(_) => Some(BaseKind::Struct),
                    UserType::Enum(_) => Some(BaseKind::Enum),
                    UserType::Typedef(td) => {
                        if !seen.insert(name.as_str()) {
                            return None;
                        }
                        ty = &td.target;
                        continue;
                    }
                },
            };
        }
    }
}
