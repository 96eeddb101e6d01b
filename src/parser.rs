//! Schema language compiler.
//!
//! A single forward scan over logical lines; each line is matched against the
//! grammar in priority order and the first shape that matches wins. Problems
//! are collected, never raised per line, so one run reports every error in a
//! source. Names may be used before they are declared (here or in a later
//! `parse` call); they are resolved by [`Parser::finalize`].

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::action::{Action, ActionUrl, Section};
use crate::attr::Constraints;
use crate::error::CompileError;
use crate::types::{EnumType, EnumValue, StructMember, StructType, Type, TypedefType, Types, UserType};

pub mod finalize;
pub mod grammar;

use grammar::{
    RE_ACTION, RE_COMMENT, RE_CONTINUATION, RE_DEFINITION, RE_GROUP, RE_MEMBER, RE_SECTION, RE_TYPEDEF, RE_URL,
    RE_URL_SECTION, RE_VALUE, TypeExpr, split_bases,
};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Location {
    pub file: String,
    pub line: usize,
}

/// Checks deferred until every source has been seen.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    /// User type names used by members, elements, keys and typedef targets.
    pub refs: Vec<(String, Location)>,
    pub attrs: Vec<(Type, Constraints, Location)>,
    pub dict_keys: Vec<(Type, Location)>,
    /// Bases of action sections; bases of registry types live on the types.
    pub section_bases: Vec<(String, Section, Location)>,
}

/// Accumulates sources into a registry; see the module docs.
#[derive(Debug, Default)]
pub struct Parser {
    pub(crate) types: Types,
    pub(crate) actions: IndexMap<String, Action>,
    pub(crate) errors: Vec<CompileError>,
    pub(crate) pending: Pending,
    /// Declaring line of every user type.
    pub(crate) locations: HashMap<String, Location>,
    urls: HashSet<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    None,
    Struct(String),
    Enum(String),
    Section(Section),
    Url,
}

/// Per-source line state.
#[derive(Debug)]
struct ParserState<'a> {
    file: &'a str,
    line: usize,
    action: Option<String>,
    scope: Scope,
    /// Section names already opened in the current action, `url` included.
    sections: HashSet<&'static str>,
    doc: Vec<String>,
    doc_group: Option<String>,
}

impl ParserState<'_> {
    fn location(&self) -> Location {
        Location { file: self.file.to_string(), line: self.line }
    }

    fn take_doc(&mut self) -> Vec<String> {
        std::mem::take(&mut self.doc)
    }

    /// Leaving any action: a top-level declaration follows.
    fn close_action(&mut self) {
        self.action = None;
        self.sections.clear();
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LINE DISPATCH
// ————————————————————————————————————————————————————————————————————————————

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors collected so far; `finalize` adds its own.
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Parse one source into the registry. Never fails; see [`Parser::finalize`].
    pub fn parse(&mut self, text: &str, filename: &str) {
        let mut state = ParserState {
            file: filename,
            line: 0,
            action: None,
            scope: Scope::None,
            sections: HashSet::new(),
            doc: Vec::new(),
            doc_group: None,
        };
        let errors_before = self.errors.len();

        let mut joined = String::new();
        let mut lines = 0;
        for (ix, physical) in text.lines().enumerate() {
            state.line = ix + 1;
            lines += 1;
            if let Some(m) = RE_CONTINUATION.find(physical) {
                joined.push_str(&physical[..m.start()]);
                continue;
            }
            joined.push_str(physical);
            let logical = std::mem::take(&mut joined);
            self.parse_line(&mut state, &logical);
        }
        if !joined.is_empty() {
            self.parse_line(&mut state, &joined);
        }

        tracing::debug!(
            file = filename,
            lines,
            types = self.types.len(),
            actions = self.actions.len(),
            errors = self.errors.len() - errors_before,
            "parsed schema source"
        );
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.errors.push(CompileError { file: location.file, line: location.line, message: message.into() });
    }

    fn parse_line(&mut self, state: &mut ParserState<'_>, line: &str) {
        if let Some(caps) = RE_COMMENT.captures(line) {
            if let Some(doc) = caps.name("doc") {
                let doc = doc.as_str();
                state.doc.push(doc.strip_prefix(' ').unwrap_or(doc).trim_end().to_string());
            }
            return;
        }

        if let Some(caps) = RE_GROUP.captures(line) {
            state.doc_group = caps.name("group").map(|m| m.as_str().to_string());
            return;
        }

        if let Some(caps) = RE_ACTION.captures(line) {
            self.open_action(state, &caps["id"]);
            return;
        }

        if let Some(caps) = RE_DEFINITION.captures(line) {
            let bases = split_bases(caps.name("bases").map(|m| m.as_str()));
            self.open_definition(state, &caps["kind"], &caps["id"], bases);
            return;
        }

        let in_enum = matches!(state.scope, Scope::Enum(_));
        if let Some(caps) = RE_SECTION.captures(line) {
            if state.action.is_some() {
                let section = Section::parse(&caps["section"]);
                let bases = split_bases(caps.name("bases").map(|m| m.as_str()));
                if let Some(section) = section {
                    self.open_section(state, section, bases);
                }
                return;
            }
            if !in_enum {
                self.error(state.location(), "Section outside of action scope");
                return;
            }
        }

        if RE_URL_SECTION.is_match(line) {
            if state.action.is_some() {
                state.doc.clear();
                if !state.sections.insert("url") {
                    self.error(state.location(), "Redefinition of section 'url'");
                }
                state.scope = Scope::Url;
                return;
            }
            if !in_enum {
                self.error(state.location(), "Section outside of action scope");
                return;
            }
        }

        if state.scope == Scope::Url {
            if let Some(caps) = RE_URL.captures(line) {
                let method = caps.name("method").map(|m| m.as_str());
                let path = caps.name("path").map(|m| m.as_str());
                self.add_url(state, method, path);
                return;
            }
            if line.starts_with(char::is_whitespace) {
                self.error(state.location(), format!("Invalid URL '{}'", line.trim()));
                return;
            }
        }

        if let Some(caps) = RE_VALUE.captures(line) {
            let id = &caps["id"];
            let value = id.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(id);
            self.add_value(state, value);
            return;
        }

        if let Some(caps) = RE_MEMBER.captures(line) {
            match TypeExpr::from_captures(&caps) {
                Ok(expr) => {
                    let optional = caps.name("optional").is_some();
                    let nullable = caps.name("nullable").is_some();
                    self.add_member(state, &caps["id"], expr, optional, nullable);
                }
                Err(bad) => self.error(state.location(), format!("Invalid attribute '{bad}'")),
            }
            return;
        }

        if RE_URL.is_match(line) {
            self.error(state.location(), "URL outside of url section");
            return;
        }

        if let Some(caps) = RE_TYPEDEF.captures(line) {
            match TypeExpr::from_captures(&caps) {
                Ok(expr) => self.add_typedef(state, &caps["id"], expr),
                Err(bad) => self.error(state.location(), format!("Invalid attribute '{bad}'")),
            }
            return;
        }

        self.error(state.location(), "Syntax error");
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

impl Parser {
    /// Builtin keywords and already-declared names are taken.
    fn claim_type_name(&mut self, state: &ParserState<'_>, name: &str) {
        if Type::builtin(name).is_some() || self.types.contains(name) {
            self.error(state.location(), format!("Redefinition of type '{name}'"));
        }
        self.locations.insert(name.to_string(), state.location());
    }

    fn open_action(&mut self, state: &mut ParserState<'_>, name: &str) {
        if self.actions.contains_key(name) {
            self.error(state.location(), format!("Redefinition of action '{name}'"));
        }
        let mut action = Action::new(name);
        action.doc = state.take_doc();
        action.doc_group = state.doc_group.clone();
        self.actions.insert(name.to_string(), action);

        state.close_action();
        state.action = Some(name.to_string());
        state.scope = Scope::None;
    }

    fn open_definition(&mut self, state: &mut ParserState<'_>, kind: &str, name: &str, bases: Vec<String>) {
        self.claim_type_name(state, name);
        let doc = state.take_doc();
        let doc_group = state.doc_group.clone();
        let user_type = if kind == "enum" {
            state.scope = Scope::Enum(name.to_string());
            UserType::Enum(EnumType { bases, doc, doc_group, ..EnumType::new(name) })
        } else {
            state.scope = Scope::Struct(name.to_string());
            UserType::Struct(StructType { bases, doc, doc_group, ..StructType::new(name, kind == "union") })
        };
        self.types.insert(user_type);
        state.close_action();
    }

    fn open_section(&mut self, state: &mut ParserState<'_>, section: Section, bases: Vec<String>) {
        state.doc.clear();
        if !state.sections.insert(section.name()) {
            self.error(state.location(), format!("Redefinition of section '{}'", section.name()));
        }
        state.scope = Scope::Section(section);

        let Some(action) = state.action.as_ref().and_then(|name| self.actions.get_mut(name)) else {
            return;
        };
        if !bases.is_empty() {
            self.pending.section_bases.push((action.name.clone(), section, state.location()));
        }
        match action.section_struct_mut(section) {
            Some(st) => st.bases.extend(bases),
            None => action.errors.bases.extend(bases),
        }
    }

    fn add_url(&mut self, state: &mut ParserState<'_>, method: Option<&str>, path: Option<&str>) {
        state.doc.clear();
        let Some(action) = state.action.as_ref().and_then(|name| self.actions.get_mut(name)) else {
            return;
        };
        let url = ActionUrl {
            method: method.filter(|m| *m != "*").map(str::to_uppercase),
            path: path.map(str::to_string),
        };
        let key = url.route_key(&action.name);
        action.urls.push(url);
        if !self.urls.insert(key.clone()) {
            let (method, path) = key;
            self.error(state.location(), format!("Duplicate URL: {method} {path}"));
        }
    }

    fn add_value(&mut self, state: &mut ParserState<'_>, value: &str) {
        let doc = state.take_doc();
        let target = match &state.scope {
            Scope::Enum(name) => match self.types.get_mut(name) {
                Some(UserType::Enum(en)) => Some(en),
                _ => None,
            },
            Scope::Section(Section::Errors) => {
                state.action.as_ref().and_then(|name| self.actions.get_mut(name)).map(|a| &mut a.errors)
            }
            _ => None,
        };
        let Some(en) = target else {
            self.error(state.location(), "Enumeration value outside of enum scope");
            return;
        };
        let duplicate = en.values.iter().any(|v| v.value == value);
        en.values.push(EnumValue { value: value.to_string(), doc });
        if duplicate {
            self.error(state.location(), format!("Redefinition of enumeration value '{value}'"));
        }
    }

    fn add_member(&mut self, state: &mut ParserState<'_>, name: &str, expr: TypeExpr, optional: bool, nullable: bool) {
        let doc = state.take_doc();
        let target = match &state.scope {
            Scope::Struct(type_name) => match self.types.get_mut(type_name) {
                Some(UserType::Struct(st)) => Some(st),
                _ => None,
            },
            Scope::Section(section) => state
                .action
                .as_ref()
                .and_then(|a| self.actions.get_mut(a))
                .and_then(|a| a.section_struct_mut(*section)),
            _ => None,
        };
        let Some(st) = target else {
            self.error(state.location(), "Member definition outside of struct scope");
            return;
        };

        let duplicate = st.members.iter().any(|m| m.name == name);
        st.members.push(StructMember {
            name: name.to_string(),
            ty: expr.ty.clone(),
            optional,
            nullable,
            constraints: expr.constraints.clone(),
            doc,
        });
        if duplicate {
            self.error(state.location(), format!("Redefinition of member '{name}'"));
        }
        self.defer_checks(state, expr);
    }

    fn add_typedef(&mut self, state: &mut ParserState<'_>, name: &str, expr: TypeExpr) {
        state.close_action();
        state.scope = Scope::None;
        self.claim_type_name(state, name);
        self.types.insert(UserType::Typedef(TypedefType {
            name: name.to_string(),
            target: expr.ty.clone(),
            constraints: expr.constraints.clone(),
            doc: state.take_doc(),
            doc_group: state.doc_group.clone(),
        }));
        self.defer_checks(state, expr);
    }

    fn defer_checks(&mut self, state: &ParserState<'_>, expr: TypeExpr) {
        let location = state.location();
        for name in expr.refs {
            self.pending.refs.push((name, location.clone()));
        }
        for (ty, constraints) in expr.attr_checks {
            self.pending.attrs.push((ty, constraints, location.clone()));
        }
        if let Some(key) = expr.dict_key {
            self.pending.dict_keys.push((key, location));
        }
    }
}
