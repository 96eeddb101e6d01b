//! Action model: the typed signature of one API operation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::types::{EnumType, StructType};

static RE_PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(?P<name>[A-Za-z_]\w*)\}").expect("path param regex"));

/// One `url` line of an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ActionUrl {
    /// `None` for the `*` wildcard.
    pub method: Option<String>,
    /// `None` means the default `/<action name>`.
    pub path: Option<String>,
}

impl ActionUrl {
    /// Names of the `{name}` segments in the path, in order.
    pub fn path_params(&self) -> Vec<&str> {
        match &self.path {
            Some(path) => RE_PATH_PARAM
                .captures_iter(path)
                .filter_map(|caps| caps.name("name"))
                .map(|m| m.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// `(METHOD|*, path)` with the default path filled in; used to detect duplicates.
    pub(crate) fn route_key(&self, action: &str) -> (String, String) {
        let method = self.method.clone().unwrap_or_else(|| "*".to_string());
        let path = self.path.clone().unwrap_or_else(|| format!("/{action}"));
        (method, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<ActionUrl>,
    pub path: StructType,
    pub query: StructType,
    pub input: StructType,
    pub output: StructType,
    pub errors: EnumType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub doc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_group: Option<String>,
}

/// A section header inside an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Path,
    Query,
    Input,
    Output,
    Errors,
}

impl Section {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "path" => Some(Section::Path),
            "query" => Some(Section::Query),
            "input" => Some(Section::Input),
            "output" => Some(Section::Output),
            "errors" => Some(Section::Errors),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Section::Path => "path",
            Section::Query => "query",
            Section::Input => "input",
            Section::Output => "output",
            Section::Errors => "errors",
        }
    }
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: StructType::new(format!("{name}_path"), false),
            query: StructType::new(format!("{name}_query"), false),
            input: StructType::new(format!("{name}_input"), false),
            output: StructType::new(format!("{name}_output"), false),
            errors: EnumType::new(format!("{name}_error")),
            urls: Vec::new(),
            doc: Vec::new(),
            doc_group: None,
            name,
        }
    }

    /// The struct behind a non-`errors` section.
    pub fn section_struct(&self, section: Section) -> Option<&StructType> {
        match section {
            Section::Path => Some(&self.path),
            Section::Query => Some(&self.query),
            Section::Input => Some(&self.input),
            Section::Output => Some(&self.output),
            Section::Errors => None,
        }
    }

    pub(crate) fn section_struct_mut(&mut self, section: Section) -> Option<&mut StructType> {
        match section {
            Section::Path => Some(&mut self.path),
            Section::Query => Some(&mut self.query),
            Section::Input => Some(&mut self.input),
            Section::Output => Some(&mut self.output),
            Section::Errors => None,
        }
    }

    /// path, query, input, output
    pub fn structs(&self) -> [&StructType; 4] {
        [&self.path, &self.query, &self.input, &self.output]
    }
}
