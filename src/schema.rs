//! A finalized, read-only schema: the type registry plus the actions.
//!
//! Nothing here mutates after [`crate::parser::Parser::finalize`] hands it
//! out, so a `Schema` can be shared across threads for concurrent validation.

use indexmap::IndexMap;
use serde::Serialize;

use crate::action::Action;
use crate::error::SpecErrors;
use crate::parser::Parser;
use crate::types::{Type, Types, UserType};
use crate::validate::{Mode, ValidationError, ValidationResult};
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub types: Types,
    pub actions: IndexMap<String, Action>,
}

impl Schema {
    /// Compile a single source text.
    pub fn parse(text: &str, filename: &str) -> Result<Self, SpecErrors> {
        let mut parser = Parser::new();
        parser.parse(text, filename);
        parser.finalize()
    }

    pub fn get_type(&self, name: &str) -> Option<&UserType> {
        self.types.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Validate against a type by name.
    ///
    /// Besides registry types, the synthesized action types (`<action>_input`,
    /// `<action>_error`, ...) are addressable too.
    pub fn validate<'v>(&self, name: &str, value: &'v Value, mode: Mode) -> ValidationResult<'v> {
        if let Some(builtin) = Type::builtin(name) {
            return builtin.validate(&self.types, value, mode, None);
        }
        if let Some(user_type) = self.types.get(name) {
            return user_type.validate(&self.types, value, mode, None);
        }
        for action in self.actions.values() {
            if let Some(st) = action.structs().into_iter().find(|st| st.name == name) {
                return st.validate(&self.types, value, mode, None);
            }
            if action.errors.name == name {
                return action.errors.validate(&self.types, value, None);
            }
        }
        Err(ValidationError::UnknownType { name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SOURCE: &str = "\
# A user
struct User
    string name
    optional int(>= 0) age

action get_user
    url
        GET /users/{name}
    path
        string name
    output (User)
    errors
        UserNotFound
";

    #[test]
    fn action_types_are_addressable() {
        let schema = Schema::parse(SOURCE, "users.chsl").unwrap();
        let input = Value::from(json!({"name": "ada"}));
        assert!(schema.validate("get_user_path", &input, Mode::JsonInput).is_ok());
        let output = Value::from(json!({"name": "ada", "age": 36}));
        assert!(schema.validate("get_user_output", &output, Mode::Immutable).is_ok());
        assert!(schema.validate("get_user_error", &Value::from("UserNotFound"), Mode::Immutable).is_ok());
        assert!(schema.validate("get_user_input", &Value::from(json!({})), Mode::JsonInput).is_ok());
    }

    #[test]
    fn compiled_schema_dumps_as_json() {
        let schema = Schema::parse(SOURCE, "users.chsl").unwrap();
        let dumped = serde_json::to_value(&schema).unwrap();
        assert_eq!(dumped["types"]["User"]["kind"], json!("struct"));
        assert_eq!(dumped["types"]["User"]["doc"], json!(["A user"]));
        assert_eq!(dumped["types"]["User"]["members"][1]["constraints"], json!({"gte": 0.0}));
        assert_eq!(dumped["actions"]["get_user"]["urls"][0]["path"], json!("/users/{name}"));
    }

    #[test]
    fn schema_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schema>();
    }
}
