//! Whole-registry checks, run once every source has been parsed.

use std::collections::{HashMap, HashSet};

use crate::action::Section;
use crate::error::{CompileError, SpecErrors};
use crate::schema::Schema;
use crate::types::{BaseKind, EnumType, StructType, Type, Types, UserType};

use super::{Location, Parser};

struct Diagnostics {
    errors: Vec<CompileError>,
}

impl Diagnostics {
    fn push(&mut self, location: &Location, message: String) {
        self.errors.push(CompileError { file: location.file.clone(), line: location.line, message });
    }
}

impl Parser {
    /// Resolve references and check the registry as a whole.
    ///
    /// Fails with every error of every parsed source, parse-time errors first.
    pub fn finalize(self) -> Result<Schema, SpecErrors> {
        let Parser { types, actions, errors, pending, locations, .. } = self;
        let mut diag = Diagnostics { errors };
        let parse_errors = diag.errors.len();
        let fallback = Location { file: String::new(), line: 0 };
        let type_location = |name: &str| -> Location { locations.get(name).unwrap_or(&fallback).clone() };

        // ---- references ----
        for (name, location) in &pending.refs {
            if !types.contains(name) {
                diag.push(location, format!("Unknown type '{name}'"));
            }
        }

        // ---- bases ----
        for (name, user_type) in types.iter() {
            let location = type_location(name);
            match user_type {
                UserType::Struct(st) => check_struct_bases(&types, st, &location, &mut diag),
                UserType::Enum(en) => check_enum_bases(&types, en, &location, &mut diag),
                UserType::Typedef(_) => {}
            }
        }
        for (action_name, section, location) in &pending.section_bases {
            let Some(action) = actions.get(action_name) else { continue };
            match action.section_struct(*section) {
                Some(st) => check_struct_bases(&types, st, location, &mut diag),
                None => check_enum_bases(&types, &action.errors, location, &mut diag),
            }
        }

        // ---- circular bases, then inherited redefinitions ----
        let circular: HashSet<&str> = types
            .iter()
            .filter(|(name, _)| bases_reach(&types, name, name))
            .map(|(name, _)| name)
            .collect();
        for (name, _) in types.iter() {
            if circular.contains(name) {
                diag.push(&type_location(name), format!("Circular base type detected for type '{name}'"));
            }
        }
        for (name, user_type) in types.iter() {
            if circular.contains(name) {
                continue;
            }
            let location = type_location(name);
            match user_type {
                UserType::Struct(st) => check_inherited_members(&types, st, &location, &mut diag),
                UserType::Enum(en) => check_inherited_values(&types, en, &location, &mut diag),
                UserType::Typedef(_) => {}
            }
        }
        for (action_name, section, location) in &pending.section_bases {
            let Some(action) = actions.get(action_name) else { continue };
            match action.section_struct(*section) {
                Some(st) => check_inherited_members(&types, st, location, &mut diag),
                None if *section == Section::Errors => {
                    check_inherited_values(&types, &action.errors, location, &mut diag)
                }
                None => {}
            }
        }

        // ---- typedef chains ----
        for (name, user_type) in types.iter() {
            if matches!(user_type, UserType::Typedef(_)) && typedef_is_circular(&types, name) {
                diag.push(&type_location(name), format!("Circular typedef detected for type '{name}'"));
            }
        }

        // ---- attributes and dictionary keys ----
        for (ty, constraints, location) in &pending.attrs {
            let Some(kind) = types.base_kind(ty) else { continue };
            let (allow_value, allow_length) = kind.allowed_constraints();
            if let Some(bad) = constraints.first_disallowed(allow_value, allow_length) {
                diag.push(location, format!("Invalid attribute '{bad}'"));
            }
        }
        for (key, location) in &pending.dict_keys {
            match types.base_kind(key) {
                Some(BaseKind::String | BaseKind::Enum) | None => {}
                Some(_) => diag.push(location, format!("Invalid dictionary key type '{}'", key.type_name())),
            }
        }

        tracing::debug!(
            types = types.len(),
            actions = actions.len(),
            parse_errors,
            finalize_errors = diag.errors.len() - parse_errors,
            "finalized schema"
        );

        if diag.errors.is_empty() {
            Ok(Schema { types, actions })
        } else {
            Err(SpecErrors { errors: diag.errors })
        }
    }
}

/// Struct bases must be structs of the same union/non-union kind.
fn check_struct_bases(types: &Types, st: &StructType, location: &Location, diag: &mut Diagnostics) {
    for base in &st.bases {
        match types.get(base) {
            None => diag.push(location, format!("Unknown type '{base}'")),
            Some(UserType::Struct(base_st)) if base_st.union == st.union => {}
            Some(_) => diag.push(location, format!("Invalid struct base type '{base}'")),
        }
    }
}

fn check_enum_bases(types: &Types, en: &EnumType, location: &Location, diag: &mut Diagnostics) {
    for base in &en.bases {
        match types.get(base) {
            None => diag.push(location, format!("Unknown type '{base}'")),
            Some(UserType::Enum(_)) => {}
            Some(_) => diag.push(location, format!("Invalid enum base type '{base}'")),
        }
    }
}

/// True when `target` is reachable from `from` through base-type edges.
fn bases_reach(types: &Types, from: &str, target: &str) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = types.get(from).map(|t| t.bases().iter().map(String::as_str).collect()).unwrap_or_default();
    while let Some(name) = stack.pop() {
        if name == target {
            return true;
        }
        if !visited.insert(name) {
            continue;
        }
        if let Some(user_type) = types.get(name) {
            stack.extend(user_type.bases().iter().map(String::as_str));
        }
    }
    false
}

fn check_inherited_members(types: &Types, st: &StructType, location: &Location, diag: &mut Diagnostics) {
    let mut origin: HashMap<&str, &str> = HashMap::new();
    for base in &st.bases {
        let Some(base_st) = types.get_struct(base) else { continue };
        for member in types.struct_members(base_st) {
            if origin.insert(member.name.as_str(), base.as_str()).is_some() {
                diag.push(location, format!("Redefinition of member '{}' from base type '{base}'", member.name));
            }
        }
    }
    for member in &st.members {
        if let Some(base) = origin.get(member.name.as_str()) {
            diag.push(location, format!("Redefinition of member '{}' from base type '{base}'", member.name));
        }
    }
}

fn check_inherited_values(types: &Types, en: &EnumType, location: &Location, diag: &mut Diagnostics) {
    let mut origin: HashMap<&str, &str> = HashMap::new();
    for base in &en.bases {
        let Some(base_en) = types.get_enum(base) else { continue };
        for value in types.enum_values(base_en) {
            if origin.insert(value.value.as_str(), base.as_str()).is_some() {
                diag.push(
                    location,
                    format!("Redefinition of enumeration value '{}' from base type '{base}'", value.value),
                );
            }
        }
    }
    for value in &en.values {
        if let Some(base) = origin.get(value.value.as_str()) {
            diag.push(
                location,
                format!("Redefinition of enumeration value '{}' from base type '{base}'", value.value),
            );
        }
    }
}

fn typedef_is_circular(types: &Types, name: &str) -> bool {
    let mut seen = HashSet::new();
    let mut current = name;
    loop {
        let Some(UserType::Typedef(td)) = types.get(current) else { return false };
        let Type::User(next) = &td.target else { return false };
        if next == name {
            return true;
        }
        if !seen.insert(next.as_str()) {
            return false;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::Schema;
    use crate::types::UserType;
    use pretty_assertions::assert_eq;

    fn errors(src: &str) -> Vec<String> {
        match Schema::parse(src, "f.chsl") {
            Ok(_) => panic!("expected errors for:\n{src}"),
            Err(errors) => errors.errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn circular_bases_reported_for_each_type() {
        let errors = errors("struct A (B)\n    int a\nstruct B (A)\n    int b\n");
        assert_eq!(
            errors,
            [
                "f.chsl:1: error: Circular base type detected for type 'A'",
                "f.chsl:3: error: Circular base type detected for type 'B'",
            ]
        );
    }

    #[test]
    fn base_kind_mismatches() {
        let errors = errors(
            "struct S\n    int a\nunion U (S)\n    int b\nenum E (S)\n    x\nstruct T (E, Nope)\n    int c\n",
        );
        assert_eq!(
            errors,
            [
                "f.chsl:3: error: Invalid struct base type 'S'",
                "f.chsl:5: error: Invalid enum base type 'S'",
                "f.chsl:7: error: Invalid struct base type 'E'",
                "f.chsl:7: error: Unknown type 'Nope'",
            ]
        );
    }

    #[test]
    fn inherited_redefinitions() {
        let errors = errors(
            "struct A\n    int x\nstruct B (A)\n    string x\nenum E\n    a\nenum F (E)\n    a\nstruct C\n    int x\nstruct D (A, C)\n    int y\n",
        );
        assert_eq!(
            errors,
            [
                "f.chsl:3: error: Redefinition of member 'x' from base type 'A'",
                "f.chsl:7: error: Redefinition of enumeration value 'a' from base type 'E'",
                "f.chsl:11: error: Redefinition of member 'x' from base type 'C'",
            ]
        );
    }

    #[test]
    fn multiple_bases_expand_in_order() {
        let schema = Schema::parse(
            "struct A\n    int a\nstruct B (A)\n    int b\nstruct C\n    int c\nstruct D (B, C)\n    int d\n",
            "f.chsl",
        )
        .unwrap();
        let d = schema.types.get_struct("D").unwrap();
        let names: Vec<&str> = schema.types.struct_members(d).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn circular_typedefs() {
        let errors = errors("typedef Y X\ntypedef X Y\ntypedef X Z\n");
        assert_eq!(
            errors,
            [
                "f.chsl:1: error: Circular typedef detected for type 'X'",
                "f.chsl:2: error: Circular typedef detected for type 'Y'",
            ]
        );
    }

    #[test]
    fn attribute_applicability_follows_typedefs() {
        let errors = errors(
            "typedef string Name\nstruct S\n    Name(len < 5) ok\n    Name(> 5) bad\n    bool(len > 1) flag\n    int[](len > 1)[] nested_is_syntax\n",
        );
        assert_eq!(
            errors,
            [
                "f.chsl:6: error: Syntax error",
                "f.chsl:4: error: Invalid attribute '> 5'",
                "f.chsl:5: error: Invalid attribute 'len > 1'",
            ]
        );
    }

    #[test]
    fn element_and_container_attributes_checked_separately() {
        let schema = Schema::parse("typedef int(> 0)[len > 0] Ids\n", "f.chsl").unwrap();
        assert!(matches!(schema.get_type("Ids"), Some(UserType::Typedef(_))));
        let errors = errors("typedef int(len > 0)[> 0] Ids\n");
        assert_eq!(
            errors,
            ["f.chsl:1: error: Invalid attribute 'len > 0'", "f.chsl:1: error: Invalid attribute '> 0'"]
        );
    }

    #[test]
    fn dictionary_keys_must_be_string_like() {
        let schema = Schema::parse(
            "enum K\n    a\ntypedef string S\nstruct T\n    K : int{} by_enum\n    S : int{} by_alias\n",
            "f.chsl",
        );
        assert!(schema.is_ok());
        let errors = errors("struct T\n    int : string{} bad\n");
        assert_eq!(errors, ["f.chsl:2: error: Invalid dictionary key type 'int'"]);
    }

    #[test]
    fn section_bases() {
        let src = "\
struct Page
    optional int limit
union Choice
    int a
enum Common
    Unexpected
action list
  query (Page)
  input (Choice)
  errors (Common)
    NotFound
";
        let errors = errors(src);
        assert_eq!(errors, ["f.chsl:9: error: Invalid struct base type 'Choice'"]);

        let schema = Schema::parse(&src.replace("  input (Choice)\n", ""), "f.chsl").unwrap();
        let action = schema.action("list").unwrap();
        let values: Vec<&str> =
            schema.types.enum_values(&action.errors).iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, ["Unexpected", "NotFound"]);
        assert_eq!(schema.types.struct_members(&action.query)[0].name, "limit");
    }
}
