//! Reference graph walker: every user type a type (or action) depends on.

use indexmap::IndexMap;

use crate::action::Action;
use crate::types::{StructType, Type, Types, UserType};

/// User types transitively referenced by `ty`, depth-first, in first-visit order.
///
/// A root that is itself a user type is excluded, even when it refers back to itself.
pub fn referenced_types<'t>(types: &'t Types, ty: &Type) -> IndexMap<&'t str, &'t UserType> {
    let mut walker = Walker { types, visited: IndexMap::new(), root: None };
    match ty {
        Type::User(name) => {
            if let Some((name, user_type)) = types.get_entry(name) {
                walker.root = Some(name);
                walker.expand(user_type);
            }
        }
        _ => walker.visit_type(ty),
    }
    walker.visited
}

/// Union of the references of the four action structs and the errors enum bases.
pub fn action_referenced_types<'t>(types: &'t Types, action: &'t Action) -> IndexMap<&'t str, &'t UserType> {
    let mut walker = Walker { types, visited: IndexMap::new(), root: None };
    for st in action.structs() {
        walker.visit_struct(st);
    }
    for base in &action.errors.bases {
        walker.visit_name(base);
    }
    walker.visited
}

struct Walker<'t> {
    types: &'t Types,
    visited: IndexMap<&'t str, &'t UserType>,
    root: Option<&'t str>,
}

impl<'t> Walker<'t> {
    fn visit_type(&mut self, ty: &Type) {
        match ty {
            Type::Array(array) => self.visit_type(&array.element),
            Type::Dict(dict) => {
                self.visit_type(&dict.key);
                self.visit_type(&dict.value);
            }
            Type::User(name) => self.visit_name(name),
            _ => {}
        }
    }

    fn visit_name(&mut self, name: &str) {
        let Some((name, user_type)) = self.types.get_entry(name) else {
            return;
        };
        if self.root == Some(name) || self.visited.contains_key(name) {
            return;
        }
        self.visited.insert(name, user_type);
        self.expand(user_type);
    }

    fn expand(&mut self, user_type: &'t UserType) {
        match user_type {
            UserType::Struct(st) => self.visit_struct(st),
            UserType::Enum(en) => {
                for base in &en.bases {
                    self.visit_name(base);
                }
            }
            UserType::Typedef(td) => self.visit_type(&td.target),
        }
    }

    fn visit_struct(&mut self, st: &'t StructType) {
        for base in &st.bases {
            self.visit_name(base);
        }
        for member in &st.members {
            self.visit_type(&member.ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "\
struct Node
    string name
    optional Node[] children
    Kind : Leaf{} leaves
    Id id
enum Kind
    a
struct Leaf (Base)
    Score score
struct Base
    int x
typedef float Score
typedef int Id
struct Unused
    int y
action act
  input (Base)
    Node node
  errors (Errors)
enum Errors
    Oops
";

    #[test]
    fn walks_members_bases_containers_and_typedefs() {
        let schema = Schema::parse(SOURCE, "r.chsl").unwrap();
        let refs = referenced_types(&schema.types, &Type::User("Node".into()));
        let names: Vec<&str> = refs.keys().copied().collect();
        assert_eq!(names, ["Kind", "Leaf", "Base", "Score", "Id"]);
    }

    #[test]
    fn builtin_roots_reference_nothing() {
        let schema = Schema::parse(SOURCE, "r.chsl").unwrap();
        assert!(referenced_types(&schema.types, &Type::Int).is_empty());
        let array = Type::array(Type::User("Leaf".into()), Default::default());
        let names: Vec<&str> = referenced_types(&schema.types, &array).keys().copied().collect();
        assert_eq!(names, ["Leaf", "Base", "Score"]);
    }

    #[test]
    fn action_roots() {
        let schema = Schema::parse(SOURCE, "r.chsl").unwrap();
        let action = schema.action("act").unwrap();
        let names: Vec<&str> = action_referenced_types(&schema.types, action).keys().copied().collect();
        assert_eq!(names, ["Base", "Node", "Kind", "Leaf", "Score", "Id", "Errors"]);
    }
}
