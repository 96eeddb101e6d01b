//! Schema language compiler and validation engine.
//!
//! ```text
//! source text ──Parser──▶ Schema { types, actions } ──validate(value, mode)──▶ normalized value
//! ```

pub mod action;
pub mod attr;
pub mod error;
pub mod parser;
pub mod query;
pub mod refs;
pub mod schema;
pub mod types;
pub mod validate;
pub mod value;

pub use action::{Action, ActionUrl};
pub use error::{CompileError, SpecErrors};
pub use parser::Parser;
pub use schema::Schema;
pub use types::{Type, Types, UserType};
pub use validate::{Mode, ValidationError};
pub use value::Value;
