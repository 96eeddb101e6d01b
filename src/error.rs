//! Compile-time diagnostics.

use std::fmt;

use thiserror::Error;

/// One diagnostic, located at the (last physical) line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: error: {}", self.file, self.line, self.message)
    }
}

/// Every diagnostic of a parse + finalize cycle, in detection order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_lines(.errors))]
pub struct SpecErrors {
    pub errors: Vec<CompileError>,
}

fn render_lines(errors: &[CompileError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

impl SpecErrors {
    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
