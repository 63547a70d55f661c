//! Compiler error taxonomy.
//!
//! Mirrors the shape of a hand-rolled logic-error enum (one variant per
//! failure category, `Display` doing the formatting, no `thiserror`): every
//! pass and builder stage returns `Result<T, CompileError>` and the driver
//! converts the first one into a single-line message and a process exit.

use std::fmt;

use crate::object::SourceLocation;

/// A single configure-time failure, tagged by the category a reader of the
/// error message (or a test asserting on it) needs to distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed DSL text; produced by the lexer/parser boundary.
    Parse {
        message: String,
        location: Option<SourceLocation>,
    },
    /// Wrong argument types or counts to a function/method call.
    InvalidArguments {
        function: String,
        message: String,
        location: Option<SourceLocation>,
    },
    /// General configuration failure: unknown language, missing required
    /// program, no toolchain for a language, malformed serialized test file,
    /// or an otherwise-unreachable invariant.
    Meson { message: String },
    /// A DSL construct the core does not lower (`foreach`, compound
    /// assignment, subscript expressions, chained method calls whose
    /// receiver is itself a function call).
    NotImplemented { feature: String },
}

impl CompileError {
    pub fn parse(message: impl Into<String>) -> Self {
        CompileError::Parse {
            message: message.into(),
            location: None,
        }
    }

    pub fn parse_at(message: impl Into<String>, location: SourceLocation) -> Self {
        CompileError::Parse {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn invalid_arguments(function: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::InvalidArguments {
            function: function.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn invalid_arguments_at(
        function: impl Into<String>,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        CompileError::InvalidArguments {
            function: function.into(),
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn meson(message: impl Into<String>) -> Self {
        CompileError::Meson {
            message: message.into(),
        }
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        CompileError::NotImplemented {
            feature: feature.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse { message, location } => match location {
                Some(loc) => write!(f, "{loc}: {message}"),
                None => write!(f, "{message}"),
            },
            CompileError::InvalidArguments {
                function,
                message,
                location,
            } => match location {
                Some(loc) => write!(f, "{loc}: invalid arguments to {function}(): {message}"),
                None => write!(f, "invalid arguments to {function}(): {message}"),
            },
            CompileError::Meson { message } => write!(f, "{message}"),
            CompileError::NotImplemented { feature } => {
                write!(f, "not implemented: {feature}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Meson {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_arguments_without_location() {
        let e = CompileError::invalid_arguments("executable", "expected a string");
        assert_eq!(
            e.to_string(),
            "invalid arguments to executable(): expected a string"
        );
    }

    #[test]
    fn display_parse_with_location() {
        let loc = SourceLocation::new("meson.build", 3);
        let e = CompileError::parse_at("unexpected token", loc);
        assert_eq!(e.to_string(), "meson.build:3: unexpected token");
    }

    #[test]
    fn not_implemented_names_the_feature() {
        let e = CompileError::not_implemented("foreach");
        assert_eq!(e.to_string(), "not implemented: foreach");
    }
}
