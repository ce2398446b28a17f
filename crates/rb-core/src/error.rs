// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the runbook server.
//!
//! Every error code follows the pattern `RB-X###` where `X` is the category
//! letter and `###` is a three-digit number:
//!
//! - **U** — Usage errors (malformed requests)
//! - **P** — Path safety errors
//! - **N** — Not-found errors
//! - **S** — Schema errors
//! - **V** — Validation errors
//! - **T** — Template errors
//! - **X** — Execution errors
//! - **I** — System / I/O errors

use std::collections::BTreeMap;
use std::fmt;

/// Enumeration of all RB error codes, organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A request was malformed (missing required field, mutually exclusive
    /// fields both set).
    UsageError,
    /// A path escaped the runbook root.
    PathEscape,
    /// A file, executable, or schema was not found.
    NotFound,
    /// A schema file failed validation at load time.
    SchemaInvalid,
    /// Values failed the schema's validation rules.
    ValidationFailed,
    /// A template failed to parse.
    TemplateParse,
    /// A template failed to execute (undefined variable, runtime error).
    TemplateExec,
    /// The registry has no executable for the given reference.
    ExecutableNotFound,
    /// A second concurrent execution of the same executable was rejected.
    Busy,
    /// The child process could not be spawned.
    SpawnFailed,
    /// An I/O operation failed.
    Io,
    /// An unexpected internal invariant was violated.
    Internal,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"RB-U001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UsageError => "RB-U001",
            Self::PathEscape => "RB-P001",
            Self::NotFound => "RB-N001",
            Self::SchemaInvalid => "RB-S001",
            Self::ValidationFailed => "RB-V001",
            Self::TemplateParse => "RB-T001",
            Self::TemplateExec => "RB-T002",
            Self::ExecutableNotFound => "RB-X001",
            Self::Busy => "RB-X002",
            Self::SpawnFailed => "RB-X003",
            Self::Io => "RB-I001",
            Self::Internal => "RB-I002",
        }
    }

    /// Human-readable category label.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UsageError => "usage",
            Self::PathEscape => "path",
            Self::NotFound => "not_found",
            Self::SchemaInvalid => "schema",
            Self::ValidationFailed => "validation",
            Self::TemplateParse | Self::TemplateExec => "template",
            Self::ExecutableNotFound | Self::Busy | Self::SpawnFailed => "execution",
            Self::Io | Self::Internal => "system",
        }
    }

    /// The HTTP status code the daemon maps this error to, per the wire
    /// contract. Kept here (rather than in `rb-daemon`) because it is a
    /// stable property of the error code itself.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UsageError | Self::PathEscape | Self::SchemaInvalid | Self::ValidationFailed => {
                400
            }
            Self::NotFound | Self::ExecutableNotFound => 404,
            Self::TemplateParse | Self::TemplateExec => 422,
            Self::Busy => 409,
            Self::SpawnFailed | Self::Io | Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Rich error value carrying an [`ErrorCode`], a safe-to-display message,
/// optional structured context, and an optional source error.
pub struct ErrorInfo {
    /// The catalog error code.
    pub code: ErrorCode,
    /// Human-readable message, safe to return to the client.
    pub message: String,
    /// Arbitrary key-value context (deterministic ordering).
    pub context: BTreeMap<String, String>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ErrorInfo {
    /// Start building an [`ErrorInfo`] for the given code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Add a key-value context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            let mut first = true;
            for (k, v) in &self.context {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
                first = false;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorInfo")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

impl std::error::Error for ErrorInfo {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_strings_are_stable() {
        assert_eq!(ErrorCode::PathEscape.code(), "RB-P001");
        assert_eq!(ErrorCode::Busy.code(), "RB-X002");
    }

    #[test]
    fn http_status_mapping_matches_spec() {
        assert_eq!(ErrorCode::PathEscape.http_status(), 400);
        assert_eq!(ErrorCode::ExecutableNotFound.http_status(), 404);
        assert_eq!(ErrorCode::TemplateExec.http_status(), 422);
        assert_eq!(ErrorCode::Busy.http_status(), 409);
        assert_eq!(ErrorCode::SpawnFailed.http_status(), 500);
    }

    #[test]
    fn display_includes_context() {
        let err = ErrorInfo::new(ErrorCode::NotFound, "file missing")
            .with_context("path", "foo/bar.md");
        let rendered = err.to_string();
        assert!(rendered.contains("RB-N001"));
        assert!(rendered.contains("path=foo/bar.md"));
    }
}
