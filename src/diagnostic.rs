//! Diagnostic type shared by full-compile and cursor-only reparse paths.
//!
//! Shaped like an LSP `Diagnostic` since that is what ultimately leaves the
//! process.

use serde::{Deserialize, Serialize};

use crate::symbol::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedDiagnostic {
    pub file: String,
    pub range: Location,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub range: Location,
    pub message: String,
    pub code: Option<String>,
    pub related: Vec<RelatedDiagnostic>,
    /// Suggested text edits a quick-fix could apply, kept as opaque
    /// replacement strings — structured `TextEdit` plumbing belongs to the
    /// transport layer this crate doesn't own.
    pub fixits: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: String, range: Location) -> Self {
        Self { severity: Severity::Error, range, message, code: None, related: Vec::new(), fixits: Vec::new() }
    }

    pub fn warning(message: String, range: Location) -> Self {
        Self { severity: Severity::Warning, range, message, code: None, related: Vec::new(), fixits: Vec::new() }
    }
}
