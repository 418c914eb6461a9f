//! Human-readable diagnostics attached to stage outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::{ErrorKind, Severity, WarningKind};

/// One operator-facing message explaining a warning or failure.
///
/// Errors carry the offending file names and raw content; warnings carry
/// the matched category and the original line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the condition.
    pub severity: Severity,
    /// Category tag, e.g. `SOLVER_ERROR` or `QTL_B`.
    pub code: String,
    /// Stage that raised the condition.
    pub stage: String,
    /// The message text.
    pub message: String,
    /// Files involved, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(stage: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: kind.as_str().to_string(),
            stage: stage.into(),
            message: message.into(),
            files: Vec::new(),
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(stage: impl Into<String>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: kind.as_str().to_string(),
            stage: stage.into(),
            message: message.into(),
            files: Vec::new(),
        }
    }

    /// Creates an informational diagnostic.
    #[must_use]
    pub fn note(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Ok,
            code: "NOTE".to_string(),
            stage: stage.into(),
            message: message.into(),
            files: Vec::new(),
        }
    }

    /// Sets the files involved.
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.stage, self.severity, self.code, self.message)
    }
}
