//! Error types for lapwflow.
//!
//! Library failures are split by the layer that raises them: text
//! extraction, file access, the execution collaborator, configuration and
//! result-record bookkeeping. Stage-level failures that are part of normal
//! operation (missing outputs, solver errors) are not errors here; they are
//! reported as [`StageOutcome`](crate::core::StageOutcome) values.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for lapwflow operations.
#[derive(Debug, Error)]
pub enum LapwflowError {
    /// A log line could not be converted to a typed value.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A retrieved file could not be read.
    #[error("{0}")]
    FileSet(#[from] FileSetError),

    /// The execution collaborator failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// Invalid pipeline configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A write-once record field was written twice.
    #[error("{0}")]
    RecordConflict(#[from] RecordConflictError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LapwflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised when a marker line was found but its value slice is malformed.
///
/// Format drift in solver output must surface, so this is never swallowed
/// by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {field} on line {line_number}: {reason} (line: {line:?})")]
pub struct ParseError {
    /// Name of the field being extracted.
    pub field: String,
    /// One-based line number within the scanned text.
    pub line_number: usize,
    /// The raw offending line.
    pub line: String,
    /// What went wrong.
    pub reason: String,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        line_number: usize,
        line: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            line_number,
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("field".to_string(), serde_json::json!(self.field));
        map.insert("line_number".to_string(), serde_json::json!(self.line_number));
        map.insert("line".to_string(), serde_json::json!(self.line));
        map.insert("reason".to_string(), serde_json::json!(self.reason));
        map
    }
}

/// Errors raised by a [`FileSet`](crate::files::FileSet).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileSetError {
    /// The requested name is not part of the set.
    #[error("file '{name}' is not in the retrieved set")]
    NotFound {
        /// The requested file name.
        name: String,
    },

    /// The file exists but could not be read as text.
    #[error("file '{name}' could not be read: {reason}")]
    Unreadable {
        /// The requested file name.
        name: String,
        /// Underlying cause.
        reason: String,
    },
}

impl FileSetError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an unreadable-file error.
    #[must_use]
    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreadable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the file name the error refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::NotFound { name } | Self::Unreadable { name, .. } => name,
        }
    }
}

/// Raised when the execution collaborator cannot submit or await a step.
///
/// This is a transport failure, distinct from a step that ran and
/// reported an excepted status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution of '{step}' failed: {message}")]
pub struct ExecutionError {
    /// Label of the step being executed.
    pub step: String,
    /// The error message.
    pub message: String,
    /// Handle id when the step had already been submitted.
    pub handle_id: Option<String>,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            handle_id: None,
        }
    }

    /// Sets the handle id.
    #[must_use]
    pub fn with_handle_id(mut self, id: impl Into<String>) -> Self {
        self.handle_id = Some(id.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("step".to_string(), serde_json::json!(self.step));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref id) = self.handle_id {
            map.insert("handle_id".to_string(), serde_json::json!(id));
        }
        map
    }
}

/// Raised when a pipeline configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    /// The error message.
    pub message: String,
    /// Offending configuration key, if known.
    pub key: Option<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Sets the offending key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Raised when a record field that is already set is inserted again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{key}' is already set in this record")]
pub struct RecordConflictError {
    /// The conflicting key.
    pub key: String,
}

impl RecordConflictError {
    /// Creates a new conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(":ENE", 12, ":ENE  : TOTAL ENERGY = abc", "invalid float");
        let msg = err.to_string();
        assert!(msg.contains(":ENE"));
        assert!(msg.contains("line 12"));
        assert!(msg.contains("invalid float"));
    }

    #[test]
    fn test_parse_error_to_dict() {
        let err = ParseError::new(":ITE", 3, ":ITEx", "missing '.'");
        let dict = err.to_dict();
        assert_eq!(dict.get("field"), Some(&serde_json::json!(":ITE")));
        assert_eq!(dict.get("line_number"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_file_set_error_name() {
        assert_eq!(FileSetError::not_found("case.scf").name(), "case.scf");
        let err = FileSetError::unreadable("case.scf2", "invalid utf-8");
        assert_eq!(err.name(), "case.scf2");
        assert!(err.to_string().contains("invalid utf-8"));
    }

    #[test]
    fn test_execution_error_to_dict() {
        let err = ExecutionError::new("run_lapw", "scheduler unreachable").with_handle_id("h-1");
        let dict = err.to_dict();
        assert_eq!(dict.get("handle_id"), Some(&serde_json::json!("h-1")));
    }

    #[test]
    fn test_error_conversion() {
        let err: LapwflowError = ConfigError::new("no deltas").with_key("volume_deltas").into();
        assert!(matches!(err, LapwflowError::Config(_)));

        let err: LapwflowError = RecordConflictError::new("EtotRyd").into();
        assert!(err.to_string().contains("EtotRyd"));
    }
}
