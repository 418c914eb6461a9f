//! Stage outcome and category enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering of outcome severities: `Error > Warning > Ok`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing to report.
    #[default]
    Ok,
    /// Recoverable; the stage result is still usable.
    Warning,
    /// Fatal for the stage.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Closed set of recoverable conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    /// Large QTL-B value in a band.
    QtlB,
    /// `VK-COUL` not well converged.
    VkCoul,
    /// Charge integration mismatch.
    Integration,
    /// The SCF cycle never reached its convergence criteria.
    NotConverged,
    /// Core charge leaking out of the muffin-tin sphere.
    CoreLeakage,
    /// A warning line that matched no known template.
    Other,
}

impl WarningKind {
    /// Returns the tag used in records and diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QtlB => "QTL_B",
            Self::VkCoul => "VK_COUL",
            Self::Integration => "INTEGRATION",
            Self::NotConverged => "NOT_CONVERGED",
            Self::CoreLeakage => "CORE_LEAKAGE",
            Self::Other => "OTHER",
        }
    }

    /// Returns the base exit code for this warning.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::QtlB => 302,
            Self::VkCoul => 303,
            Self::Integration => 304,
            Self::NotConverged => 305,
            Self::CoreLeakage => 306,
            Self::Other => 309,
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of stage-terminal conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Expected output files were not retrieved.
    MissingOutput,
    /// A solver error file had content.
    SolverError,
    /// A mandatory field never appeared in the logs.
    FieldNotFound,
    /// A marker line carried a malformed value.
    ParseError,
    /// Initialization did not report success.
    InitFailed,
    /// The execution collaborator crashed instead of completing.
    ExecutionExcepted,
}

impl ErrorKind {
    /// Returns the tag used in records and diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOutput => "MISSING_OUTPUT",
            Self::SolverError => "SOLVER_ERROR",
            Self::FieldNotFound => "FIELD_NOT_FOUND",
            Self::ParseError => "PARSE_ERROR",
            Self::InitFailed => "INIT_FAILED",
            Self::ExecutionExcepted => "EXECUTION_EXCEPTED",
        }
    }

    /// Returns the exit code for this error.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::MissingOutput => 401,
            Self::SolverError => 402,
            Self::FieldNotFound => 403,
            Self::ParseError => 404,
            Self::InitFailed => 405,
            Self::ExecutionExcepted => 410,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Clean.
    #[default]
    Ok,
    /// Usable result with a recoverable condition.
    Warning(WarningKind),
    /// Stage-terminal failure.
    Error(ErrorKind),
}

impl StageOutcome {
    /// Returns the severity of this outcome.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Ok => Severity::Ok,
            Self::Warning(_) => Severity::Warning,
            Self::Error(_) => Severity::Error,
        }
    }

    /// Returns the more severe of `self` and `other`.
    ///
    /// On equal severity the existing outcome is kept, so the first cause
    /// recorded for a stage is the one reported.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Folds outcomes with [`escalate`](Self::escalate), starting from `Ok`.
    #[must_use]
    pub fn worst<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        outcomes.into_iter().fold(Self::Ok, Self::escalate)
    }

    /// Returns true if the outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the outcome is a warning.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    /// Returns true if the outcome is an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns true if the stage result can be used downstream.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !self.is_error()
    }

    /// Returns the numeric exit code.
    ///
    /// `warning_offset` shifts warning codes for refinement stages of a
    /// precision cascade (`+10` per stage); error codes are not shifted.
    #[must_use]
    pub const fn exit_code(&self, warning_offset: u16) -> u16 {
        match self {
            Self::Ok => 0,
            Self::Warning(kind) => kind.code() + warning_offset,
            Self::Error(kind) => kind.code(),
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning(kind) => write!(f, "warning({kind})"),
            Self::Error(kind) => write!(f, "error({kind})"),
        }
    }
}

impl From<WarningKind> for StageOutcome {
    fn from(kind: WarningKind) -> Self {
        Self::Warning(kind)
    }
}

impl From<ErrorKind> for StageOutcome {
    fn from(kind: ErrorKind) -> Self {
        Self::Error(kind)
    }
}

/// Aggregate classification of a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every stage finished cleanly.
    #[default]
    Clean,
    /// At least one stage warned, none failed.
    Warning,
    /// At least one stage or volume instance failed.
    Error,
}

impl PipelineOutcome {
    /// Derives the pipeline outcome from stage outcomes.
    #[must_use]
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = StageOutcome>,
    {
        match StageOutcome::worst(outcomes).severity() {
            Severity::Ok => Self::Clean,
            Severity::Warning => Self::Warning,
            Severity::Error => Self::Error,
        }
    }

    /// Returns the numeric exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u16 {
        match self {
            Self::Clean => 0,
            Self::Warning => 300,
            Self::Error => 400,
        }
    }

    /// Returns true if the run produced usable results.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Error)
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_dominates_warning() {
        let outcome = StageOutcome::Warning(WarningKind::QtlB)
            .escalate(StageOutcome::Error(ErrorKind::FieldNotFound));
        assert_eq!(outcome, StageOutcome::Error(ErrorKind::FieldNotFound));

        let outcome = StageOutcome::Error(ErrorKind::SolverError)
            .escalate(StageOutcome::Warning(WarningKind::Other));
        assert_eq!(outcome, StageOutcome::Error(ErrorKind::SolverError));
    }

    #[test]
    fn test_escalate_keeps_first_on_tie() {
        let outcome = StageOutcome::Warning(WarningKind::NotConverged)
            .escalate(StageOutcome::Warning(WarningKind::QtlB));
        assert_eq!(outcome, StageOutcome::Warning(WarningKind::NotConverged));
    }

    #[test]
    fn test_worst() {
        let outcome = StageOutcome::worst([
            StageOutcome::Ok,
            StageOutcome::Warning(WarningKind::VkCoul),
            StageOutcome::Ok,
        ]);
        assert_eq!(outcome, StageOutcome::Warning(WarningKind::VkCoul));
        assert_eq!(StageOutcome::worst([]), StageOutcome::Ok);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(StageOutcome::Ok.exit_code(0), 0);
        assert_eq!(StageOutcome::Warning(WarningKind::QtlB).exit_code(0), 302);
        assert_eq!(StageOutcome::Warning(WarningKind::QtlB).exit_code(20), 322);
        assert_eq!(StageOutcome::Error(ErrorKind::MissingOutput).exit_code(20), 401);
        assert_eq!(PipelineOutcome::Warning.exit_code(), 300);
        assert_eq!(PipelineOutcome::Error.exit_code(), 400);
    }

    #[test]
    fn test_pipeline_outcome_from_outcomes() {
        let outcome = PipelineOutcome::from_outcomes([
            StageOutcome::Ok,
            StageOutcome::Warning(WarningKind::Other),
            StageOutcome::Error(ErrorKind::SolverError),
        ]);
        assert_eq!(outcome, PipelineOutcome::Error);
        assert_eq!(
            PipelineOutcome::from_outcomes([StageOutcome::Ok]),
            PipelineOutcome::Clean
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(StageOutcome::Ok.to_string(), "ok");
        assert_eq!(
            StageOutcome::Warning(WarningKind::VkCoul).to_string(),
            "warning(VK_COUL)"
        );
        assert_eq!(
            StageOutcome::Error(ErrorKind::MissingOutput).to_string(),
            "error(MISSING_OUTPUT)"
        );
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&StageOutcome::Warning(WarningKind::QtlB)).unwrap();
        assert_eq!(json, r#"{"status":"warning","kind":"QTL_B"}"#);

        let back: StageOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageOutcome::Warning(WarningKind::QtlB));

        let json = serde_json::to_string(&StageOutcome::Ok).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }
}
