//! The execution seam: submitting WIEN2k programs and awaiting their files.
//!
//! The orchestrator never runs programs itself. It builds [`StepRequest`]s
//! and hands them to an [`Executor`], which returns the retrieved files
//! once the step has finished.

mod options;

pub use options::{optimize_stdin, CliOptions};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ExecutionError;
use crate::files::MemoryFileSet;

/// The kinds of step a workflow submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// `x sgroup`: symmetrize the input structure.
    Symmetrize,
    /// `init_lapw`: generate the initial inputs.
    Initialize,
    /// `run_lapw`: single-precision SCF.
    Solve,
    /// `run123_lapw`: SCF through the precision cascade.
    SolveCascade,
    /// `x optimize`: write the volume-scaled structures.
    GenerateVolumes,
    /// `run_lapw` restarted from an extrapolated density at a new volume.
    SolveAtVolume,
}

impl StepKind {
    /// Returns the program invoked by this step.
    #[must_use]
    pub const fn program(&self) -> &'static str {
        match self {
            Self::Symmetrize => "x sgroup",
            Self::Initialize => "init_lapw",
            Self::Solve | Self::SolveAtVolume => "run_lapw",
            Self::SolveCascade => "run123_lapw",
            Self::GenerateVolumes => "x optimize",
        }
    }

    /// Returns the step label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Symmetrize => "symmetrize",
            Self::Initialize => "initialize",
            Self::Solve => "solve",
            Self::SolveCascade => "solve_cascade",
            Self::GenerateVolumes => "generate_volumes",
            Self::SolveAtVolume => "solve_at_volume",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run one program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRequest {
    /// Request id.
    pub id: Uuid,
    /// What to run.
    pub kind: StepKind,
    /// Human-readable label, unique within a run.
    pub label: String,
    /// Files placed in the working directory before the program starts.
    #[serde(skip)]
    pub inputs: MemoryFileSet,
    /// Command-line options.
    pub options: CliOptions,
    /// Text piped to the program's stdin.
    pub stdin: Option<String>,
    /// Id of the step whose working directory this step continues from.
    pub parent: Option<Uuid>,
    /// When the request was built.
    pub created_at: DateTime<Utc>,
}

impl StepRequest {
    /// Creates a request labelled after its kind.
    #[must_use]
    pub fn new(kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: kind.as_str().to_string(),
            inputs: MemoryFileSet::new(),
            options: CliOptions::new(),
            stdin: None,
            parent: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Adds an input file.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.inputs.insert(name, content);
        self
    }

    /// Sets the command-line options.
    #[must_use]
    pub fn with_options(mut self, options: CliOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the stdin payload.
    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Continues from the working directory of `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Returns the full command line.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let mut line: Vec<String> = self
            .kind
            .program()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        line.extend(self.options.to_args());
        line
    }
}

/// A submitted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionHandle {
    /// Handle id.
    pub id: Uuid,
    /// Id of the request this handle runs.
    pub request_id: Uuid,
    /// Step label.
    pub label: String,
    /// When the step was accepted.
    pub submitted_at: DateTime<Utc>,
}

impl ExecutionHandle {
    /// Creates a handle for `request`.
    #[must_use]
    pub fn for_request(request: &StepRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            label: request.label.clone(),
            submitted_at: Utc::now(),
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The program ran to completion; its files decide the outcome.
    Completed,
    /// The program was killed or never ran.
    Excepted {
        /// Reason reported by the executor.
        reason: String,
    },
}

/// A finished step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    /// How the step ended.
    pub status: CompletionStatus,
    /// Files retrieved from the working directory.
    #[serde(skip)]
    pub retrieved: MemoryFileSet,
    /// When the step finished.
    pub finished_at: DateTime<Utc>,
}

impl Completion {
    /// A completed step with its retrieved files.
    #[must_use]
    pub fn completed(retrieved: MemoryFileSet) -> Self {
        Self {
            status: CompletionStatus::Completed,
            retrieved,
            finished_at: Utc::now(),
        }
    }

    /// An excepted step.
    #[must_use]
    pub fn excepted(reason: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Excepted {
                reason: reason.into(),
            },
            retrieved: MemoryFileSet::new(),
            finished_at: Utc::now(),
        }
    }

    /// Returns the exception reason, if the step excepted.
    #[must_use]
    pub fn excepted_reason(&self) -> Option<&str> {
        match &self.status {
            CompletionStatus::Excepted { reason } => Some(reason),
            CompletionStatus::Completed => None,
        }
    }
}

/// Runs steps on behalf of the orchestrator.
///
/// `submit` and `wait` are the orchestrator's only suspension points.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submits a step.
    async fn submit(&self, request: StepRequest) -> Result<ExecutionHandle, ExecutionError>;

    /// Waits for a submitted step to finish.
    async fn wait(&self, handle: ExecutionHandle) -> Result<Completion, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_program_names() {
        assert_eq!(StepKind::Symmetrize.program(), "x sgroup");
        assert_eq!(StepKind::SolveCascade.program(), "run123_lapw");
        assert_eq!(StepKind::SolveAtVolume.program(), "run_lapw");
    }

    #[test]
    fn test_command_line() {
        let request = StepRequest::new(StepKind::GenerateVolumes)
            .with_options(CliOptions::new().with("-p", true));
        assert_eq!(request.command_line(), vec!["x", "optimize", "-p"]);
        assert_eq!(request.label, "generate_volumes");
    }

    #[test]
    fn test_completion_status() {
        let done = Completion::completed(MemoryFileSet::new().with_file("case.scf", ""));
        assert_eq!(done.excepted_reason(), None);
        let failed = Completion::excepted("walltime exceeded");
        assert_eq!(failed.excepted_reason(), Some("walltime exceeded"));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"]["status"], "excepted");
    }

    #[tokio::test]
    async fn test_mock_executor() {
        let mut executor = MockExecutor::new();
        executor
            .expect_submit()
            .times(1)
            .returning(|request| Ok(ExecutionHandle::for_request(&request)));
        executor
            .expect_wait()
            .times(1)
            .returning(|handle| {
                assert_eq!(handle.label, "solve");
                Ok(Completion::excepted("killed"))
            });

        let handle = executor.submit(StepRequest::new(StepKind::Solve)).await.unwrap();
        let completion = executor.wait(handle).await.unwrap();
        assert_eq!(completion.excepted_reason(), Some("killed"));
    }
}
