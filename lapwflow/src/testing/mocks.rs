//! Test doubles for the execution collaborator and file sets.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ExecutionError, FileSetError};
use crate::execution::{Completion, ExecutionHandle, Executor, StepKind, StepRequest};
use crate::files::{FileSet, MemoryFileSet};

type Responder = Arc<dyn Fn(&StepRequest) -> ScriptedResponse + Send + Sync>;

/// What a [`ScriptedExecutor`] answers for one step.
#[derive(Clone)]
pub enum ScriptedResponse {
    /// The step completes and these files are retrieved.
    Complete(MemoryFileSet),
    /// The step finishes in the excepted state.
    Except(String),
    /// The executor itself fails while waiting.
    Fail(String),
    /// The answer is computed from the request.
    Respond(Responder),
}

impl ScriptedResponse {
    /// Completes with `files`.
    #[must_use]
    pub fn complete(files: MemoryFileSet) -> Self {
        Self::Complete(files)
    }

    /// Ends the step excepted.
    #[must_use]
    pub fn except(reason: impl Into<String>) -> Self {
        Self::Except(reason.into())
    }

    /// Fails the wait with a transport error.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    /// Computes the answer from the request.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&StepRequest) -> Self + Send + Sync + 'static,
    {
        Self::Respond(Arc::new(f))
    }

    fn resolve(&self, request: &StepRequest) -> Result<Completion, ExecutionError> {
        match self {
            Self::Complete(files) => Ok(Completion::completed(files.clone())),
            Self::Except(reason) => Ok(Completion::excepted(reason.clone())),
            Self::Fail(message) => Err(ExecutionError::new(request.label.clone(), message.clone())),
            Self::Respond(f) => match f(request) {
                Self::Respond(_) => Err(ExecutionError::new(
                    request.label.clone(),
                    "scripted responder returned another responder",
                )),
                answer => answer.resolve(request),
            },
        }
    }
}

impl fmt::Debug for ScriptedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(files) => f.debug_tuple("Complete").field(&files.names()).finish(),
            Self::Except(reason) => f.debug_tuple("Except").field(reason).finish(),
            Self::Fail(message) => f.debug_tuple("Fail").field(message).finish(),
            Self::Respond(_) => f.write_str("Respond(..)"),
        }
    }
}

/// An [`Executor`] answering from a script instead of running programs.
///
/// Responses registered for a step label take precedence over responses
/// registered for its [`StepKind`]. Every submitted request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    by_label: HashMap<String, ScriptedResponse>,
    by_kind: HashMap<StepKind, ScriptedResponse>,
    submitted: Mutex<Vec<StepRequest>>,
    pending: Mutex<HashMap<Uuid, StepRequest>>,
}

impl ScriptedExecutor {
    /// Creates an executor with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every step of `kind` with `response`.
    #[must_use]
    pub fn on(mut self, kind: StepKind, response: ScriptedResponse) -> Self {
        self.by_kind.insert(kind, response);
        self
    }

    /// Answers the step labelled `label` with `response`.
    #[must_use]
    pub fn on_label(mut self, label: impl Into<String>, response: ScriptedResponse) -> Self {
        self.by_label.insert(label.into(), response);
        self
    }

    /// Returns every submitted request, in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<StepRequest> {
        self.submitted.lock().clone()
    }

    /// Returns the labels of every submitted request.
    #[must_use]
    pub fn submitted_labels(&self) -> Vec<String> {
        self.submitted.lock().iter().map(|r| r.label.clone()).collect()
    }

    fn response_for(&self, request: &StepRequest) -> Option<&ScriptedResponse> {
        self.by_label
            .get(&request.label)
            .or_else(|| self.by_kind.get(&request.kind))
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn submit(&self, request: StepRequest) -> Result<ExecutionHandle, ExecutionError> {
        let handle = ExecutionHandle::for_request(&request);
        self.submitted.lock().push(request.clone());
        self.pending.lock().insert(handle.id, request);
        Ok(handle)
    }

    async fn wait(&self, handle: ExecutionHandle) -> Result<Completion, ExecutionError> {
        let request = self.pending.lock().remove(&handle.id).ok_or_else(|| {
            ExecutionError::new(handle.label.clone(), "unknown handle")
                .with_handle_id(handle.id.to_string())
        })?;
        match self.response_for(&request) {
            Some(response) => response.resolve(&request),
            None => Err(ExecutionError::new(
                request.label.clone(),
                format!("no scripted response for {}", request.kind),
            )),
        }
    }
}

/// A [`FileSet`] wrapper recording every file read.
#[derive(Debug)]
pub struct RecordingFileSet {
    inner: MemoryFileSet,
    reads: Mutex<Vec<String>>,
}

impl RecordingFileSet {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: MemoryFileSet) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Returns the names read so far, in order.
    #[must_use]
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }
}

impl FileSet for RecordingFileSet {
    fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn read(&self, name: &str) -> Result<Cow<'_, str>, FileSetError> {
        self.reads.lock().push(name.to_string());
        self.inner.read(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::CompletionStatus;

    #[tokio::test]
    async fn test_label_takes_precedence_over_kind() {
        let executor = ScriptedExecutor::new()
            .on(StepKind::SolveAtVolume, ScriptedResponse::except("by kind"))
            .on_label("solve_at_volume:a", ScriptedResponse::complete(MemoryFileSet::new()));

        let a = StepRequest::new(StepKind::SolveAtVolume).with_label("solve_at_volume:a");
        let b = StepRequest::new(StepKind::SolveAtVolume).with_label("solve_at_volume:b");
        let ha = executor.submit(a).await.unwrap();
        let hb = executor.submit(b).await.unwrap();

        assert_eq!(executor.wait(ha).await.unwrap().status, CompletionStatus::Completed);
        assert_eq!(executor.wait(hb).await.unwrap().excepted_reason(), Some("by kind"));
        assert_eq!(
            executor.submitted_labels(),
            vec!["solve_at_volume:a", "solve_at_volume:b"]
        );
    }

    #[tokio::test]
    async fn test_unscripted_and_failing_steps() {
        let executor =
            ScriptedExecutor::new().on(StepKind::Solve, ScriptedResponse::fail("queue down"));

        let handle = executor.submit(StepRequest::new(StepKind::Initialize)).await.unwrap();
        assert!(executor.wait(handle.clone()).await.is_err());
        // A handle can only be waited on once.
        assert!(executor.wait(handle).await.is_err());

        let handle = executor.submit(StepRequest::new(StepKind::Solve)).await.unwrap();
        let err = executor.wait(handle).await.unwrap_err();
        assert!(err.to_string().contains("queue down"));
    }

    #[test]
    fn test_recording_file_set_tracks_reads_only() {
        let files = RecordingFileSet::new(MemoryFileSet::new().with_file("case.scf", "x"));
        assert!(files.contains("case.scf"));
        assert_eq!(files.names(), vec!["case.scf"]);
        assert!(files.reads().is_empty());

        let _ = files.read("case.scf");
        let _ = files.read("missing");
        assert_eq!(files.reads(), vec!["case.scf", "missing"]);
    }
}
