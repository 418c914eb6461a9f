//! # Lapwflow
//!
//! Log parsing, outcome classification and workflow orchestration for
//! WIEN2k LAPW calculations.
//!
//! Lapwflow turns the files a WIEN2k program leaves behind into a typed
//! result record and a classified outcome, and drives multi-step workflows
//! on top of those outcomes:
//!
//! - **Field extraction**: marker-anchored extraction of energies, volumes,
//!   charges and meshes from `case.scf*` logs
//! - **Outcome classification**: error files, convergence and `:WAR` lines
//!   mapped to stable exit codes
//! - **Precision cascade**: aggregation of `run123_lapw` stages into one
//!   record with the worst outcome
//! - **Workflows**: SCF, SCF123 and equation-of-state scans over an
//!   [`Executor`](execution::Executor)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lapwflow::prelude::*;
//!
//! let orchestrator = PipelineOrchestrator::new(executor)
//!     .with_config(PipelineConfig::from_path("eos.json")?)
//!     .with_event_sink(Arc::new(LoggingEventSink::default()));
//!
//! let run = orchestrator.run_eos(&structure).await?;
//! std::process::exit(i32::from(run.exit_code()));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod events;
pub mod execution;
pub mod files;
pub mod observability;
pub mod parsing;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        Diagnostic, ErrorKind, FieldValue, PipelineOutcome, ResultMerger, ResultRecord,
        Severity, StageOutcome, WarningKind,
    };
    pub use crate::errors::{
        ConfigError, ExecutionError, FileSetError, LapwflowError, ParseError,
        RecordConflictError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::execution::{
        CliOptions, Completion, CompletionStatus, ExecutionHandle, Executor, StepKind,
        StepRequest,
    };
    pub use crate::files::{DirectoryFileSet, FileSet, MemoryFileSet};
    pub use crate::observability::{init_logging, LogFormat, SpanTimer};
    pub use crate::parsing::{
        ConvergenceChecker, LogField, MatchPolicy, WarningClassifier,
    };
    pub use crate::pipeline::{
        PipelineConfig, PipelineOrchestrator, PipelineRun, SolveMode, StepRecord, VolumePoint,
        Workflow,
    };
    pub use crate::stages::{
        PrecisionCascade, Precision, ResultParser, StageContract, StageReport,
        StageResultParser,
    };
}
