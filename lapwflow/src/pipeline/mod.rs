//! Workflow orchestration.
//!
//! This module provides:
//! - Pipeline configuration
//! - The typed run record
//! - The orchestrator driving SCF, SCF123 and EOS workflows

mod config;
mod orchestrator;
mod run;

pub use config::{PipelineConfig, SolveMode};
pub use orchestrator::{PipelineOrchestrator, STRUCT_FILE};
pub use run::{PipelineRun, StepRecord, VolumePoint, VolumeRun, Workflow};
