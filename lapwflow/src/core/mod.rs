//! Core domain model types for lapwflow.
//!
//! This module contains the types shared by every layer:
//! - Outcome, severity and category enums
//! - Write-once result records and their merger
//! - Operator diagnostics

mod diagnostic;
mod merge;
mod record;
mod status;

pub use diagnostic::Diagnostic;
pub use merge::ResultMerger;
pub use record::{FieldValue, ResultRecord};
pub use status::{ErrorKind, PipelineOutcome, Severity, StageOutcome, WarningKind};
