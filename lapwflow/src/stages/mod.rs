//! Stage result parsers.
//!
//! Every pipeline step hands its retrieved files to a [`ResultParser`],
//! which turns them into a [`StageReport`]. The solve steps use contract
//! driven parsers; auxiliary steps have small dedicated ones.

pub mod auxiliary;
pub mod cascade;
pub mod contracts;
pub mod parser;

pub use auxiliary::{InitLapwParser, OptimizeParser, SgroupParser};
pub use cascade::{CascadeReport, CascadeStage, PrecisionCascade, StageDisposition};
pub use contracts::{FieldShape, FieldSpec, FileRequirement, Precision, ScanMode, StageContract};
pub use parser::{ParsePhase, StageReport, StageResultParser};

use crate::files::FileSet;
use std::fmt::Debug;

/// Trait for step result parsers.
///
/// Parsers are pure: the same files always give the same report.
pub trait ResultParser: Send + Sync + Debug {
    /// Returns the stage label used in reports.
    fn name(&self) -> &str;

    /// Parses one step's retrieved files.
    fn parse(&self, files: &dyn FileSet) -> StageReport;
}
