//! Log parsing and classification primitives.
//!
//! Everything here is pure and reentrant: functions take text or a
//! read-only [`FileSet`](crate::files::FileSet) and return typed values.

pub mod convergence;
pub mod error_files;
pub mod fields;
pub mod similarity;
pub mod warnings;

pub use convergence::ConvergenceChecker;
pub use error_files::{scan as scan_error_files, ErrorScan};
pub use fields::{
    extract, extract_all, extract_last_iteration, Anchor, ExtractionRule, LastIteration,
    LogField, ValueKind,
};
pub use similarity::similarity;
pub use warnings::{MatchPolicy, WarningCatalog, WarningClassifier, WarningTemplate};
