//! Testing utilities for lapwflow.
//!
//! This module provides:
//! - WIEN2k output fixtures
//! - A scripted executor and a read-recording file set
//! - Assertions for reports, records and runs

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_has_diagnostic, assert_outcome, assert_pipeline_outcome, assert_record_float,
    assert_record_list_len,
};
pub use fixtures::ScfFixture;
pub use mocks::{RecordingFileSet, ScriptedExecutor, ScriptedResponse};
