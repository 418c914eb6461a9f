//! Test assertions for stage reports, records and runs.

use crate::core::{FieldValue, PipelineOutcome, ResultRecord, StageOutcome};
use crate::pipeline::PipelineRun;
use crate::stages::StageReport;

/// Asserts the outcome of a stage report.
pub fn assert_outcome(report: &StageReport, expected: StageOutcome) {
    assert_eq!(
        report.outcome, expected,
        "Expected outcome {:?} for stage '{}', got {:?}. Diagnostics: {:?}",
        expected, report.stage, report.outcome, report.diagnostics
    );
}

/// Asserts that the report carries a diagnostic with `code`.
pub fn assert_has_diagnostic(report: &StageReport, code: &str) {
    assert!(
        report.diagnostics.iter().any(|d| d.code == code),
        "Expected a '{}' diagnostic, got codes {:?}",
        code,
        report.diagnostics.iter().map(|d| d.code.as_str()).collect::<Vec<_>>()
    );
}

/// Asserts that `key` holds a float within `1e-9` of `expected`.
pub fn assert_record_float(record: &ResultRecord, key: &str, expected: f64) {
    let actual = record.get(key).and_then(FieldValue::as_f64);
    match actual {
        Some(value) => assert!(
            (value - expected).abs() < 1e-9,
            "Expected {key} = {expected}, got {value}"
        ),
        None => panic!(
            "Expected float field '{key}', got {:?}. Keys: {:?}",
            record.get(key),
            record.keys().collect::<Vec<_>>()
        ),
    }
}

/// Asserts that `key` holds a list of `len` items.
pub fn assert_record_list_len(record: &ResultRecord, key: &str, len: usize) {
    let actual = record.get(key).and_then(FieldValue::as_list).map(<[FieldValue]>::len);
    assert_eq!(
        actual,
        Some(len),
        "Expected '{key}' to be a list of {len} items, got {:?}",
        record.get(key)
    );
}

/// Asserts the outcome and exit code of a pipeline run.
pub fn assert_pipeline_outcome(run: &PipelineRun, expected: PipelineOutcome) {
    assert_eq!(
        run.outcome,
        expected,
        "Expected pipeline outcome {:?}, got {:?}. Step outcomes: {:?}",
        expected,
        run.outcome,
        run.steps()
            .map(|s| (s.label.as_str(), s.outcome()))
            .collect::<Vec<_>>()
    );
    assert_eq!(run.exit_code(), expected.exit_code());
}
