//! Per-stage result parsing.
//!
//! [`StageResultParser`] walks one stage's retrieved files through
//! `ExpectFiles → CheckErrors → ExtractFields → CheckConvergence →
//! Classified`. The first three phases may end the walk with an `Error`;
//! the last two can only degrade the outcome to a `Warning`.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::contracts::{FieldShape, FieldSpec, ScanMode, StageContract};
use super::ResultParser;
use crate::core::{Diagnostic, ErrorKind, FieldValue, ResultRecord, StageOutcome, WarningKind};
use crate::errors::ParseError;
use crate::files::FileSet;
use crate::parsing::{self, ConvergenceChecker, LastIteration, LogField, WarningClassifier};

/// Phases of the per-stage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePhase {
    /// Checking that every required file was retrieved.
    ExpectFiles,
    /// Scanning error files.
    CheckErrors,
    /// Extracting record fields.
    ExtractFields,
    /// Checking the day-log for convergence.
    CheckConvergence,
    /// Warning lines classified; the walk completed.
    Classified,
}

impl fmt::Display for ParsePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectFiles => write!(f, "expect_files"),
            Self::CheckErrors => write!(f, "check_errors"),
            Self::ExtractFields => write!(f, "extract_fields"),
            Self::CheckConvergence => write!(f, "check_convergence"),
            Self::Classified => write!(f, "classified"),
        }
    }
}

/// The parsed result of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    /// Stage label.
    pub stage: String,
    /// Classified outcome.
    pub outcome: StageOutcome,
    /// Extracted fields. Partial when the outcome is an error.
    pub record: ResultRecord,
    /// Operator-facing messages.
    pub diagnostics: Vec<Diagnostic>,
    /// Phase the walk ended in.
    pub phase: ParsePhase,
    /// Offset applied to warning exit codes.
    #[serde(skip)]
    pub warning_offset: u16,
    /// The error outcome left the extracted record usable.
    #[serde(skip)]
    pub recoverable: bool,
}

impl StageReport {
    /// Creates a report for `stage` with an `Ok` outcome.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: StageOutcome::Ok,
            record: ResultRecord::new(),
            diagnostics: Vec::new(),
            phase: ParsePhase::ExpectFiles,
            warning_offset: 0,
            recoverable: false,
        }
    }

    /// Ends the walk with an error.
    #[must_use]
    pub fn fail(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        let diagnostic = Diagnostic::error(self.stage.clone(), kind, message);
        self.outcome = self.outcome.escalate(StageOutcome::Error(kind));
        self.diagnostics.push(diagnostic);
        self
    }

    /// Records a warning without overriding a worse or earlier outcome.
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.outcome = self.outcome.escalate(StageOutcome::Warning(kind));
        self.diagnostics
            .push(Diagnostic::warning(self.stage.clone(), kind, message));
    }

    /// Whether a workflow must stop after this report.
    ///
    /// Errors stop it unless they are marked recoverable.
    #[must_use]
    pub const fn halts(&self) -> bool {
        self.outcome.is_error() && !self.recoverable
    }

    /// Returns the numeric exit code of the outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u16 {
        self.outcome.exit_code(self.warning_offset)
    }
}

/// Parses the output files of one solve stage against its contract.
#[derive(Debug, Clone)]
pub struct StageResultParser {
    contract: &'static StageContract,
    classifier: WarningClassifier,
    convergence: ConvergenceChecker,
}

impl StageResultParser {
    /// Creates a parser for `contract` with default classification.
    #[must_use]
    pub fn new(contract: &'static StageContract) -> Self {
        Self {
            contract,
            classifier: WarningClassifier::default(),
            convergence: ConvergenceChecker::default(),
        }
    }

    /// Sets the warning classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: WarningClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the convergence checker.
    #[must_use]
    pub fn with_convergence(mut self, convergence: ConvergenceChecker) -> Self {
        self.convergence = convergence;
        self
    }

    /// Returns the contract.
    #[must_use]
    pub fn contract(&self) -> &'static StageContract {
        self.contract
    }

    /// Runs the full state machine on `files`.
    pub fn parse_files<F: FileSet + ?Sized>(&self, files: &F) -> StageReport {
        let contract = self.contract;
        let mut report = StageReport::new(contract.name.clone());
        report.warning_offset = contract.warning_offset;

        // ExpectFiles
        let missing: Vec<String> = contract
            .required
            .iter()
            .filter(|req| req.resolve(files).is_none())
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            let found = files.names();
            warn!(stage = %contract.name, ?missing, "Missing output files");
            return report.fail(
                ErrorKind::MissingOutput,
                format!(
                    "Found files {found:?}, expected to find {:?}; missing {missing:?}",
                    contract
                        .required
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                ),
            );
        }

        // CheckErrors
        report.phase = ParsePhase::CheckErrors;
        match parsing::scan_error_files(files, &contract.error_suffix) {
            Ok(scan) if scan.has_error => {
                let mut report = report.fail(ErrorKind::SolverError, scan.message);
                if let Some(diag) = report.diagnostics.last_mut() {
                    diag.files = scan.files;
                }
                return report;
            }
            Ok(_) => {}
            Err(err) => return report.fail(ErrorKind::MissingOutput, err.to_string()),
        }

        // ExtractFields
        report.phase = ParsePhase::ExtractFields;
        let (warning_lines, unread) = match self.extract_fields(files, &mut report.record) {
            Ok(extracted) => extracted,
            Err((kind, message)) => return report.fail(kind, message),
        };

        // CheckConvergence
        report.phase = ParsePhase::CheckConvergence;
        let mut warning_texts: Vec<FieldValue> =
            warning_lines.iter().map(|l| FieldValue::Text(l.clone())).collect();
        let day_log = contract.day_log.resolve(files);
        let converged = day_log
            .as_deref()
            .and_then(|name| files.read(name).ok())
            .is_some_and(|text| self.convergence.is_converged(&text));
        if !converged {
            info!(stage = %contract.name, day_log = ?day_log, "SCF not converged");
            report.warn(WarningKind::NotConverged, contract.not_converged_note.clone());
            warning_texts.push(FieldValue::Text(contract.not_converged_note.clone()));
        }

        // Classified
        report.phase = ParsePhase::Classified;
        if let Some(kind) = self.classifier.classify_lines(&warning_lines) {
            report.outcome = report.outcome.escalate(StageOutcome::Warning(kind));
        }
        for line in &warning_lines {
            let kind = self.classifier.classify_or_other(line);
            report
                .diagnostics
                .push(Diagnostic::warning(contract.name.clone(), kind, line.clone()));
        }
        for message in unread {
            report.warn(WarningKind::Other, message);
        }
        let _ = report
            .record
            .insert(contract.warnings_key.clone(), FieldValue::List(warning_texts));

        debug!(stage = %contract.name, outcome = %report.outcome, fields = report.record.len(), "Stage parsed");
        report
    }

    /// Extracts every contract field into `record` and returns the `:WAR`
    /// lines of the last iteration of every warning source, plus a note for
    /// each warning source that could not be read.
    fn extract_fields<F: FileSet + ?Sized>(
        &self,
        files: &F,
        record: &mut ResultRecord,
    ) -> Result<(Vec<String>, Vec<String>), (ErrorKind, String)> {
        let contract = self.contract;
        let mut by_source: Vec<(&str, Vec<&FieldSpec>)> = Vec::new();
        for spec in &contract.fields {
            match by_source.iter_mut().find(|(source, _)| *source == spec.source) {
                Some((_, specs)) => specs.push(spec),
                None => by_source.push((spec.source.as_str(), vec![spec])),
            }
        }

        let mut missing_fields = Vec::new();
        for (source, specs) in by_source {
            info!(stage = %contract.name, file = source, "Parsing output file");
            let content = files
                .read_optional(source)
                .map_err(|err| (ErrorKind::MissingOutput, err.to_string()))?;
            let Some(content) = content else {
                missing_fields.extend(
                    specs
                        .iter()
                        .filter(|s| s.mandatory)
                        .map(|s| format!("{} ({source} not retrieved)", s.key)),
                );
                continue;
            };

            let values = extract_source(&content, &specs)
                .map_err(|err| (ErrorKind::ParseError, format!("{source}: {err}")))?;

            for spec in specs {
                match values.get(spec.key.as_str()) {
                    Some(value) => store(record, spec, value.clone()),
                    None if spec.mandatory => missing_fields
                        .push(format!("{} ({} not found in {source})", spec.key, spec.field)),
                    None => debug!(stage = %contract.name, key = %spec.key, "Optional field absent"),
                }
            }
        }

        if !missing_fields.is_empty() {
            return Err((
                ErrorKind::FieldNotFound,
                format!("Mandatory fields not found: {}", missing_fields.join(", ")),
            ));
        }

        let mut warning_lines = Vec::new();
        let mut unread = Vec::new();
        for source in &contract.warning_sources {
            let content = match files.read_optional(source) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(err) => {
                    warn!(stage = %contract.name, file = %source, error = %err, "Warning source unreadable");
                    unread.push(format!("Warning lines of {source} not checked: {err}"));
                    continue;
                }
            };
            match LastIteration::scan(&content, &[LogField::Warning]) {
                Ok(last) => warning_lines.extend(
                    last.all(LogField::Warning)
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string)),
                ),
                Err(err) => {
                    warn!(stage = %contract.name, file = %source, error = %err, "Unreadable warning lines");
                    unread.push(format!("Warning lines of {source} not checked: {err}"));
                }
            }
        }
        Ok((warning_lines, unread))
    }
}

impl ResultParser for StageResultParser {
    fn name(&self) -> &str {
        &self.contract.name
    }

    fn parse(&self, files: &dyn FileSet) -> StageReport {
        self.parse_files(files)
    }
}

/// Extracts the fields of one source file, keyed by record key.
fn extract_source(
    content: &str,
    specs: &[&FieldSpec],
) -> Result<HashMap<String, FieldValue>, ParseError> {
    let mut values = HashMap::new();

    let backward: Vec<LogField> = specs
        .iter()
        .filter(|s| s.scan == ScanMode::LastIteration)
        .map(|s| s.field)
        .collect();
    let last = if backward.is_empty() {
        LastIteration::default()
    } else {
        LastIteration::scan(content, &backward)?
    };

    for spec in specs {
        let value = match (spec.scan, spec.shape) {
            (ScanMode::FirstMatch, _) => parsing::extract(spec.field, content)?,
            (ScanMode::LastIteration, FieldShape::List) => {
                let all = last.all(spec.field);
                (!all.is_empty()).then(|| FieldValue::List(all.to_vec()))
            }
            (ScanMode::LastIteration, _) => last.latest(spec.field).cloned(),
        };
        if let Some(value) = value {
            values.insert(spec.key.clone(), value);
        }
    }
    Ok(values)
}

fn store(record: &mut ResultRecord, spec: &FieldSpec, value: FieldValue) {
    let result = match spec.shape {
        FieldShape::Series => record.append(spec.key.clone(), value),
        FieldShape::Scalar | FieldShape::List => record.insert(spec.key.clone(), value),
    };
    if let Err(err) = result {
        warn!(key = %spec.key, error = %err, "Field extracted twice");
    }
}
