//! Aggregation of the multi-precision solve (`prec3k → prec3 → prec2 → prec1`).

use serde::Serialize;
use tracing::{error, info, warn};

use super::contracts::{FieldShape, Precision, StageContract};
use super::parser::{ParsePhase, StageReport, StageResultParser};
use super::ResultParser;
use crate::core::{Diagnostic, ErrorKind, FieldValue, ResultRecord, StageOutcome};
use crate::files::FileSet;
use crate::parsing::{self, ConvergenceChecker, WarningClassifier};

/// What happened to one precision stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    /// Parsed; its fields were merged into the aggregate record.
    Parsed,
    /// Parsed but ended in an error; nothing was merged.
    Failed,
    /// Skipped because its error files had content.
    SkippedWithErrors,
    /// None of its files were retrieved.
    NotRun,
    /// Not looked at because the reference stage failed.
    NotAttempted,
}

/// Per-stage entry of a [`CascadeReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeStage {
    /// The stage.
    pub precision: Precision,
    /// What happened to it.
    pub disposition: StageDisposition,
    /// Its outcome, when it counted toward the aggregate.
    pub outcome: Option<StageOutcome>,
}

/// Aggregated result of a precision cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
    /// Reference fields unsuffixed, refinement fields suffixed `_precN`.
    pub record: ResultRecord,
    /// Worst outcome over every attempted stage.
    pub outcome: StageOutcome,
    /// Stage that set the aggregate outcome.
    pub decisive: Option<Precision>,
    /// Stage dispositions in cascade order.
    pub stages: Vec<CascadeStage>,
    /// Diagnostics of every attempted stage.
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    phase: ParsePhase,
}

impl CascadeReport {
    fn new() -> Self {
        Self {
            record: ResultRecord::new(),
            outcome: StageOutcome::Ok,
            decisive: None,
            stages: Vec::with_capacity(Precision::CASCADE.len()),
            diagnostics: Vec::new(),
            phase: ParsePhase::Classified,
        }
    }

    /// Escalates the aggregate outcome; coarser stages win ties.
    fn absorb(&mut self, precision: Precision, outcome: StageOutcome) {
        if outcome.severity() > self.outcome.severity() {
            self.outcome = outcome;
            self.decisive = Some(precision);
        }
    }

    fn push_stage(
        &mut self,
        precision: Precision,
        disposition: StageDisposition,
        outcome: Option<StageOutcome>,
    ) {
        self.stages.push(CascadeStage {
            precision,
            disposition,
            outcome,
        });
    }

    /// Returns the disposition of `precision`.
    #[must_use]
    pub fn disposition(&self, precision: Precision) -> Option<StageDisposition> {
        self.stages
            .iter()
            .find(|s| s.precision == precision)
            .map(|s| s.disposition)
    }

    /// Returns the exit code; warnings are offset by the deciding stage.
    #[must_use]
    pub fn exit_code(&self) -> u16 {
        let offset = self.decisive.map_or(0, |p| p.warning_offset());
        self.outcome.exit_code(offset)
    }

    /// Whether the reference stage parsed, so the record holds its fields.
    #[must_use]
    pub fn reference_parsed(&self) -> bool {
        self.disposition(Precision::Prec3k) == Some(StageDisposition::Parsed)
    }

    /// Flattens into a generic stage report.
    ///
    /// Refinement errors keep the aggregate outcome but are recoverable:
    /// the reference fields stay usable.
    #[must_use]
    pub fn into_stage_report(self, stage: impl Into<String>) -> StageReport {
        let warning_offset = self.decisive.map_or(0, |p| p.warning_offset());
        let recoverable = self.reference_parsed();
        StageReport {
            stage: stage.into(),
            outcome: self.outcome,
            record: self.record,
            diagnostics: self.diagnostics,
            phase: self.phase,
            warning_offset,
            recoverable,
        }
    }
}

/// Runs the stage parser over every precision stage, coarsest first.
#[derive(Debug, Clone, Default)]
pub struct PrecisionCascade {
    classifier: WarningClassifier,
    convergence: ConvergenceChecker,
}

impl PrecisionCascade {
    /// Creates a cascade with default classification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the warning classifier used by every stage.
    #[must_use]
    pub fn with_classifier(mut self, classifier: WarningClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the convergence checker used by every stage.
    #[must_use]
    pub fn with_convergence(mut self, convergence: ConvergenceChecker) -> Self {
        self.convergence = convergence;
        self
    }

    fn stage_parser(&self, precision: Precision) -> StageResultParser {
        StageResultParser::new(StageContract::for_precision(precision))
            .with_classifier(self.classifier)
            .with_convergence(self.convergence.clone())
    }

    /// Aggregates every precision stage found in `files`.
    ///
    /// A failing reference stage short-circuits: no refinement file is
    /// read. A refinement with non-empty error files is skipped but its
    /// error still counts toward the aggregate outcome.
    pub fn aggregate<F: FileSet + ?Sized>(&self, files: &F) -> CascadeReport {
        let mut report = CascadeReport::new();

        info!("Parsing prec3k files");
        let reference = self.stage_parser(Precision::Prec3k).parse_files(files);
        report.absorb(Precision::Prec3k, reference.outcome);
        report.diagnostics.extend(reference.diagnostics);

        if reference.outcome.is_error() {
            error!(outcome = %reference.outcome, "Reference stage failed, refinements not attempted");
            report.record = reference.record;
            report.phase = reference.phase;
            report.push_stage(
                Precision::Prec3k,
                StageDisposition::Failed,
                Some(reference.outcome),
            );
            for precision in &Precision::CASCADE[1..] {
                report.push_stage(*precision, StageDisposition::NotAttempted, None);
            }
            return report;
        }
        report.record = reference.record;
        report.push_stage(
            Precision::Prec3k,
            StageDisposition::Parsed,
            Some(reference.outcome),
        );

        for precision in &Precision::CASCADE[1..] {
            self.refine(*precision, files, &mut report);
        }
        report
    }

    fn refine<F: FileSet + ?Sized>(
        &self,
        precision: Precision,
        files: &F,
        report: &mut CascadeReport,
    ) {
        let contract = StageContract::for_precision(precision);
        info!(stage = %precision, "Parsing refinement files");

        let scan = match parsing::scan_error_files(files, &contract.error_suffix) {
            Ok(scan) => scan,
            Err(err) => {
                let outcome = StageOutcome::Error(ErrorKind::MissingOutput);
                report.absorb(precision, outcome);
                report.diagnostics.push(Diagnostic::error(
                    precision.as_str(),
                    ErrorKind::MissingOutput,
                    err.to_string(),
                ));
                report.push_stage(precision, StageDisposition::SkippedWithErrors, Some(outcome));
                return;
            }
        };
        if scan.has_error {
            warn!(stage = %precision, files = ?scan.files, "Refinement stage skipped");
            let outcome = StageOutcome::Error(ErrorKind::SolverError);
            report.absorb(precision, outcome);
            report.diagnostics.push(
                Diagnostic::error(precision.as_str(), ErrorKind::SolverError, scan.message)
                    .with_files(scan.files),
            );
            report.push_stage(precision, StageDisposition::SkippedWithErrors, Some(outcome));
            return;
        }

        let retrieved = contract
            .required
            .iter()
            .filter(|req| req.resolve(files).is_some())
            .count();
        if retrieved == 0 {
            info!(stage = %precision, "Refinement stage was not run");
            report.push_stage(precision, StageDisposition::NotRun, None);
            return;
        }

        let stage = self.stage_parser(precision).parse_files(files);
        report.absorb(precision, stage.outcome);
        report.diagnostics.extend(stage.diagnostics);
        if stage.outcome.is_error() {
            report.push_stage(precision, StageDisposition::Failed, Some(stage.outcome));
            return;
        }

        fold_stage_record(&mut report.record, stage.record, contract);
        report.push_stage(precision, StageDisposition::Parsed, Some(stage.outcome));
    }
}

impl ResultParser for PrecisionCascade {
    fn name(&self) -> &str {
        "run123_lapw"
    }

    fn parse(&self, files: &dyn FileSet) -> StageReport {
        self.aggregate(files).into_stage_report(self.name())
    }
}

/// Moves a refinement stage's fields into the aggregate record.
///
/// Series fields extend the shared list; all other keys are new.
fn fold_stage_record(target: &mut ResultRecord, stage: ResultRecord, contract: &StageContract) {
    for (key, value) in stage {
        let result = match (contract.shape_of(&key), value) {
            (Some(FieldShape::Series), FieldValue::List(items)) => items
                .into_iter()
                .try_for_each(|item| target.append(key.clone(), item)),
            (_, value) => target.insert(key.clone(), value),
        };
        if let Err(err) = result {
            warn!(stage = %contract.name, error = %err, "Refinement field not merged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WarningKind;
    use crate::testing::fixtures::{self, ScfFixture};
    use crate::testing::RecordingFileSet;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_cascade() {
        let report = PrecisionCascade::new().aggregate(&fixtures::cascade_files());

        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(report.decisive, None);
        assert_eq!(report.record.get("EtotRyd"), Some(&FieldValue::Float(-580.5)));
        assert_eq!(report.record.get("EtotRyd_prec3"), Some(&FieldValue::Float(-580.6)));
        assert_eq!(report.record.get("EtotRyd_prec2"), Some(&FieldValue::Float(-580.7)));
        assert_eq!(report.record.get("EtotRyd_prec1"), Some(&FieldValue::Float(-580.8)));
        assert_eq!(
            report.record.get("Iter"),
            Some(&FieldValue::from(vec![14_i64, 5, 4, 3]))
        );
        assert_eq!(
            report.record.get("kmesh3k"),
            Some(&FieldValue::Text("8 8 8".to_string()))
        );
        assert_eq!(
            report.record.get("kmesh3"),
            Some(&FieldValue::Text("8 8 8".to_string()))
        );
        assert_eq!(
            report.record.get("fftmesh3k"),
            Some(&FieldValue::Text("48 48 48".to_string()))
        );
        assert_eq!(
            report.record.get("mTSRyd"),
            Some(&FieldValue::Float(-0.004_417_18))
        );
        assert!(report.record.get("num_core_el_prec1").is_some());
        assert!(report.record.get("Warning_last_prec2").is_some());
        assert!(report
            .stages
            .iter()
            .all(|s| s.disposition == StageDisposition::Parsed));
    }

    #[test]
    fn test_reference_error_short_circuits() {
        let mut files = fixtures::cascade_files();
        files.insert("lapw1.error_prec3k", "'LAPW1' - Error");
        let recording = RecordingFileSet::new(files);

        let report = PrecisionCascade::new().aggregate(&recording);

        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::SolverError));
        assert_eq!(report.decisive, Some(Precision::Prec3k));
        for precision in [Precision::Prec3, Precision::Prec2, Precision::Prec1] {
            assert_eq!(
                report.disposition(precision),
                Some(StageDisposition::NotAttempted)
            );
        }
        let reads = recording.reads();
        assert!(reads
            .iter()
            .all(|name| !name.starts_with("prec3.") && !name.starts_with("prec2") && !name.starts_with("prec1")));
        assert!(!reads.iter().any(|name| name.contains("error_prec3") && !name.ends_with("prec3k")));
    }

    #[test]
    fn test_refinement_errors_skip_stage_but_keep_coarse_results() {
        let mut files = fixtures::cascade_files();
        files.insert("lapw1.error_prec2", "'LAPW1' - Error in prec2");

        let report = PrecisionCascade::new().aggregate(&files);

        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::SolverError));
        assert_eq!(report.decisive, Some(Precision::Prec2));
        assert_eq!(
            report.disposition(Precision::Prec2),
            Some(StageDisposition::SkippedWithErrors)
        );
        assert!(report.record.get("EtotRyd_prec2").is_none());
        assert_eq!(report.record.get("EtotRyd_prec3"), Some(&FieldValue::Float(-580.6)));
        assert_eq!(report.record.get("EtotRyd_prec1"), Some(&FieldValue::Float(-580.8)));
        assert_eq!(
            report.record.get("Iter"),
            Some(&FieldValue::from(vec![14_i64, 5, 3]))
        );
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.message.contains("File: lapw1.error_prec2")));
    }

    #[test]
    fn test_refinement_error_report_does_not_halt() {
        let mut files = fixtures::cascade_files();
        files.insert("lapw1.error_prec1", "'LAPW1' - Error in prec1");

        let cascade = PrecisionCascade::new().aggregate(&files);
        assert!(cascade.reference_parsed());
        let report = cascade.into_stage_report("run123_lapw");

        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::SolverError));
        assert!(report.recoverable);
        assert!(!report.halts());
        assert_eq!(report.record.get("EtotRyd"), Some(&FieldValue::Float(-580.5)));
        assert_eq!(report.exit_code(), 402);
    }

    #[test]
    fn test_reference_error_report_halts() {
        let mut files = fixtures::cascade_files();
        files.insert("lapw1.error_prec3k", "'LAPW1' - Error");

        let report = PrecisionCascade::new().parse(&files);
        assert!(!report.recoverable);
        assert!(report.halts());
    }

    #[test]
    fn test_absent_refinements_were_not_run() {
        let files = ScfFixture::new().files("prec3k");
        let report = PrecisionCascade::new().aggregate(&files);

        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(report.disposition(Precision::Prec1), Some(StageDisposition::NotRun));
        assert_eq!(report.record.get("Iter"), Some(&FieldValue::from(vec![12_i64])));
    }

    #[test]
    fn test_partial_refinement_is_missing_output() {
        let mut files = ScfFixture::new().files("prec3k");
        files.insert("prec2.scfm", fixtures::scf_iterations(&[(1, -580.7)]));
        let report = PrecisionCascade::new().aggregate(&files);

        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::MissingOutput));
        assert_eq!(report.disposition(Precision::Prec2), Some(StageDisposition::Failed));
    }

    #[test]
    fn test_refinement_warning_uses_offset_exit_code() {
        let mut files = ScfFixture::new().files("prec3k");
        files.extend(&ScfFixture::new().converged(false).files("prec2"));
        let report = PrecisionCascade::new().aggregate(&files);

        assert_eq!(report.outcome, StageOutcome::Warning(WarningKind::NotConverged));
        assert_eq!(report.decisive, Some(Precision::Prec2));
        assert_eq!(report.exit_code(), 325);
        assert_eq!(
            report.record.get("Warning_last_prec2"),
            Some(&FieldValue::from(vec!["Warning: SCF prec2 not converged"]))
        );
    }

    #[test]
    fn test_reference_warning_wins_tie() {
        let mut files = ScfFixture::new()
            .with_warning(fixtures::QTL_B_WARNING)
            .files("prec3k");
        files.extend(&ScfFixture::new().converged(false).files("prec3"));
        let report = PrecisionCascade::new().aggregate(&files);

        assert_eq!(report.outcome, StageOutcome::Warning(WarningKind::QtlB));
        assert_eq!(report.exit_code(), 302);
    }

    #[test]
    fn test_as_result_parser() {
        let parser: &dyn ResultParser = &PrecisionCascade::new();
        let report = parser.parse(&fixtures::cascade_files());
        assert_eq!(report.stage, "run123_lapw");
        assert_eq!(report.outcome, StageOutcome::Ok);
    }
}
