//! Parsers for the auxiliary steps: `x sgroup`, `init_lapw`, `x optimize`.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};

use super::parser::{ParsePhase, StageReport};
use super::ResultParser;
use crate::core::{ErrorKind, FieldValue, WarningKind};
use crate::files::FileSet;
use crate::parsing::error_files::DEFAULT_ERROR_SUFFIX;
use crate::parsing::warnings::DEFAULT_THRESHOLD;
use crate::parsing::{self, similarity};

/// Structure file written by `x sgroup`.
pub const SGROUP_STRUCT_FILE: &str = "case.struct_sgroup";

/// Log file written by `init_lapw`.
pub const INIT_LAPW_LOG: &str = "init_lapw.log";

/// Last line of a successful `init_lapw` run.
pub const INIT_LAPW_FINISHED: &str = "init_lapw finished ok";

static VOLUME_STRUCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_vol_*(-?\d+(?:\.\d+)?)\.struct$").expect("valid volume structure regex")
});

/// Parses `x sgroup` outputs: the symmetrized structure must exist and no
/// error file may have content.
#[derive(Debug, Clone, Copy, Default)]
pub struct SgroupParser;

impl SgroupParser {
    /// Creates the parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ResultParser for SgroupParser {
    fn name(&self) -> &str {
        "sgroup"
    }

    fn parse(&self, files: &dyn FileSet) -> StageReport {
        let mut report = StageReport::new(self.name());
        info!("Parsing results of x sgroup");
        if !files.contains(SGROUP_STRUCT_FILE) {
            return report.fail(
                ErrorKind::MissingOutput,
                format!(
                    "Found files {:?}, expected to find [\"{SGROUP_STRUCT_FILE}\"]",
                    files.names()
                ),
            );
        }

        report.phase = ParsePhase::CheckErrors;
        match parsing::scan_error_files(files, DEFAULT_ERROR_SUFFIX) {
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

        report.phase = ParsePhase::Classified;
        let _ = report
            .record
            .insert("structure_file", FieldValue::from(SGROUP_STRUCT_FILE));
        report
    }
}

/// Parses `init_lapw` outputs.
///
/// The last line of the log is compared to `init_lapw finished ok`; a
/// retrieved `.lcore` file signals core charge leaking out of the spheres.
#[derive(Debug, Clone, Copy)]
pub struct InitLapwParser {
    threshold: u8,
}

impl Default for InitLapwParser {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl InitLapwParser {
    /// Creates the parser with the default similarity threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum similarity of a successful last line.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }
}

impl ResultParser for InitLapwParser {
    fn name(&self) -> &str {
        "init_lapw"
    }

    fn parse(&self, files: &dyn FileSet) -> StageReport {
        let mut report = StageReport::new(self.name());
        let log = match files.read_optional(INIT_LAPW_LOG) {
            Ok(Some(log)) => log,
            Ok(None) => {
                return report.fail(
                    ErrorKind::MissingOutput,
                    format!(
                        "Found files {:?}, expected to find [\"{INIT_LAPW_LOG}\"]",
                        files.names()
                    ),
                );
            }
            Err(err) => return report.fail(ErrorKind::MissingOutput, err.to_string()),
        };

        info!(file = INIT_LAPW_LOG, "Parsing init_lapw log");
        report.phase = ParsePhase::CheckErrors;
        let last_line = log.lines().last().unwrap_or_default().trim();
        let score = similarity(INIT_LAPW_FINISHED, last_line);
        debug!(score, last_line, "init_lapw last line");
        if score < self.threshold {
            error!(last_line, "init_lapw failed");
            return report.fail(
                ErrorKind::InitFailed,
                format!(
                    "Found last line in {INIT_LAPW_LOG} '{last_line}', while expected to find '{INIT_LAPW_FINISHED}'"
                ),
            );
        }

        report.phase = ParsePhase::Classified;
        let leaks: Vec<String> = files.names_with_suffix(".lcore");
        if !leaks.is_empty() {
            warn!(files = ?leaks, "Core charge leakage");
            report.warn(
                WarningKind::CoreLeakage,
                format!("Core leakage reported in {}", leaks.join(", ")),
            );
            if let Some(diag) = report.diagnostics.last_mut() {
                diag.files = leaks;
            }
        }
        report
    }
}

/// A structure file produced by `x optimize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeStructure {
    /// Retrieved file name.
    pub name: String,
    /// Volume change relative to the reference, percent.
    pub delta_percent: f64,
}

/// Parses `x optimize` outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeParser;

impl OptimizeParser {
    /// Creates the parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the volume structures in `files`, sorted by delta.
    ///
    /// Struct files whose name carries no volume delta are ignored.
    pub fn volume_structures<F: FileSet + ?Sized>(files: &F) -> Vec<VolumeStructure> {
        let mut structures: Vec<VolumeStructure> = files
            .names_with_suffix("struct")
            .into_iter()
            .filter_map(|name| {
                let delta = VOLUME_STRUCT
                    .captures(&name)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok());
                match delta {
                    Some(delta_percent) => Some(VolumeStructure {
                        name,
                        delta_percent,
                    }),
                    None => {
                        debug!(file = %name, "Not a volume structure");
                        None
                    }
                }
            })
            .collect();
        structures.sort_by(|a, b| a.delta_percent.total_cmp(&b.delta_percent));
        structures
    }
}

impl ResultParser for OptimizeParser {
    fn name(&self) -> &str {
        "optimize"
    }

    fn parse(&self, files: &dyn FileSet) -> StageReport {
        let mut report = StageReport::new(self.name());
        let structures = Self::volume_structures(files);
        if structures.is_empty() {
            error!("no case_vol_*.struct file(s) generated");
            return report.fail(
                ErrorKind::MissingOutput,
                format!(
                    "no case_vol_*.struct file(s) generated; found {:?}",
                    files.names()
                ),
            );
        }

        report.phase = ParsePhase::Classified;
        info!(count = structures.len(), "Volume structures generated");
        let names: Vec<FieldValue> = structures
            .iter()
            .map(|s| FieldValue::Text(s.name.clone()))
            .collect();
        let deltas: Vec<FieldValue> = structures
            .iter()
            .map(|s| FieldValue::Float(s.delta_percent))
            .collect();
        let _ = report.record.insert("volume_structures", FieldValue::List(names));
        let _ = report.record.insert("volume_deltas", FieldValue::List(deltas));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use crate::files::MemoryFileSet;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sgroup_ok() {
        let files = MemoryFileSet::new()
            .with_file(SGROUP_STRUCT_FILE, "Si\nF   LATTICE,NONEQUIV.ATOMS:  1 227_Fd-3m\n")
            .with_file("sgroup.error", "");
        let report = SgroupParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(
            report.record.get("structure_file"),
            Some(&FieldValue::from(SGROUP_STRUCT_FILE))
        );
    }

    #[test]
    fn test_sgroup_missing_structure() {
        let report = SgroupParser::new().parse(&MemoryFileSet::new());
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::MissingOutput));
        assert_eq!(report.exit_code(), 401);
    }

    #[test]
    fn test_sgroup_error_file() {
        let files = MemoryFileSet::new()
            .with_file(SGROUP_STRUCT_FILE, "")
            .with_file("sgroup.error", "ERROR: lattice mismatch");
        let report = SgroupParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::SolverError));
        assert_eq!(report.diagnostics[0].files, vec!["sgroup.error"]);
    }

    #[test]
    fn test_init_lapw_finished() {
        let files = MemoryFileSet::new()
            .with_file(INIT_LAPW_LOG, "> x lstart\n> x kgen\n> init_lapw finished ok\n");
        let report = InitLapwParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(report.phase, ParsePhase::Classified);
    }

    #[test]
    fn test_init_lapw_failed() {
        let files = MemoryFileSet::new().with_file(INIT_LAPW_LOG, "> x lstart\nstop error\n");
        let report = InitLapwParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::InitFailed));
        assert!(report.diagnostics[0].message.contains("'stop error'"));
        assert_eq!(report.exit_code(), 405);
    }

    #[test]
    fn test_init_lapw_empty_log_fails() {
        let files = MemoryFileSet::new().with_file(INIT_LAPW_LOG, "");
        let report = InitLapwParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::InitFailed));
    }

    #[test]
    fn test_init_lapw_core_leakage() {
        let files = MemoryFileSet::new()
            .with_file(INIT_LAPW_LOG, "init_lapw finished ok\n")
            .with_file("case.lcore", "");
        let report = InitLapwParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Warning(WarningKind::CoreLeakage));
        assert_eq!(report.exit_code(), 306);
        assert_eq!(report.diagnostics[0].files, vec!["case.lcore"]);
    }

    #[test]
    fn test_init_lapw_missing_log() {
        let report = InitLapwParser::new().parse(&MemoryFileSet::new());
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::MissingOutput));
    }

    #[test]
    fn test_volume_structures_sorted_by_delta() {
        let files = MemoryFileSet::new()
            .with_file("case_vol__2.0.struct", "")
            .with_file("case_vol_-4.0.struct", "")
            .with_file("case_vol___6.5.struct", "")
            .with_file("case.struct", "")
            .with_file("optimize.job", "");
        let structures = OptimizeParser::volume_structures(&files);
        let deltas: Vec<f64> = structures.iter().map(|s| s.delta_percent).collect();
        assert_eq!(deltas, vec![-4.0, 2.0, 6.5]);
        assert_eq!(structures[0].name, "case_vol_-4.0.struct");
    }

    #[test]
    fn test_optimize_records_structures() {
        let files = MemoryFileSet::new()
            .with_file("case_vol_-2.0.struct", "")
            .with_file("case_vol__2.0.struct", "");
        let report = OptimizeParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(
            report.record.get("volume_deltas"),
            Some(&FieldValue::from(vec![-2.0, 2.0]))
        );
    }

    #[test]
    fn test_optimize_without_structures() {
        let files = MemoryFileSet::new().with_file("case.struct", "");
        let report = OptimizeParser::new().parse(&files);
        assert_eq!(report.outcome, StageOutcome::Error(ErrorKind::MissingOutput));
        assert!(report.diagnostics[0].message.contains("case_vol_*.struct"));
    }
}
