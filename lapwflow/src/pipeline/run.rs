//! The typed result of one workflow run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::core::{Diagnostic, PipelineOutcome, ResultRecord, StageOutcome};
use crate::execution::StepKind;
use crate::stages::auxiliary::VolumeStructure;
use crate::stages::StageReport;

/// The workflows the orchestrator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Symmetrize, initialize, solve.
    Scf,
    /// Symmetrize, initialize, solve through the precision cascade.
    Scf123,
    /// SCF at the reference volume, then at every scaled volume.
    Eos,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scf => write!(f, "scf"),
            Self::Scf123 => write!(f, "scf123"),
            Self::Eos => write!(f, "eos"),
        }
    }
}

/// One executed step and its parsed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// What ran.
    pub kind: StepKind,
    /// Step label, unique within the run.
    pub label: String,
    /// Request id, used as parent by follow-up steps.
    pub request_id: Uuid,
    /// Executor handle id, when the submission was accepted.
    pub handle_id: Option<Uuid>,
    /// Parsed outcome.
    pub report: StageReport,
    /// Wall time from submission to parsed report, milliseconds.
    pub duration_ms: f64,
    /// When the report was produced.
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    /// Returns the parsed outcome.
    #[must_use]
    pub const fn outcome(&self) -> StageOutcome {
        self.report.outcome
    }
}

/// The solve at one scaled volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRun {
    /// The structure solved.
    pub structure: VolumeStructure,
    /// The solve step.
    pub step: StepRecord,
}

/// One point of the energy-volume curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumePoint {
    /// Request id of the solve that produced the point.
    pub stage_id: Uuid,
    /// Volume change relative to the reference, percent.
    pub delta_percent: f64,
    /// Unit cell volume, Bohr³.
    pub volume_bohr3: f64,
    /// Total energy, Ry.
    pub energy_ry: f64,
}

/// Everything a workflow run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    /// Run id.
    pub id: Uuid,
    /// Which workflow ran.
    pub workflow: Workflow,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// `x sgroup`.
    pub symmetrize: Option<StepRecord>,
    /// `init_lapw`.
    pub initialize: Option<StepRecord>,
    /// The reference solve.
    pub solve: Option<StepRecord>,
    /// `x optimize`.
    pub generate_volumes: Option<StepRecord>,
    /// Solves at the scaled volumes, in submission order.
    pub volumes: Vec<VolumeRun>,
    /// Merged result record.
    pub record: ResultRecord,
    /// Energy-volume points, reference first.
    pub eos_points: Vec<VolumePoint>,
    /// Worst outcome over every step.
    pub outcome: PipelineOutcome,
    /// Step that halted the run, if any.
    pub halted_at: Option<StepKind>,
}

impl PipelineRun {
    /// Starts an empty run.
    #[must_use]
    pub fn new(workflow: Workflow) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow,
            started_at: Utc::now(),
            finished_at: None,
            symmetrize: None,
            initialize: None,
            solve: None,
            generate_volumes: None,
            volumes: Vec::new(),
            record: ResultRecord::new(),
            eos_points: Vec::new(),
            outcome: PipelineOutcome::Clean,
            halted_at: None,
        }
    }

    /// Returns every executed step in pipeline order.
    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        [
            self.symmetrize.as_ref(),
            self.initialize.as_ref(),
            self.solve.as_ref(),
            self.generate_volumes.as_ref(),
        ]
        .into_iter()
        .flatten()
        .chain(self.volumes.iter().map(|v| &v.step))
    }

    /// Returns the outcome of every executed step.
    #[must_use]
    pub fn outcomes(&self) -> Vec<StageOutcome> {
        self.steps().map(StepRecord::outcome).collect()
    }

    /// Returns every diagnostic, in step order.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.steps().flat_map(|s| s.report.diagnostics.iter()).collect()
    }

    /// Returns the pipeline exit code: `0`, `300` or `400`.
    #[must_use]
    pub const fn exit_code(&self) -> u16 {
        self.outcome.exit_code()
    }

    /// Returns the volume solves that produced usable results.
    pub fn successful_volumes(&self) -> impl Iterator<Item = &VolumeRun> {
        self.volumes.iter().filter(|v| v.step.outcome().is_usable())
    }

    /// Classifies the run and stamps its end time.
    pub(crate) fn finalize(&mut self) {
        self.outcome = PipelineOutcome::from_outcomes(self.outcomes());
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, WarningKind};

    fn step(kind: StepKind, outcome: StageOutcome) -> StepRecord {
        let mut report = StageReport::new(kind.as_str());
        report.outcome = outcome;
        StepRecord {
            kind,
            label: kind.as_str().to_string(),
            request_id: Uuid::new_v4(),
            handle_id: None,
            report,
            duration_ms: 0.0,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_run_is_clean() {
        let mut run = PipelineRun::new(Workflow::Scf);
        run.finalize();
        assert_eq!(run.outcome, PipelineOutcome::Clean);
        assert_eq!(run.exit_code(), 0);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_worst_step_decides() {
        let mut run = PipelineRun::new(Workflow::Eos);
        run.symmetrize = Some(step(StepKind::Symmetrize, StageOutcome::Ok));
        run.solve = Some(step(StepKind::Solve, WarningKind::QtlB.into()));
        run.finalize();
        assert_eq!(run.exit_code(), 300);

        run.volumes.push(VolumeRun {
            structure: VolumeStructure {
                name: "case_vol_-2.0.struct".into(),
                delta_percent: -2.0,
            },
            step: step(StepKind::SolveAtVolume, ErrorKind::SolverError.into()),
        });
        run.finalize();
        assert_eq!(run.outcome, PipelineOutcome::Error);
        assert_eq!(run.steps().count(), 3);
        assert_eq!(run.successful_volumes().count(), 0);
    }
}
