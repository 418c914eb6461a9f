//! Workflow orchestration over an [`Executor`].

use futures::future::join_all;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::{PipelineConfig, SolveMode};
use super::run::{PipelineRun, StepRecord, VolumePoint, VolumeRun, Workflow};
use crate::core::{ErrorKind, FieldValue, ResultMerger, ResultRecord};
use crate::errors::LapwflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::execution::{Executor, StepKind, StepRequest};
use crate::files::{FileSet, MemoryFileSet};
use crate::observability::SpanTimer;
use crate::stages::auxiliary::{
    InitLapwParser, OptimizeParser, SgroupParser, VolumeStructure, SGROUP_STRUCT_FILE,
};
use crate::stages::{PrecisionCascade, ResultParser, StageContract, StageReport, StageResultParser};

/// Name of the structure file every program reads.
pub const STRUCT_FILE: &str = "case.struct";

/// A finished step together with the files it left behind.
struct StepResult {
    record: StepRecord,
    files: MemoryFileSet,
}

/// What the reference SCF hands on to the volume scan.
struct Reference {
    structure: String,
    solve_request: Uuid,
}

/// Runs WIEN2k workflows step by step on an [`Executor`].
///
/// A step whose outcome is an error halts the workflow, unless the report
/// marks it recoverable (a failed cascade refinement over a parsed
/// reference stage). The per-volume solves of an EOS scan never halt:
/// they are isolated from each other and a failed volume is only left out
/// of the merged record.
pub struct PipelineOrchestrator<E: Executor> {
    executor: E,
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
}

impl<E: Executor> std::fmt::Debug for PipelineOrchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Executor> PipelineOrchestrator<E> {
    /// Creates an orchestrator with the default configuration.
    #[must_use]
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            config: PipelineConfig::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Symmetrize, initialize and solve `structure` with the configured
    /// solve mode.
    pub async fn run_scf(&self, structure: &str) -> Result<PipelineRun, LapwflowError> {
        self.config.validate()?;
        let mut run = self.begin(Workflow::Scf).await;
        if self.reference(&mut run, structure, self.config.solve_mode).await.is_some() {
            run.record = solve_record(&run);
        }
        Ok(self.finish(run).await)
    }

    /// Like [`run_scf`](Self::run_scf), always through the precision cascade.
    pub async fn run_scf123(&self, structure: &str) -> Result<PipelineRun, LapwflowError> {
        self.config.validate()?;
        let mut run = self.begin(Workflow::Scf123).await;
        if self
            .reference(&mut run, structure, SolveMode::PrecisionCascade)
            .await
            .is_some()
        {
            run.record = solve_record(&run);
        }
        Ok(self.finish(run).await)
    }

    /// Computes an energy-volume curve around `structure`.
    ///
    /// `Symmetrize → Initialize → SolveReference → GenerateVolumeScan →
    /// SolveEachVolume → Merge → Finalize`. The reference record comes
    /// first in the merged series, then every successful volume in
    /// submission order.
    pub async fn run_eos(&self, structure: &str) -> Result<PipelineRun, LapwflowError> {
        self.config.validate()?;
        let stdin = self.config.optimize_stdin()?;
        let mut run = self.begin(Workflow::Eos).await;

        let Some(reference) = self.reference(&mut run, structure, self.config.solve_mode).await
        else {
            return Ok(self.finish(run).await);
        };

        // GenerateVolumeScan
        let request = StepRequest::new(StepKind::GenerateVolumes)
            .with_input(STRUCT_FILE, reference.structure.as_str())
            .with_stdin(stdin)
            .with_parent(reference.solve_request);
        let generated = self.execute(request, &OptimizeParser::new()).await;
        let halted = generated.record.report.halts();
        run.generate_volumes = Some(generated.record);
        if halted {
            return Ok(self.halt(run, StepKind::GenerateVolumes).await);
        }
        let structures = OptimizeParser::volume_structures(&generated.files);

        // SolveEachVolume
        info!(run_id = %run.id, count = structures.len(), "Solving scaled volumes");
        let solves = structures.iter().map(|structure| {
            let content = generated.files.read(&structure.name).map(Cow::into_owned);
            let request = StepRequest::new(StepKind::SolveAtVolume)
                .with_label(format!("solve_at_volume:{}", structure.name))
                .with_options(self.config.solve_options.clone())
                .with_parent(reference.solve_request);
            let parser = self.single_precision_parser();
            async move {
                match content {
                    Ok(content) => {
                        self.execute(request.with_input(STRUCT_FILE, content), &parser)
                            .await
                    }
                    Err(err) => self.reject(request, &parser, err.to_string()).await,
                }
            }
        });
        let results = join_all(solves).await;
        run.volumes = structures
            .into_iter()
            .zip(results)
            .map(|(structure, result)| VolumeRun {
                structure,
                step: result.record,
            })
            .collect();

        // Merge
        merge_volumes(&mut run);
        Ok(self.finish(run).await)
    }

    /// Runs symmetrize, initialize and the reference solve.
    ///
    /// Returns `None` when one of them halted the run.
    async fn reference(
        &self,
        run: &mut PipelineRun,
        structure: &str,
        mode: SolveMode,
    ) -> Option<Reference> {
        // Symmetrize
        let request = StepRequest::new(StepKind::Symmetrize)
            .with_input(STRUCT_FILE, structure)
            .with_options(self.config.sgroup_options.clone());
        let symmetrized = self.execute(request, &SgroupParser::new()).await;
        let halted = symmetrized.record.report.halts();
        run.symmetrize = Some(symmetrized.record);
        if halted {
            self.note_halt(run, StepKind::Symmetrize).await;
            return None;
        }
        let structure = match symmetrized.files.read(SGROUP_STRUCT_FILE) {
            Ok(text) => text.into_owned(),
            Err(err) => {
                error!(error = %err, "Symmetrized structure unreadable");
                self.note_halt(run, StepKind::Symmetrize).await;
                return None;
            }
        };

        // Initialize
        let request = StepRequest::new(StepKind::Initialize)
            .with_input(STRUCT_FILE, structure.as_str())
            .with_options(self.config.init_options.clone());
        let initialized = self.execute(request, &InitLapwParser::new()).await;
        let halted = initialized.record.report.halts();
        let init_request = initialized.record.request_id;
        run.initialize = Some(initialized.record);
        if halted {
            self.note_halt(run, StepKind::Initialize).await;
            return None;
        }

        // SolveReference
        let (kind, parser): (StepKind, Box<dyn ResultParser>) = match mode {
            SolveMode::Single => (StepKind::Solve, Box::new(self.single_precision_parser())),
            SolveMode::PrecisionCascade => (
                StepKind::SolveCascade,
                Box::new(
                    PrecisionCascade::new()
                        .with_classifier(self.config.classifier())
                        .with_convergence(self.config.convergence()),
                ),
            ),
        };
        let request = StepRequest::new(kind)
            .with_options(self.config.solve_options.clone())
            .with_parent(init_request);
        let solved = self.execute(request, parser.as_ref()).await;
        let halted = solved.record.report.halts();
        let solve_request = solved.record.request_id;
        run.solve = Some(solved.record);
        if halted {
            self.note_halt(run, kind).await;
            return None;
        }

        Some(Reference {
            structure,
            solve_request,
        })
    }

    fn single_precision_parser(&self) -> StageResultParser {
        StageResultParser::new(StageContract::single_precision())
            .with_classifier(self.config.classifier())
            .with_convergence(self.config.convergence())
    }

    /// Submits one step, waits for it and parses what it left behind.
    ///
    /// Transport failures and excepted steps become
    /// `Error(EXECUTION_EXCEPTED)` reports.
    async fn execute(&self, request: StepRequest, parser: &dyn ResultParser) -> StepResult {
        let kind = request.kind;
        let label = request.label.clone();
        let request_id = request.id;
        let timer = SpanTimer::start(label.as_str());

        self.sink
            .emit(
                "stage.started",
                Some(json!({
                    "stage": label,
                    "program": kind.program(),
                    "command": request.command_line(),
                    "request_id": request_id.to_string(),
                })),
            )
            .await;
        info!(stage = %label, program = kind.program(), "Step submitted");

        let mut handle_id = None;
        let (report, files) = match self.executor.submit(request).await {
            Err(err) => (excepted_report(parser, err.to_string()), MemoryFileSet::new()),
            Ok(handle) => {
                handle_id = Some(handle.id);
                match self.executor.wait(handle).await {
                    Err(err) => (excepted_report(parser, err.to_string()), MemoryFileSet::new()),
                    Ok(completion) => match completion.excepted_reason() {
                        Some(reason) => (
                            excepted_report(parser, format!("{label} excepted: {reason}")),
                            completion.retrieved,
                        ),
                        None => {
                            let report = parser.parse(&completion.retrieved);
                            (report, completion.retrieved)
                        }
                    },
                }
            }
        };

        let duration_ms = timer.finish();
        let event = if report.outcome.is_error() {
            warn!(stage = %label, outcome = %report.outcome, duration_ms, "Step failed");
            "stage.failed"
        } else {
            info!(stage = %label, outcome = %report.outcome, duration_ms, "Step completed");
            "stage.completed"
        };
        self.sink
            .emit(
                event,
                Some(json!({
                    "stage": label,
                    "outcome": report.outcome,
                    "exit_code": report.exit_code(),
                    "duration_ms": duration_ms,
                })),
            )
            .await;

        StepResult {
            record: StepRecord {
                kind,
                label,
                request_id,
                handle_id,
                report,
                duration_ms,
                finished_at: chrono::Utc::now(),
            },
            files,
        }
    }

    /// Records a step that could not be submitted for lack of input.
    async fn reject(
        &self,
        request: StepRequest,
        parser: &dyn ResultParser,
        message: String,
    ) -> StepResult {
        let label = request.label.clone();
        let report = StageReport::new(parser.name())
            .fail(ErrorKind::MissingOutput, format!("{label} not submitted: {message}"));
        warn!(stage = %label, error = %message, "Step input unreadable");
        self.sink
            .emit(
                "stage.failed",
                Some(json!({
                    "stage": label,
                    "outcome": report.outcome,
                    "exit_code": report.exit_code(),
                    "duration_ms": 0,
                })),
            )
            .await;

        StepResult {
            record: StepRecord {
                kind: request.kind,
                label,
                request_id: request.id,
                handle_id: None,
                report,
                duration_ms: 0.0,
                finished_at: chrono::Utc::now(),
            },
            files: MemoryFileSet::new(),
        }
    }

    async fn begin(&self, workflow: Workflow) -> PipelineRun {
        let run = PipelineRun::new(workflow);
        info!(run_id = %run.id, %workflow, "Pipeline started");
        self.sink
            .emit(
                "pipeline.started",
                Some(json!({ "run_id": run.id.to_string(), "workflow": workflow })),
            )
            .await;
        run
    }

    async fn note_halt(&self, run: &mut PipelineRun, at: StepKind) {
        run.halted_at = Some(at);
        error!(run_id = %run.id, step = %at, "Pipeline halted");
        self.sink
            .emit(
                "pipeline.halted",
                Some(json!({ "run_id": run.id.to_string(), "step": at })),
            )
            .await;
    }

    async fn halt(&self, mut run: PipelineRun, at: StepKind) -> PipelineRun {
        self.note_halt(&mut run, at).await;
        self.finish(run).await
    }

    async fn finish(&self, mut run: PipelineRun) -> PipelineRun {
        run.finalize();
        info!(
            run_id = %run.id,
            outcome = %run.outcome,
            exit_code = run.exit_code(),
            fields = run.record.len(),
            "Pipeline finished"
        );
        self.sink
            .emit(
                "pipeline.completed",
                Some(json!({
                    "run_id": run.id.to_string(),
                    "outcome": run.outcome,
                    "exit_code": run.exit_code(),
                    "volumes": run.volumes.len(),
                })),
            )
            .await;
        run
    }
}

/// Folds the reference and every usable volume into the run record.
fn merge_volumes(run: &mut PipelineRun) {
    let mut reference = solve_record(run);
    let volume_records: Vec<&ResultRecord> = run
        .successful_volumes()
        .map(|v| &v.step.report.record)
        .collect();
    align_reference(&mut reference, &volume_records);
    let mut points = Vec::with_capacity(run.volumes.len() + 1);
    if let Some(solve) = &run.solve {
        points.extend(volume_point(solve.request_id, 0.0, &reference));
    }

    let mut records = vec![&reference];
    for volume in run.successful_volumes() {
        records.push(&volume.step.report.record);
        points.extend(volume_point(
            volume.step.request_id,
            volume.structure.delta_percent,
            &volume.step.report.record,
        ));
    }
    let merged = ResultMerger::merge_all(records);

    let failed: Vec<&VolumeStructure> = run
        .volumes
        .iter()
        .filter(|v| v.step.outcome().is_error())
        .map(|v| &v.structure)
        .collect();
    if !failed.is_empty() {
        warn!(run_id = %run.id, ?failed, "Volumes left out of the merged record");
    }

    run.record = merged;
    run.eos_points = points;
}

/// Wraps reference list fields that a volume reports as a scalar, so each
/// merged series holds one entry per solve.
fn align_reference(reference: &mut ResultRecord, volumes: &[&ResultRecord]) {
    let keys: Vec<String> = reference
        .iter()
        .filter(|(key, value)| {
            value.is_list() && volumes.iter().any(|r| r.get(key).is_some_and(|v| !v.is_list()))
        })
        .map(|(key, _)| key.to_string())
        .collect();
    for key in keys {
        if let Some(value) = reference.get_mut(&key) {
            let series = std::mem::replace(value, FieldValue::List(Vec::new()));
            *value = FieldValue::List(vec![series]);
        }
    }
}

fn excepted_report(parser: &dyn ResultParser, message: String) -> StageReport {
    StageReport::new(parser.name()).fail(ErrorKind::ExecutionExcepted, message)
}

fn solve_record(run: &PipelineRun) -> ResultRecord {
    run.solve
        .as_ref()
        .map(|s| s.report.record.clone())
        .unwrap_or_default()
}

fn volume_point(stage_id: Uuid, delta_percent: f64, record: &ResultRecord) -> Option<VolumePoint> {
    let volume_bohr3 = record.get("VolBohr3").and_then(|v| v.as_f64())?;
    let energy_ry = record.get("EtotRyd").and_then(|v| v.as_f64())?;
    Some(VolumePoint {
        stage_id,
        delta_percent,
        volume_bohr3,
        energy_ry,
    })
}
