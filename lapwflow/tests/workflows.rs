//! Workflow runs through the public API.

use lapwflow::prelude::*;
use lapwflow::testing::fixtures::{self, ScfFixture};
use lapwflow::testing::{assert_pipeline_outcome, assert_record_float, ScriptedResponse};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;

const EOS_CONFIG: &str = r#"{
    "volume_deltas": [-4.0, 0.0, 4.0],
    "init_options": {"-b": true, "-vxc": "13", "-ecut": "-6.0", "-numk": "1000"},
    "solve_options": {"-ec": "0.0001", "-i": "60"},
    "solve_mode": "precision_cascade",
    "warning_threshold": 60
}"#;

#[test]
fn test_scf_from_blocking_context() {
    let run = tokio_test::block_on(
        PipelineOrchestrator::new(fixtures::scf_executor()).run_scf(fixtures::SI_STRUCT),
    )
    .unwrap();

    assert_eq!(run.workflow, Workflow::Scf);
    assert_pipeline_outcome(&run, PipelineOutcome::Clean);
    assert_record_float(&run.record, "EtotRyd", fixtures::REFERENCE_ENERGY);
}

#[tokio::test]
async fn test_eos_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EOS_CONFIG.as_bytes()).unwrap();
    let config = PipelineConfig::from_path(file.path()).unwrap();

    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = PipelineOrchestrator::new(fixtures::eos_executor())
        .with_config(config)
        .with_event_sink(sink.clone());
    let run = orchestrator.run_eos(fixtures::SI_STRUCT).await.unwrap();

    assert_pipeline_outcome(&run, PipelineOutcome::Clean);
    assert_eq!(run.volumes.len(), 2);
    assert_eq!(run.eos_points.len(), 3);

    let submitted = orchestrator.executor().submitted();
    assert_eq!(
        submitted[1].command_line(),
        vec!["init_lapw", "-b", "-vxc", "13", "-ecut", "-6.0", "-numk", "1000"]
    );
    assert_eq!(submitted[2].kind, StepKind::SolveCascade);
    assert_eq!(submitted[3].stdin.as_deref(), Some("1\n2\n-4.0\n4.0"));
    assert!(submitted[4..]
        .iter()
        .all(|r| r.kind == StepKind::SolveAtVolume
            && r.command_line() == vec!["run_lapw", "-ec", "0.0001", "-i", "60"]));

    let halted = sink.events_of_type("pipeline.halted");
    assert!(halted.is_empty());
}

#[tokio::test]
async fn test_scf123_refinement_warning() {
    let mut cascade = fixtures::cascade_files();
    cascade.extend(
        &ScfFixture::new()
            .iterations(4)
            .with_energy(-580.7)
            .with_warning(fixtures::QTL_B_WARNING)
            .stage_files(Precision::Prec2),
    );
    let executor = fixtures::scf_executor()
        .on(StepKind::SolveCascade, ScriptedResponse::complete(cascade));

    let run = PipelineOrchestrator::new(executor)
        .run_scf123(fixtures::SI_STRUCT)
        .await
        .unwrap();

    assert_pipeline_outcome(&run, PipelineOutcome::Warning);
    let solve = run.solve.as_ref().unwrap();
    assert_eq!(solve.outcome(), StageOutcome::Warning(WarningKind::QtlB));
    assert_eq!(solve.report.exit_code(), 322);
}

#[tokio::test]
async fn test_scf_halts_on_missing_output() {
    let executor = fixtures::scf_executor()
        .on(StepKind::Symmetrize, ScriptedResponse::complete(MemoryFileSet::new()));
    let orchestrator = PipelineOrchestrator::new(executor);

    let run = orchestrator.run_scf(fixtures::SI_STRUCT).await.unwrap();

    assert_pipeline_outcome(&run, PipelineOutcome::Error);
    assert_eq!(run.halted_at, Some(StepKind::Symmetrize));
    assert_eq!(
        run.symmetrize.as_ref().map(StepRecord::outcome),
        Some(StageOutcome::Error(ErrorKind::MissingOutput))
    );
    assert_eq!(orchestrator.executor().submitted().len(), 1);
}
