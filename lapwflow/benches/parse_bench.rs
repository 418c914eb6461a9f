//! Benchmarks for log parsing and stage classification.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lapwflow::parsing::{extract_last_iteration, similarity, LogField, WarningClassifier};
use lapwflow::stages::{PrecisionCascade, StageContract, StageResultParser};
use lapwflow::testing::fixtures::{self, ScfFixture};

fn parsing_benchmark(c: &mut Criterion) {
    let history: Vec<(u32, f64)> = (1..=200).map(|i| (i, -580.0 - f64::from(i) * 1e-3)).collect();
    let scfm = fixtures::scf_iterations(&history);

    c.bench_function("last_iteration_200", |b| {
        b.iter(|| {
            extract_last_iteration(black_box(&scfm), &[LogField::Iteration, LogField::TotalEnergy])
        });
    });

    c.bench_function("similarity_qtl_b", |b| {
        b.iter(|| {
            similarity(
                black_box(fixtures::QTL_B_WARNING),
                black_box(fixtures::VK_COUL_WARNING),
            )
        });
    });

    let classifier = WarningClassifier::new();
    c.bench_function("classify_warning", |b| {
        b.iter(|| classifier.classify_or_other(black_box(fixtures::QTL_B_WARNING)));
    });
}

fn stage_benchmark(c: &mut Criterion) {
    let single = ScfFixture::new().with_warning(fixtures::QTL_B_WARNING).files("case");
    let parser = StageResultParser::new(StageContract::single_precision());
    c.bench_function("single_precision_stage", |b| {
        b.iter(|| parser.parse_files(black_box(&single)));
    });

    let cascade = fixtures::cascade_files();
    let aggregator = PrecisionCascade::new();
    c.bench_function("precision_cascade", |b| {
        b.iter(|| aggregator.aggregate(black_box(&cascade)));
    });
}

criterion_group!(benches, parsing_benchmark, stage_benchmark);
criterion_main!(benches);
