//! Properties of aggregation and comparison, plus runner scenarios against
//! the recording engine.

use chrono::{TimeZone, Utc};
use proptest::collection::vec;
use proptest::prelude::*;
use querybench_bench::{
    summarize, BenchmarkRunner, Comparator, Experiment, RunOptions, VariantRegistry,
};
use querybench_core::testing::RecordingEngine;
use querybench_core::testing::RecordingFactory;
use querybench_core::{
    BenchError, ExecutionSample, HarnessConfig, Params, QueryVariant, VariantTag,
};
use std::sync::Arc;
use std::time::Duration;

fn samples_from(raw: &[(u64, u64, Option<u64>)]) -> Vec<ExecutionSample> {
    raw.iter()
        .enumerate()
        .map(|(i, &(micros, reads, cpu))| ExecutionSample {
            iteration: i,
            elapsed: Duration::from_micros(micros),
            engine_elapsed: Duration::from_micros(micros),
            cpu_time: cpu.map(Duration::from_micros),
            logical_reads: reads,
            physical_reads: reads / 4,
            rows: 1,
            timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
        })
        .collect()
}

fn raw_samples() -> impl Strategy<Value = Vec<(u64, u64, Option<u64>)>> {
    vec((2u64..5_000_000, 0u64..1_000_000, proptest::option::of(1u64..1_000_000)), 2..64)
}

proptest! {
    #[test]
    fn aggregation_is_idempotent(raw in raw_samples()) {
        let samples = samples_from(&raw);
        let a = summarize("v", Some(VariantTag::Baseline), &samples).unwrap();
        let b = summarize("v", Some(VariantTag::Baseline), &samples).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn summary_bounds_hold(raw in raw_samples()) {
        let samples = samples_from(&raw);
        let s = summarize("v", None, &samples).unwrap();
        prop_assert!(s.elapsed.min <= s.elapsed.median && s.elapsed.median <= s.elapsed.max);
        prop_assert!(s.elapsed.min <= s.elapsed.mean + 1e-12 && s.elapsed.mean <= s.elapsed.max + 1e-12);
        prop_assert!(s.elapsed.stddev >= 0.0);
        prop_assert_eq!(s.count, samples.len());
    }

    #[test]
    fn identical_summaries_never_improve(raw in raw_samples(), threshold in 0.01f64..2.0) {
        let samples = samples_from(&raw);
        let s = summarize("v", None, &samples).unwrap();
        let result = Comparator::new(threshold).compare(&s, &s);
        prop_assert_eq!(result.elapsed_improvement, Some(0.0));
        prop_assert_eq!(result.logical_read_improvement.unwrap_or(0.0), 0.0);
    }

    #[test]
    fn faster_candidate_improves(raw in raw_samples(), factor in 2u64..10) {
        let baseline = samples_from(&raw);
        let faster: Vec<(u64, u64, Option<u64>)> = raw.iter().map(|&(m, r, c)| ((m / factor).max(1), r, c)).collect();
        let b = summarize("b", None, &baseline).unwrap();
        let c = summarize("c", None, &samples_from(&faster)).unwrap();
        let result = Comparator::default().compare(&b, &c);
        prop_assert!(result.elapsed_improvement.unwrap() > 0.0);
    }
}

#[test]
fn one_sample_is_insufficient() {
    let samples = samples_from(&[(100, 1, None)]);
    assert!(matches!(
        summarize("v", None, &samples),
        Err(BenchError::InsufficientSamples { count: 1, .. })
    ));
}

#[test]
fn warmup_two_measured_five() {
    let mut engine = RecordingEngine::new();
    let runner = BenchmarkRunner::new(RunOptions {
        warmup: 2,
        iterations: 5,
        timeout: Some(Duration::from_secs(5)),
    });
    let variant = QueryVariant::baseline("scan", "SELECT * FROM orders");
    let record = runner.run(&mut engine, &variant, &Params::none()).unwrap();

    assert_eq!(record.samples.len(), 5);
    assert_eq!(record.warmup, 2);
    // The recording engine reports 10 and 20 logical reads for the two
    // discarded executions; every kept sample must differ from both.
    for sample in &record.samples {
        assert_ne!(sample.logical_reads, 10);
        assert_ne!(sample.logical_reads, 20);
        assert!(sample.iteration >= 2);
    }
}

#[test]
fn reregistered_variant_wins() {
    let mut registry = VariantRegistry::new();
    registry.register(QueryVariant::baseline("baseline", "SELECT 1 -- v1"));
    registry.register(QueryVariant::baseline("baseline", "SELECT 1 -- v2"));
    assert_eq!(registry.get("baseline").unwrap().sql, "SELECT 1 -- v2");
}

#[test]
fn experiment_compares_candidate_to_baseline() {
    let engine = RecordingEngine::new();
    let factory = RecordingFactory::new(engine.clone());
    let mut registry = VariantRegistry::new();
    registry.register(QueryVariant::baseline("scan", "SELECT * FROM orders"));
    registry.register(QueryVariant::candidate("covering", "SELECT id FROM orders"));

    let config = HarnessConfig {
        warmup_iterations: 0,
        measured_iterations: 3,
        per_execution_timeout_ms: 0,
        ..Default::default()
    };
    let report = Experiment::new(Arc::new(registry), config).run(&factory);
    assert!(report.is_success());

    // Logical reads grow with every call on the recording engine, so the
    // candidate (run second) reads more than the baseline.
    let cmp = report.comparison("scan", "covering").unwrap();
    assert!(cmp.logical_read_improvement.unwrap() < 0.0);
}
