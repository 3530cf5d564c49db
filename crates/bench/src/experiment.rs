//! Experiment orchestration
//!
//! Runs every registered variant, aggregates the successful runs and
//! compares each candidate against each baseline. Every variant gets its own
//! fresh connection checkout. With `parallel_variants` enabled, variants run
//! concurrently, one thread per variant; otherwise they run one after the
//! other in registration order. A variant with setup or teardown statements
//! changes what the others would measure, so its presence forces the whole
//! experiment to run sequentially.
//!
//! A failed variant never stops the experiment: its outcome records the
//! failure (and any partial samples), and comparisons involving it are
//! omitted.

use crate::aggregate::summarize;
use crate::compare::Comparator;
use crate::registry::VariantRegistry;
use crate::runner::{BenchmarkRunner, RunOptions};
use chrono::{DateTime, Utc};
use querybench_core::{
    BenchError, Checkout, ComparisonResult, ConnectionFactory, EngineError, ExecutionSample,
    HarnessConfig, Params, QueryVariant, RunPhase, VariantSummary, VariantTag,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How one variant's run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariantStatus {
    /// Run finished and was aggregated
    Completed {
        /// Aggregate over the measured samples
        summary: VariantSummary,
    },
    /// An execution failed part-way through
    Aborted {
        /// Phase of the failing statement
        phase: RunPhase,
        /// Raw iteration of the failing execution
        iteration: usize,
        /// Engine error
        error: EngineError,
    },
    /// Run finished with too few samples to aggregate
    InsufficientSamples {
        /// Samples collected
        count: usize,
    },
    /// Run never started (no connection, bad parameters)
    NotStarted {
        /// Why
        reason: String,
    },
}

/// Result of running one variant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    /// Variant name
    pub variant: String,
    /// Variant role
    pub tag: VariantTag,
    /// How the run ended
    #[serde(flatten)]
    pub status: VariantStatus,
    /// Measured samples, partial for aborted runs
    pub samples: Vec<ExecutionSample>,
}

impl VariantOutcome {
    /// Summary, for completed runs
    pub fn summary(&self) -> Option<&VariantSummary> {
        match &self.status {
            VariantStatus::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    /// Whether the run completed
    pub fn is_success(&self) -> bool {
        self.summary().is_some()
    }
}

/// Structured result of a whole experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    /// When the experiment started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration
    pub elapsed: Duration,
    /// One outcome per variant, in registration order
    pub variants: Vec<VariantOutcome>,
    /// Candidate-vs-baseline comparisons over completed variants
    pub comparisons: Vec<ComparisonResult>,
}

impl ExperimentReport {
    /// Every variant completed
    pub fn is_success(&self) -> bool {
        self.variants.iter().all(VariantOutcome::is_success)
    }

    /// Outcome for `variant`
    pub fn outcome(&self, variant: &str) -> Option<&VariantOutcome> {
        self.variants.iter().find(|o| o.variant == variant)
    }

    /// Outcomes of variants that did not complete
    pub fn failures(&self) -> impl Iterator<Item = &VariantOutcome> {
        self.variants.iter().filter(|o| !o.is_success())
    }

    /// Comparison of `candidate` against `baseline`
    pub fn comparison(&self, baseline: &str, candidate: &str) -> Option<&ComparisonResult> {
        self.comparisons
            .iter()
            .find(|c| c.baseline.variant == baseline && c.candidate.variant == candidate)
    }
}

/// A set of variants benchmarked under one configuration
pub struct Experiment {
    registry: Arc<VariantRegistry>,
    params: HashMap<String, Params>,
    config: HarnessConfig,
}

impl Experiment {
    /// Experiment over every variant in `registry`
    pub fn new(registry: Arc<VariantRegistry>, config: HarnessConfig) -> Self {
        Self {
            registry,
            params: HashMap::new(),
            config,
        }
    }

    /// Bind parameters for `variant` (default: none)
    pub fn with_params(mut self, variant: impl Into<String>, params: impl Into<Params>) -> Self {
        self.params.insert(variant.into(), params.into());
        self
    }

    /// Harness configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the experiment.
    ///
    /// Failures are reported per variant in the returned report.
    pub fn run(&self, factory: &dyn ConnectionFactory) -> ExperimentReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let variants = self.registry.all();
        let runner = BenchmarkRunner::new(RunOptions::from(&self.config));
        let stateful: Vec<&str> = variants
            .iter()
            .filter(|v| v.changes_state())
            .map(|v| v.name.as_str())
            .collect();
        let parallel = self.config.parallel_variants && variants.len() > 1 && stateful.is_empty();
        if self.config.parallel_variants && !stateful.is_empty() {
            warn!(target: "querybench::experiment", variants = ?stateful, "Variants with setup or teardown present; running sequentially");
        }
        info!(target: "querybench::experiment", variants = variants.len(), parallel, "Starting experiment");

        let outcomes: Vec<VariantOutcome> = if parallel {
            thread::scope(|scope| {
                let handles: Vec<_> = variants
                    .iter()
                    .map(|variant| {
                        let runner = &runner;
                        scope.spawn(move || self.run_variant(runner, factory, variant))
                    })
                    .collect();
                handles
                    .into_iter()
                    .zip(variants.iter())
                    .map(|(handle, variant)| {
                        handle.join().unwrap_or_else(|_| VariantOutcome {
                            variant: variant.name.clone(),
                            tag: variant.tag,
                            status: VariantStatus::NotStarted {
                                reason: "benchmark thread panicked".to_string(),
                            },
                            samples: Vec::new(),
                        })
                    })
                    .collect()
            })
        } else {
            variants
                .iter()
                .map(|variant| self.run_variant(&runner, factory, variant))
                .collect()
        };

        let comparator = Comparator::from(&self.config);
        let mut comparisons = Vec::new();
        for baseline in outcomes.iter().filter(|o| o.tag == VariantTag::Baseline) {
            for candidate in outcomes.iter().filter(|o| o.tag == VariantTag::Candidate) {
                if let (Some(b), Some(c)) = (baseline.summary(), candidate.summary()) {
                    comparisons.push(comparator.compare(b, c));
                }
            }
        }

        let report = ExperimentReport {
            started_at,
            elapsed: start.elapsed(),
            variants: outcomes,
            comparisons,
        };
        info!(target: "querybench::experiment", completed = report.variants.iter().filter(|o| o.is_success()).count(), failed = report.failures().count(), comparisons = report.comparisons.len(), elapsed_ms = report.elapsed.as_millis() as u64, "Experiment finished");
        report
    }

    fn run_variant(
        &self,
        runner: &BenchmarkRunner,
        factory: &dyn ConnectionFactory,
        variant: &QueryVariant,
    ) -> VariantOutcome {
        let outcome = |status: VariantStatus, samples: Vec<ExecutionSample>| VariantOutcome {
            variant: variant.name.clone(),
            tag: variant.tag,
            status,
            samples,
        };

        let mut conn = match Checkout::acquire(factory, format!("variant {}", variant.name)) {
            Ok(conn) => conn,
            Err(e) => {
                error!(target: "querybench::experiment", variant = %variant.name, error = %e, "Could not open connection");
                return outcome(
                    VariantStatus::NotStarted {
                        reason: e.to_string(),
                    },
                    Vec::new(),
                );
            }
        };

        let empty = Params::none();
        let params = self.params.get(&variant.name).unwrap_or(&empty);
        match runner.run(&mut *conn, variant, params) {
            Ok(record) => match summarize(&variant.name, Some(variant.tag), &record.samples) {
                Ok(summary) => outcome(VariantStatus::Completed { summary }, record.samples),
                Err(_) => {
                    warn!(target: "querybench::experiment", variant = %variant.name, samples = record.samples.len(), "Too few samples to summarize");
                    outcome(
                        VariantStatus::InsufficientSamples {
                            count: record.samples.len(),
                        },
                        record.samples,
                    )
                }
            },
            Err(BenchError::RunAborted(aborted)) => outcome(
                VariantStatus::Aborted {
                    phase: aborted.phase,
                    iteration: aborted.iteration,
                    error: aborted.source,
                },
                aborted.samples,
            ),
            Err(other) => outcome(
                VariantStatus::NotStarted {
                    reason: other.to_string(),
                },
                Vec::new(),
            ),
        }
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
