//! Measurement records: raw samples, per-variant summaries, comparisons

use crate::variant::VariantTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One measured execution of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSample {
    /// Zero-based raw iteration (warm-up executions included)
    pub iteration: usize,
    /// Wall-clock time around the engine call (monotonic clock)
    pub elapsed: Duration,
    /// Execution time as reported by the engine
    pub engine_elapsed: Duration,
    /// CPU time as reported by the engine, when exposed
    pub cpu_time: Option<Duration>,
    /// Logical (buffer/page) reads reported by the engine
    pub logical_reads: u64,
    /// Physical reads reported by the engine
    pub physical_reads: u64,
    /// Rows returned or affected
    pub rows: u64,
    /// When the execution started
    pub timestamp: DateTime<Utc>,
}

impl ExecutionSample {
    /// Wall-clock elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Mean/median/spread of one metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionStats {
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub stddev: f64,
    /// Minimum
    pub min: f64,
    /// Maximum
    pub max: f64,
}

impl DistributionStats {
    /// Standard deviation relative to the mean.
    ///
    /// Zero when there is no spread; infinite for a zero mean with spread.
    pub fn relative_stddev(&self) -> f64 {
        if self.stddev == 0.0 {
            0.0
        } else if self.mean == 0.0 {
            f64::INFINITY
        } else {
            self.stddev / self.mean.abs()
        }
    }
}

/// Aggregate over the measured samples of one variant
///
/// Always recomputed from samples; never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    /// Variant name
    pub variant: String,
    /// Variant role, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<VariantTag>,
    /// Number of samples aggregated
    pub count: usize,
    /// Wall-clock elapsed time, seconds
    pub elapsed: DistributionStats,
    /// Logical reads per execution
    pub logical_reads: DistributionStats,
    /// Mean physical reads per execution
    pub mean_physical_reads: f64,
    /// Mean engine CPU time in seconds, if every sample reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_cpu_secs: Option<f64>,
}

impl VariantSummary {
    /// Mean elapsed seconds
    pub fn mean_elapsed(&self) -> f64 {
        self.elapsed.mean
    }

    /// Mean logical reads
    pub fn mean_logical_reads(&self) -> f64 {
        self.logical_reads.mean
    }
}

/// Why a comparison was flagged as low confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConfidenceNote {
    /// Elapsed-time relative stddev above the threshold
    HighVariance {
        /// Noisy variant
        variant: String,
        /// Observed stddev / mean
        relative_stddev: f64,
        /// Configured threshold
        threshold: f64,
    },
    /// Fewer samples than the configured minimum
    FewSamples {
        /// Variant with too few samples
        variant: String,
        /// Samples available
        count: usize,
        /// Configured minimum
        minimum: usize,
    },
}

/// Baseline vs candidate comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Baseline summary
    pub baseline: VariantSummary,
    /// Candidate summary
    pub candidate: VariantSummary,
    /// `(baseline - candidate) / baseline` on mean elapsed time;
    /// `None` when the baseline mean is zero and the candidate's is not
    pub elapsed_improvement: Option<f64>,
    /// Same ratio on mean logical reads
    pub logical_read_improvement: Option<f64>,
    /// Comparison is noisy; more iterations are advised
    pub low_confidence: bool,
    /// Reasons behind `low_confidence`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<ConfidenceNote>,
}
