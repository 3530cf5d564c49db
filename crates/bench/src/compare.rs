//! Baseline vs candidate comparison
//!
//! The confidence flag is a variance heuristic, not a significance test: a
//! comparison is flagged when either side's relative standard deviation of
//! elapsed time exceeds the threshold, or either side has fewer samples than
//! the configured minimum.

use querybench_core::{ComparisonResult, ConfidenceNote, HarnessConfig, VariantSummary};
use tracing::debug;

/// Compares two variant summaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparator {
    threshold: f64,
    min_samples: usize,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for Comparator {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            threshold: config.low_confidence_threshold,
            min_samples: config.min_confident_samples,
        }
    }
}

impl Comparator {
    /// Comparator with the given relative-stddev threshold
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Set the sample count below which results are low confidence
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Relative-stddev threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare `candidate` against `baseline`
    pub fn compare(&self, baseline: &VariantSummary, candidate: &VariantSummary) -> ComparisonResult {
        let elapsed_improvement = improvement(baseline.mean_elapsed(), candidate.mean_elapsed());
        let logical_read_improvement =
            improvement(baseline.mean_logical_reads(), candidate.mean_logical_reads());

        let mut notes = Vec::new();
        for summary in [baseline, candidate] {
            let rsd = summary.elapsed.relative_stddev();
            if rsd > self.threshold {
                notes.push(ConfidenceNote::HighVariance {
                    variant: summary.variant.clone(),
                    relative_stddev: rsd,
                    threshold: self.threshold,
                });
            }
            if summary.count < self.min_samples {
                notes.push(ConfidenceNote::FewSamples {
                    variant: summary.variant.clone(),
                    count: summary.count,
                    minimum: self.min_samples,
                });
            }
        }

        debug!(target: "querybench::compare", baseline = %baseline.variant, candidate = %candidate.variant, improvement = ?elapsed_improvement, low_confidence = !notes.is_empty(), "Compared variants");

        ComparisonResult {
            baseline: baseline.clone(),
            candidate: candidate.clone(),
            elapsed_improvement,
            logical_read_improvement,
            low_confidence: !notes.is_empty(),
            notes,
        }
    }
}

/// `(baseline - candidate) / baseline`.
///
/// Positive when the candidate is cheaper. `None` when the baseline is zero
/// and the candidate is not; zero when both are zero.
pub fn improvement(baseline: f64, candidate: f64) -> Option<f64> {
    if baseline == 0.0 {
        (candidate == 0.0).then_some(0.0)
    } else {
        Some((baseline - candidate) / baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybench_core::{DistributionStats, VariantTag};

    fn summary(name: &str, mean: f64, stddev: f64, reads: f64, count: usize) -> VariantSummary {
        VariantSummary {
            variant: name.to_string(),
            tag: Some(VariantTag::Baseline),
            count,
            elapsed: DistributionStats {
                mean,
                median: mean,
                stddev,
                min: mean - stddev,
                max: mean + stddev,
            },
            logical_reads: DistributionStats {
                mean: reads,
                median: reads,
                stddev: 0.0,
                min: reads,
                max: reads,
            },
            mean_physical_reads: 0.0,
            mean_cpu_secs: None,
        }
    }

    #[test]
    fn test_ten_vs_two_seconds() {
        let result = Comparator::new(0.25).compare(
            &summary("slow", 10.0, 0.1, 1000.0, 10),
            &summary("fast", 2.0, 0.02, 100.0, 10),
        );
        assert!((result.elapsed_improvement.unwrap() - 0.80).abs() < 1e-12);
        assert!((result.logical_read_improvement.unwrap() - 0.90).abs() < 1e-12);
        assert!(!result.low_confidence);
        assert!(result.notes.is_empty());
    }

    #[test]
    fn test_identical_summaries_zero_improvement() {
        let s = summary("v", 3.0, 0.1, 50.0, 10);
        let result = Comparator::default().compare(&s, &s);
        assert_eq!(result.elapsed_improvement, Some(0.0));
        assert_eq!(result.logical_read_improvement, Some(0.0));
    }

    #[test]
    fn test_regression_is_negative() {
        let result = Comparator::default().compare(
            &summary("b", 1.0, 0.0, 10.0, 10),
            &summary("c", 1.5, 0.0, 10.0, 10),
        );
        assert!((result.elapsed_improvement.unwrap() + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_high_variance_flags_low_confidence() {
        let result = Comparator::new(0.25).compare(
            &summary("b", 1.0, 0.5, 10.0, 10),
            &summary("c", 1.0, 0.01, 10.0, 10),
        );
        assert!(result.low_confidence);
        assert_eq!(
            result.notes,
            vec![ConfidenceNote::HighVariance {
                variant: "b".into(),
                relative_stddev: 0.5,
                threshold: 0.25,
            }]
        );
    }

    #[test]
    fn test_few_samples_flag_low_confidence() {
        let result = Comparator::new(0.25)
            .with_min_samples(5)
            .compare(&summary("b", 1.0, 0.0, 1.0, 10), &summary("c", 1.0, 0.0, 1.0, 2));
        assert!(result.low_confidence);
        assert!(matches!(
            result.notes[0],
            ConfidenceNote::FewSamples { count: 2, minimum: 5, .. }
        ));
    }

    #[test]
    fn test_zero_baseline() {
        assert_eq!(improvement(0.0, 0.0), Some(0.0));
        assert_eq!(improvement(0.0, 1.0), None);
    }

    #[test]
    fn test_inputs_untouched() {
        let b = summary("b", 2.0, 0.1, 10.0, 10);
        let c = summary("c", 1.0, 0.1, 5.0, 10);
        let (b0, c0) = (b.clone(), c.clone());
        let result = Comparator::default().compare(&b, &c);
        assert_eq!(b, b0);
        assert_eq!(c, c0);
        assert_eq!(result.baseline, b0);
    }
}
