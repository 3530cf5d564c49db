//! Metrics aggregation
//!
//! Pure functions from measured samples to a [`VariantSummary`]. The input
//! order is never changed; medians are taken from a sorted copy.

use querybench_core::{
    BenchError, DistributionStats, ExecutionSample, Result, VariantSummary, VariantTag,
};

/// Minimum samples for a sample standard deviation
pub const MIN_SAMPLES: usize = 2;

/// Summarize the measured samples of one variant.
///
/// # Errors
///
/// `InsufficientSamples` when fewer than two samples are given.
pub fn summarize(
    variant: &str,
    tag: Option<VariantTag>,
    samples: &[ExecutionSample],
) -> Result<VariantSummary> {
    if samples.len() < MIN_SAMPLES {
        return Err(BenchError::InsufficientSamples {
            variant: variant.to_string(),
            count: samples.len(),
        });
    }

    let elapsed: Vec<f64> = samples.iter().map(ExecutionSample::elapsed_secs).collect();
    let logical: Vec<f64> = samples.iter().map(|s| s.logical_reads as f64).collect();
    let physical: Vec<f64> = samples.iter().map(|s| s.physical_reads as f64).collect();
    let cpu: Option<Vec<f64>> = samples
        .iter()
        .map(|s| s.cpu_time.map(|d| d.as_secs_f64()))
        .collect();

    Ok(VariantSummary {
        variant: variant.to_string(),
        tag,
        count: samples.len(),
        elapsed: distribution(&elapsed),
        logical_reads: distribution(&logical),
        mean_physical_reads: mean(&physical),
        mean_cpu_secs: cpu.map(|values| mean(&values)),
    })
}

/// Mean, median, sample standard deviation, min and max of `values`.
///
/// `values` must be non-empty; a single value has zero spread.
pub fn distribution(values: &[f64]) -> DistributionStats {
    let mean = mean(values);
    let stddev = if values.len() < 2 {
        0.0
    } else {
        let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (sum_sq / (values.len() - 1) as f64).sqrt()
    };

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    DistributionStats {
        mean,
        median,
        stddev,
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn sample(iteration: usize, millis: u64, logical_reads: u64) -> ExecutionSample {
        ExecutionSample {
            iteration,
            elapsed: Duration::from_millis(millis),
            engine_elapsed: Duration::from_millis(millis),
            cpu_time: None,
            logical_reads,
            physical_reads: logical_reads / 10,
            rows: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_single_sample_insufficient() {
        let err = summarize("v", None, &[sample(0, 10, 100)]).unwrap_err();
        assert!(matches!(
            err,
            BenchError::InsufficientSamples { ref variant, count: 1 } if variant == "v"
        ));
        assert!(summarize("v", None, &[]).is_err());
    }

    #[test]
    fn test_mean_median_stddev() {
        let samples = vec![
            sample(0, 400, 40),
            sample(1, 100, 10),
            sample(2, 300, 30),
            sample(3, 200, 20),
        ];
        let summary = summarize("v", Some(VariantTag::Baseline), &samples).unwrap();
        assert_eq!(summary.count, 4);
        assert!((summary.elapsed.mean - 0.25).abs() < 1e-12);
        assert!((summary.elapsed.median - 0.25).abs() < 1e-12);
        // Sample stddev of 0.1, 0.2, 0.3, 0.4
        assert!((summary.elapsed.stddev - 0.129_099_444_873_580_56).abs() < 1e-9);
        assert_eq!(summary.elapsed.min, 0.1);
        assert_eq!(summary.elapsed.max, 0.4);
        assert!((summary.logical_reads.mean - 25.0).abs() < 1e-12);
        assert!((summary.mean_physical_reads - 2.5).abs() < 1e-12);
        assert_eq!(summary.mean_cpu_secs, None);
    }

    #[test]
    fn test_input_order_preserved() {
        let samples = vec![sample(0, 30, 3), sample(1, 10, 1), sample(2, 20, 2)];
        let before = samples.clone();
        let summary = summarize("v", None, &samples).unwrap();
        assert_eq!(samples, before);
        assert!((summary.elapsed.median - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_cpu_mean_only_when_all_present() {
        let mut samples = vec![sample(0, 10, 1), sample(1, 10, 1)];
        samples[0].cpu_time = Some(Duration::from_millis(4));
        assert_eq!(summarize("v", None, &samples).unwrap().mean_cpu_secs, None);
        samples[1].cpu_time = Some(Duration::from_millis(6));
        let cpu = summarize("v", None, &samples).unwrap().mean_cpu_secs.unwrap();
        assert!((cpu - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_identical_samples_zero_spread() {
        let samples = vec![sample(0, 50, 5); 3];
        let summary = summarize("v", None, &samples).unwrap();
        assert_eq!(summary.elapsed.stddev, 0.0);
        assert_eq!(summary.elapsed.relative_stddev(), 0.0);
    }
}
