//! Report rendering: console tables, CSV and JSON export
//!
//! Rendering is kept apart from comparison: [`ReportRow`] flattens a
//! [`ComparisonResult`] into the fixed report fields, and the renderers only
//! format rows.

use crate::experiment::{ExperimentReport, VariantStatus};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use querybench_core::{BenchError, ComparisonResult, Result, VariantSummary};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One comparison, flattened for output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// Baseline variant
    pub baseline: String,
    /// Candidate variant
    pub candidate: String,
    /// Baseline mean elapsed seconds
    pub baseline_mean_secs: f64,
    /// Baseline median elapsed seconds
    pub baseline_median_secs: f64,
    /// Baseline elapsed standard deviation, seconds
    pub baseline_stddev_secs: f64,
    /// Candidate mean elapsed seconds
    pub candidate_mean_secs: f64,
    /// Candidate median elapsed seconds
    pub candidate_median_secs: f64,
    /// Candidate elapsed standard deviation, seconds
    pub candidate_stddev_secs: f64,
    /// Baseline mean logical reads
    pub baseline_mean_logical_reads: f64,
    /// Candidate mean logical reads
    pub candidate_mean_logical_reads: f64,
    /// Elapsed-time improvement, percent (undefined for a zero baseline)
    pub elapsed_improvement_pct: Option<f64>,
    /// Logical-read improvement, percent
    pub logical_read_improvement_pct: Option<f64>,
    /// Comparison is noisy
    pub low_confidence: bool,
}

impl From<&ComparisonResult> for ReportRow {
    fn from(result: &ComparisonResult) -> Self {
        let b = &result.baseline;
        let c = &result.candidate;
        Self {
            baseline: b.variant.clone(),
            candidate: c.variant.clone(),
            baseline_mean_secs: b.elapsed.mean,
            baseline_median_secs: b.elapsed.median,
            baseline_stddev_secs: b.elapsed.stddev,
            candidate_mean_secs: c.elapsed.mean,
            candidate_median_secs: c.elapsed.median,
            candidate_stddev_secs: c.elapsed.stddev,
            baseline_mean_logical_reads: b.logical_reads.mean,
            candidate_mean_logical_reads: c.logical_reads.mean,
            elapsed_improvement_pct: result.elapsed_improvement.map(|v| v * 100.0),
            logical_read_improvement_pct: result.logical_read_improvement.map(|v| v * 100.0),
            low_confidence: result.low_confidence,
        }
    }
}

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Console table
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// CSV with a header row
    Csv,
}

impl FromStr for OutputFormat {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(BenchError::config(format!(
                "unknown output format '{}' (expected table, json or csv)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => f.write_str("table"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Flatten every comparison of a report
pub fn report_rows(report: &ExperimentReport) -> Vec<ReportRow> {
    report.comparisons.iter().map(ReportRow::from).collect()
}

/// Render `report` in `format`.
///
/// JSON carries the full structured report; CSV carries one row per
/// comparison; the table format shows variant summaries, comparisons and
/// failures.
pub fn render(report: &ExperimentReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Csv => rows_to_csv(&report_rows(report)),
        OutputFormat::Table => Ok(report_table(report)),
    }
}

/// Any serializable value as pretty JSON
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| BenchError::config(format!("JSON serialization failed: {}", e)))
}

/// Comparison rows as CSV
pub fn rows_to_csv(rows: &[ReportRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| BenchError::config(format!("CSV serialization failed: {}", e)))?;
    }
    if rows.is_empty() {
        wtr.write_record(CSV_HEADER)
            .map_err(|e| BenchError::config(format!("CSV serialization failed: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| BenchError::config(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| BenchError::config(format!("CSV output not UTF-8: {}", e)))
}

const CSV_HEADER: [&str; 13] = [
    "baseline",
    "candidate",
    "baseline_mean_secs",
    "baseline_median_secs",
    "baseline_stddev_secs",
    "candidate_mean_secs",
    "candidate_median_secs",
    "candidate_stddev_secs",
    "baseline_mean_logical_reads",
    "candidate_mean_logical_reads",
    "elapsed_improvement_pct",
    "logical_read_improvement_pct",
    "low_confidence",
];

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Comparison rows as a console table
pub fn comparison_table(rows: &[ReportRow]) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Baseline",
        "Candidate",
        "Mean (ms)",
        "Median (ms)",
        "Stddev (ms)",
        "Logical reads",
        "Time Δ",
        "Reads Δ",
        "Confidence",
    ]);

    for row in rows {
        let improvement_cell = match row.elapsed_improvement_pct {
            Some(pct) if pct > 0.0 => Cell::new(format_pct(Some(pct))).fg(Color::Green),
            Some(pct) if pct < 0.0 => Cell::new(format_pct(Some(pct))).fg(Color::Red),
            other => Cell::new(format_pct(other)),
        };
        let confidence = if row.low_confidence {
            Cell::new("low").fg(Color::Yellow)
        } else {
            Cell::new("ok")
        };
        table.add_row(vec![
            Cell::new(&row.baseline),
            Cell::new(&row.candidate),
            Cell::new(format!(
                "{} → {}",
                format_ms(row.baseline_mean_secs),
                format_ms(row.candidate_mean_secs)
            )),
            Cell::new(format!(
                "{} → {}",
                format_ms(row.baseline_median_secs),
                format_ms(row.candidate_median_secs)
            )),
            Cell::new(format!(
                "{} / {}",
                format_ms(row.baseline_stddev_secs),
                format_ms(row.candidate_stddev_secs)
            )),
            Cell::new(format!(
                "{:.0} → {:.0}",
                row.baseline_mean_logical_reads, row.candidate_mean_logical_reads
            )),
            improvement_cell,
            Cell::new(format_pct(row.logical_read_improvement_pct)),
            confidence,
        ]);
    }
    table
}

/// Variant summaries as a console table
pub fn summary_table(summaries: &[&VariantSummary]) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Variant", "Tag", "Samples", "Mean (ms)", "Median (ms)", "Stddev (ms)", "Min (ms)",
        "Max (ms)", "Logical reads", "Physical reads", "CPU (ms)",
    ]);
    for s in summaries {
        table.add_row(vec![
            Cell::new(&s.variant),
            Cell::new(s.tag.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(s.count),
            Cell::new(format_ms(s.elapsed.mean)),
            Cell::new(format_ms(s.elapsed.median)),
            Cell::new(format_ms(s.elapsed.stddev)),
            Cell::new(format_ms(s.elapsed.min)),
            Cell::new(format_ms(s.elapsed.max)),
            Cell::new(format!("{:.1}", s.logical_reads.mean)),
            Cell::new(format!("{:.1}", s.mean_physical_reads)),
            Cell::new(s.mean_cpu_secs.map(format_ms).unwrap_or_else(|| "-".to_string())),
        ]);
    }
    table
}

/// Full console report: summaries, comparisons, then failures
pub fn report_table(report: &ExperimentReport) -> String {
    let summaries: Vec<&VariantSummary> = report.variants.iter().filter_map(|o| o.summary()).collect();
    let mut out = String::new();

    if !summaries.is_empty() {
        out.push_str(&summary_table(&summaries).to_string());
        out.push('\n');
    }

    let rows = report_rows(report);
    if !rows.is_empty() {
        out.push_str(&comparison_table(&rows).to_string());
        out.push('\n');
    }

    for outcome in report.failures() {
        let line = match &outcome.status {
            VariantStatus::Aborted {
                phase,
                iteration,
                error,
            } => format!(
                "FAILED {}: aborted at {} iteration {} with {} samples collected: {}",
                outcome.variant,
                phase,
                iteration,
                outcome.samples.len(),
                error
            ),
            VariantStatus::InsufficientSamples { count } => format!(
                "FAILED {}: only {} measured samples, at least 2 required",
                outcome.variant, count
            ),
            VariantStatus::NotStarted { reason } => {
                format!("FAILED {}: not started: {}", outcome.variant, reason)
            }
            VariantStatus::Completed { .. } => continue,
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn format_ms(secs: f64) -> String {
    format!("{:.3}", secs * 1_000.0)
}

fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{:+.1}%", p),
        None => "n/a".to_string(),
    }
}
