//! Load report and generated-row formatting.
//!
//! Experiment reports are rendered by `querybench_bench::report`; this module
//! covers what only the CLI prints: the per-table load report and CSV rows
//! from the generator.

use std::io::Write;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use querybench_bench::OutputFormat;
use querybench_dataset::{LoadReport, TableLoadOutcome, TableLoadStatus, TableRows};

/// Render a load report.
pub fn format_load_report(report: &LoadReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => load_report_csv(report),
        OutputFormat::Table => Ok(load_report_table(report)),
    }
}

fn status_name(status: &TableLoadStatus) -> &'static str {
    match status {
        TableLoadStatus::Loaded(_) => "loaded",
        TableLoadStatus::Failed(_) => "failed",
        TableLoadStatus::Skipped { .. } => "skipped",
    }
}

fn detail(outcome: &TableLoadOutcome) -> String {
    match &outcome.status {
        TableLoadStatus::Loaded(_) => String::new(),
        TableLoadStatus::Failed(failure) => format!(
            "batch {} failed after {} attempts: {}",
            failure.batch_index, failure.attempts, failure.source
        ),
        TableLoadStatus::Skipped { parent } => format!("parent '{}' not loaded", parent),
    }
}

/// (batches, retries, elapsed ms) for loaded tables
fn counters(outcome: &TableLoadOutcome) -> Option<(u64, usize, f64)> {
    match &outcome.status {
        TableLoadStatus::Loaded(stats) => Some((
            stats.batches,
            stats.retries,
            stats.elapsed.as_secs_f64() * 1_000.0,
        )),
        _ => None,
    }
}

fn load_report_table(report: &LoadReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        "Table",
        "Status",
        "Rows",
        "Batches",
        "Retries",
        "Elapsed (ms)",
        "Detail",
    ]);

    for outcome in &report.tables {
        let status = status_name(&outcome.status);
        let status_cell = match outcome.status {
            TableLoadStatus::Loaded(_) => Cell::new(status).fg(Color::Green),
            TableLoadStatus::Failed(_) => Cell::new(status).fg(Color::Red),
            TableLoadStatus::Skipped { .. } => Cell::new(status).fg(Color::Yellow),
        };
        let (batches, retries, elapsed) = match counters(outcome) {
            Some((b, r, e)) => (b.to_string(), r.to_string(), format!("{:.1}", e)),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(&outcome.table),
            status_cell,
            Cell::new(outcome.rows_committed()),
            Cell::new(batches),
            Cell::new(retries),
            Cell::new(elapsed),
            Cell::new(detail(outcome)),
        ]);
    }

    format!(
        "{}\n{} rows in {:.2}s",
        table,
        report.total_rows(),
        report.elapsed.as_secs_f64()
    )
}

fn load_report_csv(report: &LoadReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["table", "status", "rows", "batches", "retries", "elapsed_ms", "detail"])?;
    for outcome in &report.tables {
        let (batches, retries, elapsed) = match counters(outcome) {
            Some((b, r, e)) => (b.to_string(), r.to_string(), format!("{:.3}", e)),
            None => (String::new(), String::new(), String::new()),
        };
        wtr.write_record([
            outcome.table.clone(),
            status_name(&outcome.status).to_string(),
            outcome.rows_committed().to_string(),
            batches,
            retries,
            elapsed,
            detail(outcome),
        ])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Write generated rows as CSV with a header of column names.
///
/// NULL is written as an empty field.
pub fn write_rows_csv<W: Write>(out: W, rows: TableRows, limit: Option<u64>) -> anyhow::Result<u64> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(rows.table().column_names())?;
    let limit = limit.unwrap_or(u64::MAX);
    let mut written = 0u64;
    for row in rows.take(usize::try_from(limit).unwrap_or(usize::MAX)) {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}
