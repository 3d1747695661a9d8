//! Display formatting for scan reports
//!
//! The table is built as a string so it can be snapshot-tested; colours come
//! from `console` and disappear when colours are disabled (`--no-color`,
//! `NO_COLOR`, or a non-terminal stdout).

use clap::ValueEnum;
use console::style;
use helmscan_core::{ExistenceResult, ExistenceStatus};
use helmscan_kube::ScanReport;
use std::fmt::Write;

use crate::error::{CliError, Result};

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured table for humans
    Table,
    /// The full report as JSON
    Json,
}

const PURGED_WARNING: &str =
    "None of the declared resources were found live in the cluster – release may be purged.";

/// Render a report in the requested format
pub fn render(report: &ScanReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(report)),
        OutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &ScanReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| CliError::internal(format!("cannot encode report as JSON: {}", e)))
}

pub fn render_table(report: &ScanReport) -> String {
    let mut out = String::new();

    let header = format!(
        "Resources in Helm release '{}' revision {} (namespace {}):",
        report.release, report.revision, report.namespace
    );
    let _ = writeln!(out, "{}", style(&header).bold());
    let _ = writeln!(out, "{}", "-".repeat(header.chars().count()));

    if let Some(record) = &report.record {
        let mut details = Vec::new();
        if let Some(chart) = record.chart_display() {
            details.push(format!("chart {}", style(chart).cyan()));
        }
        if let Some(status) = &record.status {
            details.push(format!("status {}", style(status).yellow()));
        }
        if !details.is_empty() {
            let _ = writeln!(out, "{}", details.join(", "));
        }
    }

    if report.results.is_empty() {
        let _ = writeln!(out, "{}", style("The release manifest declares no resources.").dim());
    } else {
        write_rows(&mut out, &report.results);
    }

    let counts = report.counts();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} resource(s): {} exist, {} absent, {} error(s)",
        report.results.len(),
        style(counts.exists).green(),
        style(counts.absent).red(),
        style(counts.errors).yellow()
    );

    if !report.warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} {} document(s) skipped:",
            style("⚠").yellow(),
            report.warnings.len()
        );
        for warning in &report.warnings {
            let _ = writeln!(out, "  - {}", warning);
        }
    }

    if report.interrupted {
        let _ = writeln!(
            out,
            "{} Interrupted; unfinished checks are marked cancelled.",
            style("⚠").yellow()
        );
    } else if report.timed_out {
        let _ = writeln!(
            out,
            "{} Deadline reached; unfinished checks are marked timeout.",
            style("⚠").yellow()
        );
    }

    if report.none_exist() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} {}", style("[WARNING]").red(), PURGED_WARNING);
    }

    out
}

fn write_rows(out: &mut String, results: &[ExistenceResult]) {
    let headers = ["KIND", "NAMESPACE", "NAME", "API VERSION"];
    let rows: Vec<[&str; 4]> = results
        .iter()
        .map(|r| {
            [
                r.reference.kind(),
                r.reference.namespace().unwrap_or(""),
                r.reference.name(),
                r.reference.api_version(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let _ = writeln!(out, "{}  STATUS", style(line(headers)).dim());
    for (row, result) in rows.into_iter().zip(results) {
        let _ = writeln!(out, "{}  {}", line(row), status_cell(&result.status));
    }
}

fn status_cell(status: &ExistenceStatus) -> String {
    match status {
        ExistenceStatus::Exists => style("✓ exists").green().to_string(),
        ExistenceStatus::Absent => style("✗ absent").red().to_string(),
        ExistenceStatus::CheckError(reason) => {
            style(format!("? error: {}", reason)).yellow().to_string()
        }
    }
}
