use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::models::{AnalysisReport, AnalysisStatus, BuildAnalysisNode, Classification};

use super::styling::{bright, bright_green, bright_red, cyan, dim};
use super::tables::{classification_cell, create_table, severity_cell};

/// Prints a human-readable summary of an analysis run to stdout.
///
/// Displays the run overview followed by the analysis tree: one block per
/// build node with its verdicts in a color-coded table, child builds
/// indented below their parent.
pub fn print_summary(report: &AnalysisReport) {
    println!("{}", render_summary(report));
}

// Helper functions

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn status_label(status: AnalysisStatus) -> String {
    match status {
        AnalysisStatus::Completed => bright_green("completed").to_string(),
        AnalysisStatus::Failed => bright_red("failed").to_string(),
    }
}

pub fn render_summary(report: &AnalysisReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📋", "Overview");
    let _ = writeln!(
        output,
        "  {} {} #{}",
        dim("Build:"),
        cyan(&report.job_name),
        report.build_number
    );
    let _ = writeln!(output, "  {} {}", dim("URL:"), report.url);
    let _ = writeln!(output, "  {} {}", dim("Status:"), status_label(report.status));
    let _ = writeln!(
        output,
        "  {} {} ({})",
        dim("Backend:"),
        report.backend,
        report.model
    );
    let _ = writeln!(output, "  {} {}", dim("Summary:"), report.summary);
    let _ = writeln!(output);

    add_section_header(&mut output, "🌳", "Analysis Tree");
    render_node(&mut output, &report.root, 0);

    output
}

fn render_node(output: &mut String, node: &BuildAnalysisNode, depth: usize) {
    let indent = "  ".repeat(depth + 1);

    let _ = writeln!(
        output,
        "{indent}{} {} #{}",
        bright("▸"),
        cyan(&node.job_name),
        node.build_number
    );
    if let Some(summary) = &node.summary {
        let _ = writeln!(output, "{indent}  {}", dim(summary));
    }
    if let Some(note) = &node.note {
        let _ = writeln!(output, "{indent}  {}", bright_red(note));
    }

    if !node.verdicts.is_empty() {
        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "Test",
            "Classification",
            "Severity",
            "Finding",
            "Tracker Matches",
        ]));

        for fv in &node.verdicts {
            let (severity, finding, matches) = match &fv.verdict.classification {
                Classification::ProductBug { bug_report } => (
                    severity_cell(&bug_report.severity),
                    bug_report.title.clone(),
                    render_matches(bug_report),
                ),
                Classification::CodeIssue { code_fix } => (
                    Cell::new("-"),
                    code_fix
                        .as_ref()
                        .map(|fix| format!("{}: {}", fix.file, fix.change))
                        .unwrap_or_else(|| truncate(&fv.verdict.narrative, 80)),
                    String::new(),
                ),
                Classification::Unknown => (
                    Cell::new("-"),
                    truncate(&fv.verdict.narrative, 80),
                    String::new(),
                ),
            };

            table.add_row(vec![
                Cell::new(&fv.test_name),
                classification_cell(&fv.verdict.classification),
                severity,
                Cell::new(finding),
                Cell::new(matches),
            ]);
        }

        for line in table.lines() {
            let _ = writeln!(output, "{indent}  {line}");
        }
    }

    for child in &node.children {
        render_node(output, child, depth + 1);
    }
}

fn render_matches(bug_report: &crate::models::BugReport) -> String {
    bug_report
        .matches
        .iter()
        .map(|m| format!("{} ({:.2})", m.key, m.relevance))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
