//! Terminal layout helpers and the report renderer.
//!
//! Everything goes through `tracing` so output lines and the progress
//! bar never interleave mid-line.

use colored::*;
use tracing::info;
use unicode_width::UnicodeWidthStr;

use sondr_common::record::{RecordOutcome, TargetRecord};
use sondr_common::report::RunReport;
use sondr_common::{success, warn};

pub const TOTAL_WIDTH: usize = 64;

/// Raw output line. The formatter passes `sondr::print` events through
/// without a status symbol.
pub fn print(msg: &str) {
    info!(target: "sondr::print", "{msg}");
}

pub fn header(msg: &str, q_level: u8) {
    if q_level > 0 {
        return;
    }

    let formatted = format!("⟦ {} ⟧", msg);
    let msg_len = UnicodeWidthStr::width(formatted.as_str());

    let dash_count = TOTAL_WIDTH.saturating_sub(msg_len);
    let left = dash_count / 2;
    let right = dash_count - left;

    let line = format!(
        "{}{}{}",
        "─".repeat(left).bright_black(),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right).bright_black()
    );

    print(&line);
}

pub fn fat_separator() {
    print(&format!("{}", "═".repeat(TOTAL_WIDTH).bright_black()));
}

pub fn centerln(msg: &str) {
    let width = console::measure_text_width(msg);
    let space = " ".repeat(TOTAL_WIDTH.saturating_sub(width) / 2);
    print(&format!("{space}{msg}"));
}

pub fn tree_head(idx: usize, name: &str) {
    let idx_str = format!("[{}]", idx.to_string().cyan());
    let output = format!("{} {}", idx_str.bright_black(), name.bright_green().bold());
    print(&output);
}

pub fn as_tree_one_level(key_value_pairs: Vec<(String, ColoredString)>) {
    let key_width = key_value_pairs
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0);

    for (i, (key, value)) in key_value_pairs.iter().enumerate() {
        let last = i + 1 == key_value_pairs.len();
        let branch = if last {
            "└─".bright_black()
        } else {
            "├─".bright_black()
        };
        let dots = "."
            .repeat(key_width.saturating_sub(key.chars().count()) + 1)
            .bright_black();
        let output = format!(
            " {} {}{}{} {}",
            branch,
            key.normal(),
            dots,
            ":".bright_black(),
            value
        );
        print(&output);
    }
}

pub fn no_results() {
    print(&format!("{}", "no findings".red().bold()));
}

/// Renders a finished run: one tree per target record, skipped-input
/// warnings, and the unit counters.
pub fn report(report: &RunReport, quiet: u8) {
    if report.records.is_empty() {
        header("zero targets scanned", quiet);
        no_results();
    } else {
        if quiet > 0 {
            print("");
        }
        header("Reconnaissance Report", quiet);
        if quiet < 2 {
            for (idx, record) in report.records.iter().enumerate() {
                print_record_tree(record, idx);
                if idx + 1 != report.records.len() {
                    print("");
                }
            }
        }
    }

    for warning in &report.warnings {
        warn!("{warning}");
    }

    summary(report, quiet);
}

fn print_record_tree(record: &TargetRecord, idx: usize) {
    let name = match record.outcome {
        RecordOutcome::Completed => record.target.identity.clone(),
        RecordOutcome::Cancelled => format!("{} (cancelled)", record.target.identity),
    };
    tree_head(idx, &name);

    let mut details: Vec<(String, ColoredString)> = Vec::new();
    for (field, contributions) in &record.fields {
        for contribution in contributions {
            let value = if contributions.len() > 1 {
                format!("{} [{}]", contribution.value, contribution.module).normal()
            } else {
                contribution.value.to_string().normal()
            };
            details.push((field.clone(), value));
        }
    }
    for failure in &record.failures {
        details.push((
            failure.module.clone(),
            format!("{} failure: {}", failure.kind, failure.message).red(),
        ));
    }

    if details.is_empty() {
        details.push(("status".to_string(), "nothing discovered".dimmed()));
    }
    as_tree_one_level(details);
}

fn summary(report: &RunReport, quiet: u8) {
    let stats = report.stats;
    let succeeded = format!("{} succeeded", stats.succeeded).bold().green();
    let failed = format!("{} failed", stats.failed).bold().red();
    let cancelled = format!("{} cancelled", stats.cancelled).bold().yellow();
    let elapsed = format!("{:.2}s", report.elapsed.as_secs_f64()).bold();
    let output = format!(
        "{} units: {succeeded}, {failed}, {cancelled} in {elapsed}",
        stats.units
    );

    match quiet {
        0 => {
            fat_separator();
            centerln(&output);
        }
        _ => {
            print("");
            success!("{}", output);
        }
    }
}
