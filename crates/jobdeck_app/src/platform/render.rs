use std::fmt::Write;

use chrono::{DateTime, NaiveDateTime};
use jobdeck_client::{JobLogLine, JobProfile};
use jobdeck_core::{JobRowView, JobSnapshot};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Shortens service timestamps to minutes. Unknown formats pass through.
pub(crate) fn format_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format(TIME_FORMAT).to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return parsed.format(TIME_FORMAT).to_string();
    }
    raw.to_string()
}

pub(crate) fn job_table(rows: &[JobRowView]) -> String {
    if rows.is_empty() {
        return "No jobs.\n".to_string();
    }
    let id_width = rows.iter().map(|row| row.id.len()).max().unwrap_or(0).max(2);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<8}  {:>5}  {:<16}  DESCRIPTION",
        "ID", "STATUS", "DONE", "UPDATED"
    );
    for row in rows {
        let updated = if row.updated.is_empty() {
            &row.created
        } else {
            &row.updated
        };
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<8}  {:>5}  {:<16}  {}",
            row.id,
            row.status_label,
            row.percent_text.as_deref().unwrap_or("-"),
            format_timestamp(updated),
            describe(row),
        );
    }
    out
}

fn describe(row: &JobRowView) -> String {
    let mut text = match (row.kind.is_empty(), row.desc.is_empty()) {
        (true, _) => row.desc.clone(),
        (false, true) => row.kind.clone(),
        (false, false) => format!("[{}] {}", row.kind, row.desc),
    };
    if let Some(error) = row.error.as_deref().filter(|e| !e.is_empty()) {
        let _ = write!(text, " (error: {error})");
    }
    text
}

pub(crate) fn progress_line(snapshot: &JobSnapshot) -> String {
    format!(
        "{}: {} {:.0}%",
        snapshot.id,
        snapshot.status,
        snapshot.percent * 100.0
    )
}

pub(crate) fn log_line(line: &JobLogLine) -> String {
    let text = match line.fields.get("text").and_then(|text| text.as_str()) {
        Some(text) => text.to_string(),
        None => line.fields.to_string(),
    };
    match line.fields.get("level").and_then(|level| level.as_str()) {
        Some(level) => format!("{} {:<5} {}", format_timestamp(&line.created), level, text),
        None => format!("{} {}", format_timestamp(&line.created), text),
    }
}

pub(crate) fn profile(profile: &JobProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job {} ({})", profile.id, profile.status);
    if !profile.desc.is_empty() {
        let _ = writeln!(out, "{}", profile.desc);
    }
    let _ = writeln!(out, "Created {}", format_timestamp(&profile.created));
    for entry in &profile.content {
        let _ = writeln!(out, "  {entry}");
    }
    out
}
