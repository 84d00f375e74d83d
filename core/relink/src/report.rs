//! Console rendering of a relink run.

use std::fmt::Write as _;

use relink_core::{LineStatus, RelinkReport, SubmissionStatus};

pub fn render_text(report: &RelinkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "read from {}", report.log_path.display());
    let _ = writeln!(
        out,
        "  only restore tasks within {} days, start by {}",
        report.window_days, report.cutoff
    );

    for outcome in &report.lines {
        let text = &outcome.line.text;
        let _ = match &outcome.status {
            LineStatus::Added => writeln!(out, "add: {text}"),
            LineStatus::Gone => writeln!(out, " GONE: {text}"),
            LineStatus::TooOld => writeln!(out, "  UNK: {text}"),
            LineStatus::CommandMismatch { live } => {
                writeln!(out, "  N/A: {text}  # live: {live}")
            }
            LineStatus::Malformed { reason } => {
                writeln!(out, "  BAD line {}: {reason}", outcome.line.number)
            }
        };
    }

    for submission in &report.submissions {
        let _ = writeln!(out, "{}", submission.invocation);
        let _ = match &submission.status {
            SubmissionStatus::Exited { code: Some(0) } | SubmissionStatus::DryRun => Ok(()),
            SubmissionStatus::Exited { code: Some(code) } => {
                writeln!(out, "  -> exited with status {code}")
            }
            SubmissionStatus::Exited { code: None } => writeln!(out, "  -> killed by signal"),
            SubmissionStatus::SpawnFailed { error } => writeln!(out, "  -> failed: {error}"),
        };
    }

    let _ = writeln!(
        out,
        "{} added, {} skipped, {} malformed, {} failed submissions",
        report.added(),
        report.skipped(),
        report.malformed(),
        report.failed_submissions()
    );
    out
}
