//! The relink pipeline: read → parse → filter → re-submit.
//!
//! Each stage only consumes the output of the previous one. Lines are parsed
//! and filtered in log order into an append-only survivor list, then the
//! survivors are re-submitted in that same order. A bad line or a failed
//! submission affects only itself.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RelinkConfig;
use crate::error::Result;
use crate::filter::{evaluate, Verdict};
use crate::process::{CommandNormalizer, ProcessTable};
use crate::reader::read_log;
use crate::record::{parse_record, LogLine, TaskRecord, TIMESTAMP_FORMAT};
use crate::submit::QueueSubmitter;

/// What happened to one log line during filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineStatus {
    Added,
    Gone,
    TooOld,
    CommandMismatch { live: String },
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineOutcome {
    pub line: LogLine,
    #[serde(flatten)]
    pub status: LineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Exited { code: Option<i32> },
    SpawnFailed { error: String },
    DryRun,
}

impl SubmissionStatus {
    pub fn is_failure(&self) -> bool {
        match self {
            SubmissionStatus::Exited { code } => *code != Some(0),
            SubmissionStatus::SpawnFailed { .. } => true,
            SubmissionStatus::DryRun => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub pid: u32,
    pub invocation: String,
    #[serde(flatten)]
    pub status: SubmissionStatus,
}

/// Output of the parse and filter stages.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub survivors: Vec<TaskRecord>,
    pub lines: Vec<LineOutcome>,
}

/// Everything one run did, in log order.
#[derive(Debug, Clone, Serialize)]
pub struct RelinkReport {
    pub log_path: PathBuf,
    pub window_days: u32,
    #[serde(serialize_with = "serialize_timestamp")]
    pub cutoff: NaiveDateTime,
    pub lines: Vec<LineOutcome>,
    pub submissions: Vec<Submission>,
}

impl RelinkReport {
    pub fn added(&self) -> usize {
        self.count_lines(|status| matches!(status, LineStatus::Added))
    }

    pub fn malformed(&self) -> usize {
        self.count_lines(|status| matches!(status, LineStatus::Malformed { .. }))
    }

    /// Well-formed lines that were filtered out.
    pub fn skipped(&self) -> usize {
        self.lines.len() - self.added() - self.malformed()
    }

    pub fn failed_submissions(&self) -> usize {
        self.submissions
            .iter()
            .filter(|submission| submission.status.is_failure())
            .count()
    }

    fn count_lines(&self, predicate: impl Fn(&LineStatus) -> bool) -> usize {
        self.lines
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

fn serialize_timestamp<S>(value: &NaiveDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

pub struct Relinker<P: ProcessTable, Q: QueueSubmitter> {
    config: RelinkConfig,
    table: P,
    submitter: Q,
    normalizer: CommandNormalizer,
}

impl<P: ProcessTable, Q: QueueSubmitter> Relinker<P, Q> {
    pub fn new(config: RelinkConfig, table: P, submitter: Q) -> Self {
        let normalizer = CommandNormalizer::new(config.rewrites.clone());
        Self {
            config,
            table,
            submitter,
            normalizer,
        }
    }

    pub fn config(&self) -> &RelinkConfig {
        &self.config
    }

    /// Reads the configured log and runs the rest of the pipeline on it.
    pub fn run_file(&self, now: NaiveDateTime) -> Result<RelinkReport> {
        info!(path = %self.config.log_path.display(), "Reading task log");
        let lines = read_log(&self.config.log_path)?;
        Ok(self.run(lines, now))
    }

    pub fn run(&self, lines: Vec<LogLine>, now: NaiveDateTime) -> RelinkReport {
        let cutoff = self.config.window.cutoff(now);
        let collected = self.collect(lines, now);
        let submissions = self.resubmit(&collected.survivors);

        RelinkReport {
            log_path: self.config.log_path.clone(),
            window_days: self.config.window.days(),
            cutoff,
            lines: collected.lines,
            submissions,
        }
    }

    /// Parse and filter stages.
    pub fn collect(&self, lines: Vec<LogLine>, now: NaiveDateTime) -> Collected {
        let cutoff = self.config.window.cutoff(now);
        info!(
            days = self.config.window.days(),
            cutoff = %cutoff,
            "Only restoring tasks logged after cutoff"
        );

        let mut collected = Collected::default();
        for line in lines {
            let status = match parse_record(&line.text) {
                Ok(record) => {
                    let verdict = evaluate(&record, cutoff, &self.table, &self.normalizer);
                    let status = self.line_status(&line, verdict);
                    if matches!(status, LineStatus::Added) {
                        collected.survivors.push(record);
                    }
                    status
                }
                Err(err) => {
                    warn!(line = line.number, error = %err, text = %line.text, "Skipping malformed log line");
                    LineStatus::Malformed {
                        reason: err.to_string(),
                    }
                }
            };
            collected.lines.push(LineOutcome { line, status });
        }
        collected
    }

    fn line_status(&self, line: &LogLine, verdict: Verdict) -> LineStatus {
        match verdict {
            Verdict::Keep => {
                info!(line = line.number, text = %line.text, "add");
                LineStatus::Added
            }
            Verdict::Gone => {
                debug!(line = line.number, text = %line.text, "gone");
                LineStatus::Gone
            }
            Verdict::TooOld => {
                info!(line = line.number, text = %line.text, "too old");
                LineStatus::TooOld
            }
            Verdict::CommandMismatch { live } => {
                info!(line = line.number, live = %live, text = %line.text, "not applicable");
                LineStatus::CommandMismatch { live }
            }
        }
    }

    /// Re-submission stage. Never stops early.
    pub fn resubmit(&self, survivors: &[TaskRecord]) -> Vec<Submission> {
        survivors
            .iter()
            .map(|record| {
                let invocation = self.submitter.describe(record);
                let status = if self.config.dry_run {
                    info!(pid = record.pid, invocation = %invocation, "Dry run; not submitting");
                    SubmissionStatus::DryRun
                } else {
                    info!(pid = record.pid, invocation = %invocation, "Submitting");
                    match self.submitter.submit(record) {
                        Ok(status) => {
                            if !status.success() {
                                warn!(pid = record.pid, code = ?status.code, "Queue tool exited unsuccessfully");
                            }
                            SubmissionStatus::Exited { code: status.code }
                        }
                        Err(err) => {
                            warn!(pid = record.pid, error = %err, "Queue tool could not be run");
                            SubmissionStatus::SpawnFailed {
                                error: err.to_string(),
                            }
                        }
                    }
                };
                Submission {
                    pid: record.pid,
                    invocation,
                    status,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelinkError;
    use crate::filter::testing::FakeProcessTable;
    use crate::filter::StalenessWindow;
    use crate::reader::split_lines;
    use crate::submit::{CommandSubmitter, QueueDialect, QueueInvocation, SubmitStatus};
    use chrono::NaiveDate;
    use std::cell::RefCell;

    /// Records submissions instead of spawning; exit codes are popped per call.
    struct FakeSubmitter {
        inner: CommandSubmitter,
        submitted: RefCell<Vec<QueueInvocation>>,
        codes: RefCell<Vec<Option<i32>>>,
        spawn_fails_for: Option<u32>,
    }

    impl FakeSubmitter {
        fn new() -> Self {
            Self {
                inner: CommandSubmitter::new("enqueue", QueueDialect::Generic),
                submitted: RefCell::new(Vec::new()),
                codes: RefCell::new(Vec::new()),
                spawn_fails_for: None,
            }
        }
    }

    impl QueueSubmitter for FakeSubmitter {
        fn submit(&self, record: &TaskRecord) -> Result<SubmitStatus> {
            if self.spawn_fails_for == Some(record.pid) {
                return Err(RelinkError::SpawnFailed {
                    command: self.describe(record),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            self.submitted.borrow_mut().push(self.inner.invocation(record));
            let code = self.codes.borrow_mut().pop().unwrap_or(Some(0));
            Ok(SubmitStatus { code })
        }

        fn describe(&self, record: &TaskRecord) -> String {
            self.inner.describe(record)
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .expect("date")
            .and_hms_opt(12, 0, 0)
            .expect("time")
    }

    fn config(days: u32) -> RelinkConfig {
        RelinkConfig {
            log_path: PathBuf::from("/var/spool/log.txt"),
            window: StalenessWindow::from_days(days).expect("window"),
            queue_program: "enqueue".to_string(),
            dialect: QueueDialect::Generic,
            rewrites: Vec::new(),
            dry_run: false,
        }
    }

    #[test]
    fn single_live_task_is_resubmitted() {
        let table = FakeProcessTable::default().with(111, &["echo", "hi"]);
        let relinker = Relinker::new(config(10), table, FakeSubmitter::new());

        let lines = split_lines("[alice] P:2 ..> Pid:111CMD:echo hi @2024-01-01 00:00:00");
        let report = relinker.run(lines, now());

        let submitted = relinker.submitter.submitted.borrow();
        assert_eq!(submitted.len(), 1);
        let args = &submitted[0].args;
        assert_eq!(args[..4], ["--pid", "111", "--slots", "2"]);
        assert_eq!(args.last().map(String::as_str), Some("echo hi"));
        assert!(!args.iter().any(|arg| arg == "--lane"));

        assert_eq!(report.added(), 1);
        assert_eq!(report.submissions.len(), 1);
        assert_eq!(
            report.submissions[0].status,
            SubmissionStatus::Exited { code: Some(0) }
        );
    }

    #[test]
    fn malformed_line_does_not_stop_later_lines() {
        let table = FakeProcessTable::default()
            .with(111, &["echo", "hi"])
            .with(222, &["sleep", "600"]);
        let relinker = Relinker::new(config(10), table, FakeSubmitter::new());

        let lines = split_lines(
            "garbage\n\
             [alice] P:2 ..> Pid:111CMD:echo hi @2024-01-01 00:00:00\n\
             [bob] P:x <..> Pid:5CMD:ls @2024-01-01 00:00:00\n\
             [bob] P:1 <night> Pid:222CMD:sleep 600 @2024-01-04 09:30:00\n",
        );
        let report = relinker.run(lines, now());

        assert_eq!(report.malformed(), 2);
        assert_eq!(report.added(), 2);
        assert_eq!(report.skipped(), 0);
        assert!(matches!(
            report.lines[0].status,
            LineStatus::Malformed { .. }
        ));

        let pids: Vec<u32> = report.submissions.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![111, 222]);
    }

    #[test]
    fn filtered_lines_are_reported_in_order() {
        let table = FakeProcessTable::default()
            .with(2, &["old", "job"])
            .with(3, &["bash"]);
        let relinker = Relinker::new(config(1), table, FakeSubmitter::new());

        let lines = split_lines(
            "[a] P:1 <..> Pid:1CMD:gone job @2024-01-05 11:00:00\n\
             [a] P:1 <..> Pid:2CMD:old job @2023-12-01 00:00:00\n\
             [a] P:1 <..> Pid:3CMD:python serve.py @2024-01-05 11:00:00\n",
        );
        let collected = relinker.collect(lines, now());

        assert!(collected.survivors.is_empty());
        let statuses: Vec<LineStatus> = collected.lines.into_iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                LineStatus::Gone,
                LineStatus::TooOld,
                LineStatus::CommandMismatch {
                    live: "bash".to_string()
                },
            ]
        );
    }

    #[test]
    fn dry_run_never_calls_the_queue_tool() {
        let table = FakeProcessTable::default().with(111, &["echo", "hi"]);
        let mut cfg = config(10);
        cfg.dry_run = true;
        let relinker = Relinker::new(cfg, table, FakeSubmitter::new());

        let report = relinker.run(
            split_lines("[alice] P:2 <gpu> Pid:111CMD:echo hi @2024-01-04 00:00:00"),
            now(),
        );

        assert!(relinker.submitter.submitted.borrow().is_empty());
        assert_eq!(report.submissions[0].status, SubmissionStatus::DryRun);
        assert!(report.submissions[0]
            .invocation
            .starts_with("enqueue --lane gpu --pid 111 --slots 2"));
        assert_eq!(report.failed_submissions(), 0);
    }

    #[test]
    fn failed_submissions_do_not_abort_the_batch() {
        let table = FakeProcessTable::default()
            .with(1, &["a"])
            .with(2, &["b"])
            .with(3, &["c"]);
        let mut submitter = FakeSubmitter::new();
        submitter.spawn_fails_for = Some(1);
        // Popped from the back: pid 2 exits 3, pid 3 exits 0.
        submitter.codes = RefCell::new(vec![Some(0), Some(3)]);
        let relinker = Relinker::new(config(10), table, submitter);

        let report = relinker.run(
            split_lines(
                "[u] P:1 <..> Pid:1CMD:a @2024-01-05 00:00:00\n\
                 [u] P:1 <..> Pid:2CMD:b @2024-01-05 00:00:00\n\
                 [u] P:1 <..> Pid:3CMD:c @2024-01-05 00:00:00\n",
            ),
            now(),
        );

        let statuses: Vec<&SubmissionStatus> =
            report.submissions.iter().map(|s| &s.status).collect();
        assert!(matches!(statuses[0], SubmissionStatus::SpawnFailed { .. }));
        assert_eq!(statuses[1], &SubmissionStatus::Exited { code: Some(3) });
        assert_eq!(statuses[2], &SubmissionStatus::Exited { code: Some(0) });
        assert_eq!(report.failed_submissions(), 2);
    }

    #[test]
    fn run_file_propagates_unreadable_log() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = config(10);
        cfg.log_path = temp_dir.path().join("nope.txt");
        let relinker = Relinker::new(cfg, FakeProcessTable::default(), FakeSubmitter::new());

        assert!(matches!(
            relinker.run_file(now()),
            Err(RelinkError::FileAccess { .. })
        ));
    }

    #[test]
    fn report_serializes_statuses_inline() {
        let table = FakeProcessTable::default().with(111, &["echo", "hi"]);
        let relinker = Relinker::new(config(10), table, FakeSubmitter::new());
        let report = relinker.run(
            split_lines("[alice] P:2 ..> Pid:111CMD:echo hi @2024-01-01 00:00:00\ngarbage"),
            now(),
        );

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["window_days"], 10);
        assert_eq!(json["cutoff"], "2023-12-26 12:00:00");
        assert_eq!(json["lines"][0]["status"], "added");
        assert_eq!(json["lines"][1]["status"], "malformed");
        assert_eq!(json["lines"][1]["line"]["number"], 2);
        assert_eq!(json["submissions"][0]["status"], "exited");
        assert_eq!(json["submissions"][0]["code"], 0);
    }
}
