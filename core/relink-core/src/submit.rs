//! Re-submission of surviving records into the task queue.
//!
//! The queue tool is an external CLI. Each surviving record becomes one
//! invocation carrying its lane, pid, slot count, original start time and
//! command:
//!
//! ```text
//! generic:       enqueue [--lane <tag>] --pid <pid> --slots <n> [--start-time <epoch>] "<command>"
//! task-spooler:  ts [-L <tag>] --pid <pid> -N <n> [--stime <epoch>] "<command>"
//! ```
//!
//! Arguments are passed as argv, never through a shell, so the command reaches
//! the queue tool exactly as logged.

use std::fmt;
use std::process::Command;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{RelinkError, Result};
use crate::record::TaskRecord;

pub const GENERIC_PROGRAM: &str = "enqueue";
pub const TASK_SPOOLER_PROGRAM: &str = "ts";

/// Flag vocabulary of the queue tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueDialect {
    #[default]
    Generic,
    TaskSpooler,
}

impl QueueDialect {
    pub fn default_program(self) -> &'static str {
        match self {
            QueueDialect::Generic => GENERIC_PROGRAM,
            QueueDialect::TaskSpooler => TASK_SPOOLER_PROGRAM,
        }
    }

    fn lane_flag(self) -> &'static str {
        match self {
            QueueDialect::Generic => "--lane",
            QueueDialect::TaskSpooler => "-L",
        }
    }

    fn slots_flag(self) -> &'static str {
        match self {
            QueueDialect::Generic => "--slots",
            QueueDialect::TaskSpooler => "-N",
        }
    }

    fn start_time_flag(self) -> &'static str {
        match self {
            QueueDialect::Generic => "--start-time",
            QueueDialect::TaskSpooler => "--stime",
        }
    }
}

/// A fully built queue-tool command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl QueueInvocation {
    pub fn build(program: &str, dialect: QueueDialect, record: &TaskRecord) -> Self {
        let mut args = Vec::with_capacity(8);
        if let Some(lane) = record.lane() {
            args.push(dialect.lane_flag().to_string());
            args.push(lane.to_string());
        }
        args.push("--pid".to_string());
        args.push(record.pid.to_string());
        args.push(dialect.slots_flag().to_string());
        args.push(record.proc_count.to_string());

        match start_epoch(record) {
            Some(epoch) => {
                args.push(dialect.start_time_flag().to_string());
                args.push(epoch.to_string());
            }
            None => tracing::warn!(
                pid = record.pid,
                logged_at = %record.logged_at,
                "Logged time does not exist in local timezone; omitting start time"
            ),
        }

        args.push(record.command.clone());

        Self {
            program: program.to_string(),
            args,
        }
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for QueueInvocation {
    /// Shell-like rendering for logs; the last argument (the task command) is
    /// double-quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        if let Some((command, flags)) = self.args.split_last() {
            for flag in flags {
                write!(f, " {flag}")?;
            }
            write!(f, " \"{command}\"")?;
        }
        Ok(())
    }
}

/// Unix epoch seconds of the logged local time. `None` inside a DST gap.
fn start_epoch(record: &TaskRecord) -> Option<i64> {
    Local
        .from_local_datetime(&record.logged_at)
        .earliest()
        .map(|dt| dt.timestamp())
}

// MARK: - Submitter

/// Exit status of one queue-tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitStatus {
    /// `None` when the tool was killed by a signal.
    pub code: Option<i32>,
}

impl SubmitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait QueueSubmitter {
    fn submit(&self, record: &TaskRecord) -> Result<SubmitStatus>;

    /// How the submission would look on a command line.
    fn describe(&self, record: &TaskRecord) -> String;
}

/// Runs the real queue tool, inheriting stdout/stderr and waiting for exit.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    program: String,
    dialect: QueueDialect,
}

impl CommandSubmitter {
    pub fn new(program: impl Into<String>, dialect: QueueDialect) -> Self {
        Self {
            program: program.into(),
            dialect,
        }
    }

    pub fn invocation(&self, record: &TaskRecord) -> QueueInvocation {
        QueueInvocation::build(&self.program, self.dialect, record)
    }
}

impl QueueSubmitter for CommandSubmitter {
    fn submit(&self, record: &TaskRecord) -> Result<SubmitStatus> {
        let invocation = self.invocation(record);
        let status = invocation
            .to_command()
            .status()
            .map_err(|source| RelinkError::SpawnFailed {
                command: invocation.to_string(),
                source,
            })?;
        Ok(SubmitStatus {
            code: status.code(),
        })
    }

    fn describe(&self, record: &TaskRecord) -> String {
        self.invocation(record).to_string()
    }
}
