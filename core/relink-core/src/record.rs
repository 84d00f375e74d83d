//! Task records decoded from the spooler's task log.
//!
//! The spooler writes each line as:
//!
//! ```text
//! [<jobid>] <user> P:<procs> <<tag>> Pid: <pid> CMD: <command> @ <YYYY-MM-DD HH:MM:SS>
//! ```
//!
//! The shorter `[<user>] P:<procs> ...` form, with the user inside the
//! brackets and nothing before `P:`, is accepted too.
//!
//! The `<` opening the tag is optional. A tag of `..` means the task was not
//! queued into an explicit lane. The timestamp is local wall-clock time.
//!
//! The format has no escaping: a user, tag or command containing one of the
//! markers (`]`, `P:`, `<`, `> Pid:`, `CMD:`, a trailing `@`) decodes wrongly
//! or not at all.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::RecordError;
use crate::patterns::RE_RECORD;

/// Tag value meaning "no explicit lane".
pub const DEFAULT_TAG: &str = "..";

/// Timestamp layout used in the task log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A raw line from the task log with its 1-based position in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub number: usize,
    pub text: String,
}

impl LogLine {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A decoded task-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub user: String,
    pub proc_count: u32,
    pub pid: u32,
    pub tag: String,
    pub command: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub logged_at: NaiveDateTime,
}

impl TaskRecord {
    /// The lane the task was queued into, if any.
    pub fn lane(&self) -> Option<&str> {
        match self.tag.as_str() {
            "" | DEFAULT_TAG => None,
            tag => Some(tag),
        }
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] P:{} <{}> Pid:{}CMD:{} @{}",
            self.user,
            self.proc_count,
            self.tag,
            self.pid,
            self.command,
            self.logged_at.format(TIMESTAMP_FORMAT)
        )
    }
}

impl FromStr for TaskRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_record(s)
    }
}

fn serialize_timestamp<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

// MARK: - Parsing

/// Decodes one log line into a `TaskRecord`.
///
/// Fails locally: a bad line yields an error for that line only.
pub fn parse_record(line: &str) -> Result<TaskRecord, RecordError> {
    let line = line.trim();
    let Some(caps) = RE_RECORD.captures(line) else {
        return Err(RecordError::MissingMarker(first_missing_marker(line)));
    };

    let owner = caps["owner"].trim();
    let user = if owner.is_empty() {
        caps["bracket"].trim().to_string()
    } else {
        owner.to_string()
    };
    let (proc_count, tag) = split_slots(&caps["slots"])?;
    let pid = parse_number("pid", &caps["pid"])?;

    let command = caps["cmd"].trim().to_string();
    if command.is_empty() {
        return Err(RecordError::EmptyCommand);
    }

    let raw_ts = caps["ts"].trim();
    let logged_at = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT).map_err(|err| {
        RecordError::InvalidTimestamp {
            value: raw_ts.to_string(),
            details: err.to_string(),
        }
    })?;

    Ok(TaskRecord {
        user,
        proc_count,
        pid,
        tag,
        command,
        logged_at,
    })
}

/// Splits the text between `P:` and `> Pid:` into proc count and tag.
fn split_slots(raw: &str) -> Result<(u32, String), RecordError> {
    let (procs, tag) = match raw.split_once('<') {
        Some((procs, tag)) => (procs.trim(), tag.trim()),
        None => {
            let trimmed = raw.trim_start();
            let digits_end = trimmed
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(trimmed.len());
            (&trimmed[..digits_end], trimmed[digits_end..].trim())
        }
    };

    let proc_count = parse_number("proc count", procs)?;
    if proc_count == 0 {
        return Err(RecordError::ZeroProcCount);
    }
    Ok((proc_count, tag.to_string()))
}

fn parse_number(field: &'static str, raw: &str) -> Result<u32, RecordError> {
    let value = raw.trim();
    value.parse().map_err(|_| RecordError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Names the first marker, in grammar order, that the line lacks.
fn first_missing_marker(line: &str) -> &'static str {
    let Some(user_end) = line.find(']') else {
        return "]";
    };
    let rest = &line[user_end..];
    let Some(procs) = rest.find("P:") else {
        return "P:";
    };
    let rest = &rest[procs..];
    let Some(pid) = rest.find("> Pid:") else {
        return "> Pid:";
    };
    let rest = &rest[pid..];
    let Some(cmd) = rest.find("CMD:") else {
        return "CMD:";
    };
    if !rest[cmd..].contains('@') {
        return "@";
    }
    "["
}
