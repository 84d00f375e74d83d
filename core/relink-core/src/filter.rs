//! Liveness and staleness filtering of decoded task records.
//!
//! ## Decision Order
//!
//! ```text
//! pid not running                      → Gone
//! logged_at <= now - window            → TooOld
//! live command line vanished           → Gone
//! live command line empty              → CommandMismatch
//! normalized live cmd != logged cmd    → CommandMismatch
//! otherwise                            → Keep
//! ```
//!
//! An empty argv (zombie, kernel thread, unreadable) can never equal a logged
//! command, so it is never re-submitted.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::process::{CommandNormalizer, ProcessTable};
use crate::record::TaskRecord;

/// Day count for the routine recovery workflow.
pub const RECENT_WINDOW_DAYS: u32 = 10;

/// Day count for full-history reconciliation.
pub const FULL_WINDOW_DAYS: u32 = 1000;

/// Upper bound on any window, roughly 270 years.
pub const MAX_WINDOW_DAYS: u32 = 100_000;

/// Named staleness presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Recent,
    Full,
}

/// Maximum age a record may have and still be re-submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StalenessWindow {
    days: u32,
}

impl StalenessWindow {
    /// Returns `None` for a zero-day window, which would reject everything,
    /// and for windows longer than [`MAX_WINDOW_DAYS`].
    pub fn from_days(days: u32) -> Option<Self> {
        (1..=MAX_WINDOW_DAYS)
            .contains(&days)
            .then_some(Self { days })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Records must be logged strictly after this instant.
    /// Saturates at `NaiveDateTime::MIN` when `now` is close to the start of
    /// the representable range.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(NaiveDateTime::MIN)
    }
}

/// Outcome of checking one record against the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Gone,
    TooOld,
    CommandMismatch { live: String },
}

impl Verdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, Verdict::Keep)
    }
}

pub fn evaluate<P: ProcessTable + ?Sized>(
    record: &TaskRecord,
    cutoff: NaiveDateTime,
    table: &P,
    normalizer: &CommandNormalizer,
) -> Verdict {
    if !table.exists(record.pid) {
        return Verdict::Gone;
    }

    if record.logged_at <= cutoff {
        return Verdict::TooOld;
    }

    // The process may exit between the two lookups.
    let Some(args) = table.cmdline(record.pid) else {
        return Verdict::Gone;
    };

    if args.is_empty() {
        tracing::debug!(pid = record.pid, "Live process has no readable command line");
        return Verdict::CommandMismatch {
            live: String::new(),
        };
    }

    let live = normalizer.normalize(&args);
    if live != record.command {
        return Verdict::CommandMismatch { live };
    }

    Verdict::Keep
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;

    /// In-memory process table: pid → argv. `None` argv simulates a process
    /// that exits between the existence check and the argv read.
    #[derive(Default)]
    pub struct FakeProcessTable {
        pub processes: HashMap<u32, Option<Vec<String>>>,
    }

    impl FakeProcessTable {
        pub fn with(mut self, pid: u32, argv: &[&str]) -> Self {
            self.processes
                .insert(pid, Some(argv.iter().map(|s| s.to_string()).collect()));
            self
        }

        pub fn vanishing(mut self, pid: u32) -> Self {
            self.processes.insert(pid, None);
            self
        }
    }

    impl ProcessTable for FakeProcessTable {
        fn exists(&self, pid: u32) -> bool {
            self.processes.contains_key(&pid)
        }

        fn cmdline(&self, pid: u32) -> Option<Vec<String>> {
            self.processes.get(&pid).cloned().flatten()
        }
    }
}
