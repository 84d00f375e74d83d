//! Compiled regex patterns for decoding task-log lines and normalizing
//! live command lines.
//!
//! Compiled once on first use. Update these when the spooler's log format
//! changes.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Log Line Grammar
// ═══════════════════════════════════════════════════════════════════════════════

/// Record grammar: `[<bracket>] <owner> P:<n> <tag>> Pid:<pid>CMD:<command> @<timestamp>`.
///
/// The spooler writes `[jobid] user P:...`; hand-written lines may use
/// `[user] P:...` with nothing in the owner slot. `slots` captures everything
/// between `P:` and the first `> Pid:` (proc count plus tag); the command runs
/// up to the last `@`.
pub static RE_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[(?P<bracket>[^\]]*)\](?P<owner>.*?)P:(?P<slots>.*?)> Pid:(?P<pid>.*?)CMD:(?P<cmd>.*)@(?P<ts>[^@]*)$",
    )
    .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════════
// Command Normalization
// ═══════════════════════════════════════════════════════════════════════════════

/// Intel MPI installs `mpirun` as a shell script, so the live argv reads
/// `/bin/sh /opt/intel/oneapi/mpi/<ver>/bin/mpirun ...` while the log has
/// the short `mpirun ...`. The trailing separator is captured so it can be
/// put back.
pub static RE_MPIRUN_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/bin/sh \S*/bin/mpirun(\s|$)").unwrap());
