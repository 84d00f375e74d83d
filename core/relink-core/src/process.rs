//! Process table inspection.
//!
//! The pipeline asks two questions of the OS: does a pid exist, and what is
//! its current argument list. Both go through [`ProcessTable`] so the filter
//! can be exercised against a fake table.
//!
//! # PID Reuse
//!
//! A pid in an old log line may now belong to an unrelated process. Existence
//! alone proves nothing, so the filter also compares the live command line
//! (after [`CommandNormalizer`]) with the logged one.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};

use crate::patterns::RE_MPIRUN_WRAPPER;

pub trait ProcessTable {
    /// Whether a process with this pid is currently running.
    fn exists(&self, pid: u32) -> bool;

    /// The live argument list, or `None` if the process is gone.
    ///
    /// An empty list means the process exists but has no readable arguments
    /// (zombies, kernel threads, other users' processes on hardened systems).
    fn cmdline(&self, pid: u32) -> Option<Vec<String>>;
}

/// Process table backed by `kill(pid, 0)` and per-pid `sysinfo` refreshes.
#[derive(Default)]
pub struct SysinfoProcessTable {
    // Per-pid refresh is O(1); a full scan is O(all processes).
    system: RefCell<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn exists(&self, pid: u32) -> bool {
        // pid 0 addresses the caller's process group, not a process.
        if pid == 0 || pid > i32::MAX as u32 {
            return false;
        }

        #[cfg(unix)]
        {
            // SAFETY: kill(pid, 0) is a standard POSIX liveness check; signal 0
            // performs permission and existence checks without delivering anything.
            #[allow(unsafe_code)]
            let rc = unsafe { libc::kill(pid as i32, 0) };
            if rc == 0 {
                return true;
            }
            // EPERM: the process exists but belongs to someone else.
            std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
        }
        #[cfg(not(unix))]
        {
            let mut sys = self.system.borrow_mut();
            let sys_pid = Pid::from_u32(pid);
            sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new())
        }
    }

    fn cmdline(&self, pid: u32) -> Option<Vec<String>> {
        let mut sys = self.system.borrow_mut();
        let sys_pid = Pid::from_u32(pid);
        if !sys.refresh_process_specifics(
            sys_pid,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        ) {
            return None;
        }
        sys.process(sys_pid).map(|process| process.cmd().to_vec())
    }
}

// MARK: - Command normalization

/// A literal substring replacement applied to live command lines before
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRewrite {
    pub from: String,
    pub to: String,
}

/// Turns a live argument list into the form the spooler logged.
#[derive(Debug, Clone, Default)]
pub struct CommandNormalizer {
    rewrites: Vec<CommandRewrite>,
}

impl CommandNormalizer {
    pub fn new(rewrites: Vec<CommandRewrite>) -> Self {
        Self { rewrites }
    }

    /// Joins `args` with single spaces, collapses the MPI launcher wrapper to
    /// `mpirun`, then applies the configured rewrites in order.
    pub fn normalize(&self, args: &[String]) -> String {
        let joined = args.join(" ");
        let mut normalized = RE_MPIRUN_WRAPPER
            .replace_all(&joined, "mpirun${1}")
            .into_owned();
        for rewrite in &self.rewrites {
            if !rewrite.from.is_empty() {
                normalized = normalized.replace(&rewrite.from, &rewrite.to);
            }
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_joins_with_single_spaces() {
        let normalizer = CommandNormalizer::default();
        assert_eq!(
            normalizer.normalize(&args(&["python", "train.py", "--epochs", "3"])),
            "python train.py --epochs 3"
        );
    }

    #[test]
    fn normalize_collapses_intel_mpirun_wrapper() {
        let normalizer = CommandNormalizer::default();
        let live = args(&[
            "/bin/sh",
            "/opt/intel/oneapi/mpi/2021.3.0/bin/mpirun",
            "-np",
            "8",
            "./vasp_std",
        ]);
        assert_eq!(normalizer.normalize(&live), "mpirun -np 8 ./vasp_std");
    }

    #[test]
    fn normalize_collapses_bare_wrapper_at_end_of_line() {
        let normalizer = CommandNormalizer::default();
        let live = args(&["/bin/sh", "/opt/intel/oneapi/mpi/2021.3.0/bin/mpirun"]);
        assert_eq!(normalizer.normalize(&live), "mpirun");
    }

    #[test]
    fn normalize_leaves_other_shell_scripts_alone() {
        let normalizer = CommandNormalizer::default();
        let live = args(&["/bin/sh", "/opt/tools/bin/mpirun-helper", "x"]);
        assert_eq!(
            normalizer.normalize(&live),
            "/bin/sh /opt/tools/bin/mpirun-helper x"
        );
    }

    #[test]
    fn normalize_applies_configured_rewrites_in_order() {
        let normalizer = CommandNormalizer::new(vec![
            CommandRewrite {
                from: "/usr/bin/python3".to_string(),
                to: "python3".to_string(),
            },
            CommandRewrite {
                from: "python3".to_string(),
                to: "python".to_string(),
            },
            CommandRewrite {
                from: String::new(),
                to: "ignored".to_string(),
            },
        ]);
        assert_eq!(
            normalizer.normalize(&args(&["/usr/bin/python3", "run.py"])),
            "python run.py"
        );
    }

    #[test]
    fn sysinfo_table_sees_current_process() {
        let table = SysinfoProcessTable::new();
        let pid = std::process::id();
        assert!(table.exists(pid));
        let cmd = table.cmdline(pid).expect("own cmdline");
        assert!(!cmd.is_empty());
    }

    #[test]
    fn sysinfo_table_rejects_pid_zero() {
        let table = SysinfoProcessTable::new();
        assert!(!table.exists(0));
    }

    #[cfg(unix)]
    #[test]
    fn sysinfo_table_reports_exited_child_as_gone() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");

        let table = SysinfoProcessTable::new();
        assert!(!table.exists(pid));
        assert!(table.cmdline(pid).is_none());
    }
}
