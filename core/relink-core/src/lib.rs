//! # relink-core
//!
//! Re-attaches task-spooler log entries to processes that are still running
//! and re-registers them with the task queue, so jobs survive a queue-manager
//! restart.
//!
//! ## Design Principles
//!
//! - **Synchronous**: one linear pass, no async runtime.
//! - **Local failures**: a malformed line or a failed submission is reported
//!   and skipped; only an unreadable log or bad configuration aborts.
//! - **Collaborators behind traits**: [`ProcessTable`] and [`QueueSubmitter`]
//!   have real implementations here and fakes in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relink_core::{CommandSubmitter, Relinker, SysinfoProcessTable};
//!
//! let submitter = CommandSubmitter::new(&config.queue_program, config.dialect);
//! let relinker = Relinker::new(config, SysinfoProcessTable::new(), submitter);
//! let report = relinker.run_file(chrono::Local::now().naive_local())?;
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod patterns;
pub mod pipeline;
pub mod process;
pub mod reader;
pub mod record;
pub mod submit;

pub use config::{load_file_config, FileConfig, Overrides, RelinkConfig};
pub use error::{RecordError, RelinkError, Result};
pub use filter::{evaluate, Mode, StalenessWindow, Verdict, MAX_WINDOW_DAYS};
pub use pipeline::{
    Collected, LineOutcome, LineStatus, RelinkReport, Relinker, Submission, SubmissionStatus,
};
pub use process::{CommandNormalizer, CommandRewrite, ProcessTable, SysinfoProcessTable};
pub use reader::read_log;
pub use record::{parse_record, LogLine, TaskRecord};
pub use submit::{CommandSubmitter, QueueDialect, QueueInvocation, QueueSubmitter, SubmitStatus};
