//! ts-relink: re-register surviving spooler tasks after a queue restart.
//!
//! Reads the spooler's task log, keeps entries whose process is still running
//! the logged command and was started within the staleness window, and hands
//! each one back to the queue tool.
//!
//! ## Usage
//!
//! ```bash
//! ts-relink                         # recent mode, 10 days
//! ts-relink --mode full             # full-history reconciliation
//! ts-relink --days 3 --dry-run
//! ts-relink --dialect task-spooler --json
//! ```

mod logging;
mod report;

use chrono::Local;
use clap::{Parser, ValueEnum};
use relink_core::{
    load_file_config, CommandSubmitter, Mode, Overrides, QueueDialect, RelinkConfig, Relinker,
    SysinfoProcessTable, MAX_WINDOW_DAYS,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ts-relink")]
#[command(about = "Re-register still-running logged tasks into the task queue")]
#[command(version)]
struct Cli {
    /// Task log to read (default: ~/task-spooler/log.txt)
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Config file (default: ~/.task-spooler/relink.toml, if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Staleness preset: recent (10 days) or full (1000 days)
    #[arg(long, value_enum, conflicts_with = "days")]
    mode: Option<ModeArg>,

    /// Only restore tasks logged within the last N days
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
    )]
    days: Option<u32>,

    /// Flag vocabulary of the queue tool
    #[arg(long, value_enum)]
    dialect: Option<DialectArg>,

    /// Queue tool program (default depends on dialect: enqueue or ts)
    #[arg(long, value_name = "PROGRAM")]
    queue_bin: Option<String>,

    /// Print the queue invocations without running them
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Recent,
    Full,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Recent => Mode::Recent,
            ModeArg::Full => Mode::Full,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DialectArg {
    Generic,
    TaskSpooler,
}

impl From<DialectArg> for QueueDialect {
    fn from(value: DialectArg) -> Self {
        match value {
            DialectArg::Generic => QueueDialect::Generic,
            DialectArg::TaskSpooler => QueueDialect::TaskSpooler,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            log_path: self.log.clone(),
            mode: self.mode.map(Mode::from),
            days: self.days,
            queue_program: self.queue_bin.clone(),
            dialect: self.dialect.map(QueueDialect::from),
            dry_run: self.dry_run,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.verbose);

    let config = match load_file_config(cli.config.as_deref())
        .and_then(|file| RelinkConfig::resolve(file, cli.overrides()))
    {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let submitter = CommandSubmitter::new(&config.queue_program, config.dialect);
    let relinker = Relinker::new(config, SysinfoProcessTable::new(), submitter);

    let report = match relinker.run_file(Local::now().naive_local()) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(error = %err, "ts-relink failed");
            std::process::exit(1);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize report");
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", report::render_text(&report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_is_valid() {
        let cli = Cli::try_parse_from(["ts-relink"]).expect("parse");
        assert!(cli.mode.is_none());
        assert!(cli.days.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn days_must_be_a_positive_number() {
        assert!(Cli::try_parse_from(["ts-relink", "--days", "ten"]).is_err());
        assert!(Cli::try_parse_from(["ts-relink", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["ts-relink", "--days", "4294967295"]).is_err());
        assert!(Cli::try_parse_from(["ts-relink", "--days", "100001"]).is_err());
        let cli = Cli::try_parse_from(["ts-relink", "--days", "100000"]).expect("parse");
        assert_eq!(cli.overrides().days, Some(MAX_WINDOW_DAYS));
        let cli = Cli::try_parse_from(["ts-relink", "--days", "30"]).expect("parse");
        assert_eq!(cli.overrides().days, Some(30));
    }

    #[test]
    fn mode_and_days_conflict() {
        assert!(Cli::try_parse_from(["ts-relink", "--mode", "full", "--days", "5"]).is_err());
    }

    #[test]
    fn overrides_carry_flags() {
        let cli = Cli::try_parse_from([
            "ts-relink",
            "--log",
            "/tmp/log.txt",
            "--mode",
            "full",
            "--dialect",
            "task-spooler",
            "--queue-bin",
            "/opt/ts/bin/ts",
            "--dry-run",
            "-vv",
        ])
        .expect("parse");

        let overrides = cli.overrides();
        assert_eq!(overrides.log_path, Some(PathBuf::from("/tmp/log.txt")));
        assert_eq!(overrides.mode, Some(Mode::Full));
        assert_eq!(overrides.dialect, Some(QueueDialect::TaskSpooler));
        assert_eq!(overrides.queue_program.as_deref(), Some("/opt/ts/bin/ts"));
        assert!(overrides.dry_run);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn stray_positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["ts-relink", "extra"]).is_err());
    }
}
