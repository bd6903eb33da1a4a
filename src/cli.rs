// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;

/// Command-line arguments for `chatshell`.
///
/// Every flag except `--config`, `--log-level` and `--dry-run` overrides the
/// matching config file value.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "chatshell",
    version,
    about = "Run shell commands sent by authorized users in a chat room.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). Optional; a missing file means defaults.
    #[arg(long, value_name = "PATH", default_value = "chatshell.toml")]
    pub config: PathBuf,

    /// Room to listen in: a UUID or a base64 room URN.
    #[arg(long, value_name = "ID")]
    pub room_id: Option<String>,

    /// Comma separated addresses allowed to issue commands.
    #[arg(long, value_name = "EMAILS", value_delimiter = ',')]
    pub person_emails: Vec<String>,

    /// Audit log file.
    #[arg(long, value_name = "PATH")]
    pub logfile: Option<PathBuf>,

    /// Shell used to run commands (`<shell> -c <line>`).
    #[arg(long, value_name = "PROGRAM")]
    pub shell: Option<String>,

    /// Kill a command after this long, e.g. `30s`, `5m`. `0s` disables.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Directory for oversized output files.
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHATSHELL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the configuration, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Apply flag overrides on top of the file config.
    pub fn apply_to(&self, raw: &mut RawConfigFile) {
        if let Some(room) = &self.room_id {
            raw.transport.room_id = Some(room.clone());
        }
        let emails: Vec<String> = self
            .person_emails
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if !emails.is_empty() {
            raw.access.authorized_senders = emails;
        }
        if let Some(path) = &self.logfile {
            raw.audit.log_file = path.clone();
        }
        if let Some(shell) = &self.shell {
            raw.shell.program = shell.clone();
        }
        if let Some(timeout) = &self.timeout {
            raw.shell.timeout = timeout.clone();
        }
        if let Some(dir) = &self.downloads_dir {
            raw.output.downloads_dir = Some(dir.clone());
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
