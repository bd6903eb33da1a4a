// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::OutputSettings;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [transport]
/// room_id = "0c7e3e40-1b7a-11ee-a0f4-5b1f3e9a1c2d"
///
/// [access]
/// authorized_senders = ["ops@example.com"]
///
/// [shell]
/// program = "bash"
/// timeout = "10m"
///
/// [output]
/// downloads_dir = "/var/tmp/chatshell"
/// ```
///
/// Every section is optional; only a room and at least one authorized
/// sender must come from somewhere (file or CLI flags).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub audit: AuditSection,
}

/// `[transport]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    /// Room UUID or base64 room URN. Overridden by `--room-id`.
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the bot access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_api_base() -> String {
    "https://webexapis.com/v1".to_string()
}

fn default_token_env() -> String {
    "WEBEX_ACCESS_TOKEN".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            room_id: None,
            api_base: default_api_base(),
            token_env: default_token_env(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// `[access]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessSection {
    #[serde(default)]
    pub authorized_senders: Vec<String>,
}

/// `[shell]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellSection {
    #[serde(default = "default_program")]
    pub program: String,
    /// `"0s"` disables the timeout.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Capacity of the work queue in front of the workers.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    /// Terminate live commands when the bot shuts down instead of waiting
    /// for them.
    #[serde(default = "default_kill_on_shutdown")]
    pub kill_on_shutdown: bool,
}

fn default_program() -> String {
    "bash".to_string()
}

fn default_timeout() -> String {
    "0s".to_string()
}

fn default_max_workers() -> usize {
    100
}

fn default_queue_length() -> usize {
    10
}

fn default_kill_on_shutdown() -> bool {
    true
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout: default_timeout(),
            max_workers: default_max_workers(),
            queue_length: default_queue_length(),
            kill_on_shutdown: default_kill_on_shutdown(),
        }
    }
}

/// `[poll]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSection {
    #[serde(default = "default_interval")]
    pub interval: String,
    /// How many recent messages to fetch per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_interval() -> String {
    "2s".to_string()
}

fn default_batch_size() -> usize {
    10
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            batch_size: default_batch_size(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default = "default_spillover_threshold")]
    pub spillover_threshold: usize,
    /// Defaults to the OS temp dir.
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
}

fn default_spillover_threshold() -> usize {
    5000
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            spillover_threshold: default_spillover_threshold(),
            downloads_dir: None,
        }
    }
}

/// `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("shell.log")
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

/// Validated, typed configuration. Build it with `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub transport: TransportConfig,
    pub authorized_senders: Vec<String>,
    pub shell: ShellConfig,
    pub poll: PollConfig,
    pub output: OutputSettings,
    pub audit_log: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bare room UUID.
    pub room_id: String,
    pub api_base: String,
    pub token_env: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub program: String,
    /// `None` when disabled.
    pub timeout: Option<Duration>,
    pub max_workers: usize,
    pub queue_length: usize,
    pub kill_on_shutdown: bool,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub batch_size: usize,
}
