// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    ConfigFile, PollConfig, RawConfigFile, ShellConfig, TransportConfig,
};
use crate::config::{expand_home, parse_duration};
use crate::errors::{ChatShellError, Result};
use crate::exec::OutputSettings;
use crate::transport::parse_room_id;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ChatShellError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let transport = validate_transport(&raw)?;
        let authorized_senders = validate_access(&raw)?;
        let shell = validate_shell(&raw)?;
        let poll = validate_poll(&raw)?;
        let output = validate_output(&raw)?;

        Ok(ConfigFile {
            transport,
            authorized_senders,
            shell,
            poll,
            output,
            audit_log: expand_home(&raw.audit.log_file),
        })
    }
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| ChatShellError::ConfigError(format!("[{section}].{field}: {e}")))
}

fn validate_transport(cfg: &RawConfigFile) -> Result<TransportConfig> {
    let raw_room = cfg
        .transport
        .room_id
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| {
            ChatShellError::ConfigError(
                "a room is required ([transport].room_id or --room-id)".to_string(),
            )
        })?;

    let request_timeout = duration_field("transport", "request_timeout", &cfg.transport.request_timeout)?;
    if request_timeout.is_zero() {
        return Err(ChatShellError::ConfigError(
            "[transport].request_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(TransportConfig {
        room_id: parse_room_id(raw_room)?,
        api_base: cfg.transport.api_base.clone(),
        token_env: cfg.transport.token_env.clone(),
        request_timeout,
    })
}

fn validate_access(cfg: &RawConfigFile) -> Result<Vec<String>> {
    let senders: Vec<String> = cfg
        .access
        .authorized_senders
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if senders.is_empty() {
        return Err(ChatShellError::ConfigError(
            "at least one authorized sender is required ([access].authorized_senders or --person-emails)"
                .to_string(),
        ));
    }
    Ok(senders)
}

fn validate_shell(cfg: &RawConfigFile) -> Result<ShellConfig> {
    let shell = &cfg.shell;

    if shell.program.trim().is_empty() {
        return Err(ChatShellError::ConfigError(
            "[shell].program must not be empty".to_string(),
        ));
    }
    if shell.max_workers == 0 {
        return Err(ChatShellError::ConfigError(
            "[shell].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if shell.queue_length == 0 {
        return Err(ChatShellError::ConfigError(
            "[shell].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }

    let timeout = duration_field("shell", "timeout", &shell.timeout)?;

    Ok(ShellConfig {
        program: shell.program.trim().to_string(),
        timeout: (!timeout.is_zero()).then_some(timeout),
        max_workers: shell.max_workers,
        queue_length: shell.queue_length,
        kill_on_shutdown: shell.kill_on_shutdown,
    })
}

fn validate_poll(cfg: &RawConfigFile) -> Result<PollConfig> {
    let interval = duration_field("poll", "interval", &cfg.poll.interval)?;
    if interval.is_zero() {
        return Err(ChatShellError::ConfigError(
            "[poll].interval must be greater than zero".to_string(),
        ));
    }
    if cfg.poll.batch_size == 0 {
        return Err(ChatShellError::ConfigError(
            "[poll].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(PollConfig {
        interval,
        batch_size: cfg.poll.batch_size,
    })
}

fn validate_output(cfg: &RawConfigFile) -> Result<OutputSettings> {
    if cfg.output.spillover_threshold == 0 {
        return Err(ChatShellError::ConfigError(
            "[output].spillover_threshold must be >= 1 (got 0)".to_string(),
        ));
    }

    let downloads_dir = cfg
        .output
        .downloads_dir
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(std::env::temp_dir);

    Ok(OutputSettings {
        spillover_threshold: cfg.output.spillover_threshold,
        downloads_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: &str = "0c7e3e40-1b7a-11ee-a0f4-5b1f3e9a1c2d";

    fn minimal() -> RawConfigFile {
        let mut raw = RawConfigFile::default();
        raw.transport.room_id = Some(ROOM.to_string());
        raw.access.authorized_senders = vec!["ops@example.com".to_string()];
        raw
    }

    fn config_error(raw: RawConfigFile) -> String {
        match ConfigFile::try_from(raw) {
            Err(ChatShellError::ConfigError(msg)) => msg,
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn defaults_validate() {
        let cfg = ConfigFile::try_from(minimal()).unwrap();
        assert_eq!(cfg.transport.room_id, ROOM);
        assert_eq!(cfg.shell.program, "bash");
        assert_eq!(cfg.shell.timeout, None);
        assert_eq!(cfg.shell.max_workers, 100);
        assert_eq!(cfg.poll.interval, Duration::from_secs(2));
        assert_eq!(cfg.poll.batch_size, 10);
        assert_eq!(cfg.output.spillover_threshold, 5000);
        assert!(cfg.shell.kill_on_shutdown);
    }

    #[test]
    fn non_zero_timeout_is_enabled() {
        let mut raw = minimal();
        raw.shell.timeout = "90s".to_string();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.shell.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn missing_room_is_rejected() {
        let mut raw = minimal();
        raw.transport.room_id = None;
        assert!(config_error(raw).contains("room"));
    }

    #[test]
    fn blank_senders_do_not_count() {
        let mut raw = minimal();
        raw.access.authorized_senders = vec!["  ".to_string()];
        assert!(config_error(raw).contains("authorized sender"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut raw = minimal();
        raw.shell.max_workers = 0;
        assert!(config_error(raw).contains("max_workers"));
    }

    #[test]
    fn bad_duration_names_the_field() {
        let mut raw = minimal();
        raw.poll.interval = "soon".to_string();
        assert!(config_error(raw).contains("[poll].interval"));
    }

    #[test]
    fn zero_spillover_is_rejected() {
        let mut raw = minimal();
        raw.output.spillover_threshold = 0;
        assert!(config_error(raw).contains("spillover_threshold"));
    }
}
