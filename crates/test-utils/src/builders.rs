use std::path::{Path, PathBuf};

use chatshell::config::{ConfigFile, RawConfigFile};
use chatshell::transport::{RoomInfo, RoomKind};

pub const ROOM_ID: &str = "0c7e3e40-1b7a-11ee-a0f4-5b1f3e9a1c2d";
pub const OPERATOR: &str = "ops@example.com";

pub fn test_room() -> RoomInfo {
    RoomInfo {
        id: ROOM_ID.to_string(),
        title: "ops room".to_string(),
        kind: RoomKind::Direct,
    }
}

/// Builder for a valid `ConfigFile` whose files all live under one scratch
/// directory.
pub struct ConfigBuilder {
    raw: RawConfigFile,
    dir: PathBuf,
}

impl ConfigBuilder {
    pub fn new(dir: &Path) -> Self {
        let mut raw = RawConfigFile::default();
        raw.transport.room_id = Some(ROOM_ID.to_string());
        raw.access.authorized_senders = vec![OPERATOR.to_string()];
        raw.shell.program = "sh".to_string();
        raw.poll.interval = "50ms".to_string();
        raw.output.downloads_dir = Some(dir.join("downloads"));
        raw.audit.log_file = dir.join("audit.log");
        Self {
            raw,
            dir: dir.to_path_buf(),
        }
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.raw.shell.timeout = timeout.to_string();
        self
    }

    pub fn spillover_threshold(mut self, bytes: usize) -> Self {
        self.raw.output.spillover_threshold = bytes;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.raw.shell.max_workers = n;
        self
    }

    pub fn queue_length(mut self, n: usize) -> Self {
        self.raw.shell.queue_length = n;
        self
    }

    pub fn shell(mut self, program: &str) -> Self {
        self.raw.shell.program = program.to_string();
        self
    }

    pub fn kill_on_shutdown(mut self, enabled: bool) -> Self {
        self.raw.shell.kill_on_shutdown = enabled;
        self
    }

    pub fn senders(mut self, senders: &[&str]) -> Self {
        self.raw.access.authorized_senders = senders.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn audit_log(&self) -> PathBuf {
        self.dir.join("audit.log")
    }

    pub fn raw(self) -> RawConfigFile {
        self.raw
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.raw).expect("Failed to build valid config from builder")
    }
}
