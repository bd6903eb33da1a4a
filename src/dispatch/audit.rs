// src/dispatch/audit.rs

//! Append-only audit log: the durable record of every lifecycle event.

use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::pipeline::Sink;
use crate::errors::Result;

/// One line for the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub sender: String,
    pub message: String,
}

/// Sink owning the audit file handle. Only the audit consumer writes to it.
pub struct AuditSink {
    file: File,
    room_title: String,
}

impl AuditSink {
    /// Open (creating if needed) the audit log in append mode.
    pub async fn open(path: &Path, room_title: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating audit log dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening audit log {}", path.display()))?;

        info!(path = %path.display(), "writing audit log");
        Ok(Self {
            file,
            room_title: room_title.into(),
        })
    }
}

pub fn format_audit_line(entry: &AuditEntry, room_title: &str) -> String {
    format!(
        "[{}] {} on room {} : {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        entry.sender,
        room_title,
        entry.message
    )
}

impl Sink<AuditEntry> for AuditSink {
    async fn handle(&mut self, entry: AuditEntry) {
        let line = format_audit_line(&entry, &self.room_title);
        if let Err(e) = self.file.write_all(line.as_bytes()).await {
            error!(error = %e, "failed to append to audit log");
        }
    }

    async fn finish(&mut self) {
        if let Err(e) = self.file.flush().await {
            error!(error = %e, "failed to flush audit log");
        }
        if let Err(e) = self.file.sync_all().await {
            error!(error = %e, "failed to sync audit log");
        }
    }
}
