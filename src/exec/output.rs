// src/exec/output.rs

//! Output capture and inline-vs-file routing.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CommandId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Stdout => "STDOUT",
            StreamKind::Stderr => "STDERR",
        })
    }
}

/// Where captured output goes.
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Streams longer than this many bytes are written to a file.
    pub spillover_threshold: usize,
    pub downloads_dir: PathBuf,
}

/// A file written for one oversized stream.
///
/// Removed from disk when dropped, so the response consumer only has to let
/// it go out of scope after delivery, whatever the send outcome.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scratch file"),
        }
    }
}

/// One captured stream after routing.
#[derive(Debug)]
pub enum RoutedStream {
    Empty,
    Inline(String),
    Spilled { file: ScratchFile, len: usize },
    /// Oversized, but the scratch file could not be written.
    Unsaved { len: usize, error: String },
}

/// Drain a child pipe into memory on a separate task so the process never
/// blocks on a full pipe.
pub fn capture<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf).await {
                warn!(error = %e, "error while reading child output; keeping partial output");
            }
        }
        buf
    })
}

/// Decide how a captured stream is delivered.
pub async fn route_stream(
    id: &CommandId,
    kind: StreamKind,
    bytes: &[u8],
    settings: &OutputSettings,
) -> RoutedStream {
    if bytes.is_empty() {
        return RoutedStream::Empty;
    }

    if bytes.len() <= settings.spillover_threshold {
        return RoutedStream::Inline(String::from_utf8_lossy(bytes).into_owned());
    }

    match write_scratch(id, kind, bytes, &settings.downloads_dir).await {
        Ok(file) => RoutedStream::Spilled {
            file,
            len: bytes.len(),
        },
        Err(e) => RoutedStream::Unsaved {
            len: bytes.len(),
            error: e.to_string(),
        },
    }
}

async fn write_scratch(
    id: &CommandId,
    kind: StreamKind,
    bytes: &[u8],
    dir: &Path,
) -> Result<ScratchFile> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating downloads dir {}", dir.display()))?;

    let path = dir.join(format!("{kind}-{id}.txt"));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing scratch file {}", path.display()))?;

    debug!(command_id = %id, stream = %kind, bytes = bytes.len(), path = %path.display(), "spilled output to file");
    Ok(ScratchFile { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, threshold: usize) -> OutputSettings {
        OutputSettings {
            spillover_threshold: threshold,
            downloads_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn small_output_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let id = CommandId::new();
        let routed = route_stream(&id, StreamKind::Stdout, b"hi\n", &settings(dir.path(), 5000)).await;
        assert!(matches!(routed, RoutedStream::Inline(ref s) if s == "hi\n"));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let id = CommandId::new();
        let exactly = vec![b'x'; 10];
        let routed = route_stream(&id, StreamKind::Stdout, &exactly, &settings(dir.path(), 10)).await;
        assert!(matches!(routed, RoutedStream::Inline(_)));
    }

    #[tokio::test]
    async fn large_output_spills_and_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let id = CommandId::new();
        let bytes: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();

        let routed = route_stream(&id, StreamKind::Stderr, &bytes, &settings(dir.path(), 5000)).await;
        let RoutedStream::Spilled { file, len } = routed else {
            panic!("expected spilled output, got {routed:?}");
        };
        assert_eq!(len, 6000);
        assert_eq!(file.file_name(), format!("STDERR-{id}.txt"));
        assert_eq!(std::fs::read(file.path()).unwrap(), bytes);

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_output_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let routed = route_stream(&CommandId::new(), StreamKind::Stdout, b"", &settings(dir.path(), 1)).await;
        assert!(matches!(routed, RoutedStream::Empty));
    }
}
