//! Atomic file replacement
//!
//! Every write goes `temp file -> fsync -> rename -> fsync dir`, so a reader
//! sees either the old or the new contents, never a mix. A failure at any
//! step leaves the destination untouched and the temp file is removed when
//! its handle drops.

use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::Builder;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Ordered steps of one atomic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    WriteTemp,
    SyncTemp,
    Rename,
    SyncDir,
}

impl WriteStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::WriteTemp => "write_temp",
            Self::SyncTemp => "fsync_temp",
            Self::Rename => "rename",
            Self::SyncDir => "fsync_dir",
        }
    }
}

/// Writes whole files atomically with fixed permission bits
#[derive(Debug, Clone, Default)]
pub struct AtomicWriter {
    crash_after: Option<WriteStep>,
}

impl AtomicWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort with an I/O error right after `step` completes
    #[cfg(test)]
    pub(crate) fn crash_after(mut self, step: WriteStep) -> Self {
        self.crash_after = Some(step);
        self
    }

    /// Replace `path` with `contents`, creating the parent directory if needed
    pub fn write(&self, path: &Path, contents: &[u8], mode: u32) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| Error::io("create_dir", dir, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut temp = Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| Error::io(WriteStep::WriteTemp.label(), dir, e))?;
        trace!(temp = %temp.path().display(), "created temp file");

        temp.write_all(contents)
            .and_then(|()| temp.flush())
            .and_then(|()| {
                temp.as_file()
                    .set_permissions(Permissions::from_mode(mode))
            })
            .map_err(|e| Error::io(WriteStep::WriteTemp.label(), temp.path(), e))?;
        self.checkpoint(WriteStep::WriteTemp, path)?;

        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(WriteStep::SyncTemp.label(), temp.path(), e))?;
        self.checkpoint(WriteStep::SyncTemp, path)?;

        temp.persist(path)
            .map_err(|e| Error::io(WriteStep::Rename.label(), path, e.error))?;
        self.checkpoint(WriteStep::Rename, path)?;

        sync_directory(dir)?;
        self.checkpoint(WriteStep::SyncDir, path)?;

        debug!(path = %path.display(), bytes = contents.len(), "atomically replaced file");
        Ok(())
    }

    fn checkpoint(&self, step: WriteStep, path: &Path) -> Result<()> {
        if self.crash_after == Some(step) {
            return Err(Error::io(
                step.label(),
                path,
                io::Error::other(format!("simulated crash after {}", step.label())),
            ));
        }
        Ok(())
    }
}

fn sync_directory(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| Error::io(WriteStep::SyncDir.label(), dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn write_creates_parent_and_sets_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/profiles.toml");

        AtomicWriter::new().write(&path, b"version = 1\n", 0o644).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "version = 1\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn executable_mode_applied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lsfg");

        AtomicWriter::new().write(&path, b"#!/bin/sh\n", 0o755).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn crash_before_rename_keeps_old_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write(&path, "old").unwrap();

        for step in [WriteStep::WriteTemp, WriteStep::SyncTemp] {
            let err = AtomicWriter::new()
                .crash_after(step)
                .write(&path, b"new", 0o644)
                .unwrap_err();
            assert_eq!(err.kind(), "IoError");
            assert_eq!(fs::read_to_string(&path).unwrap(), "old", "after {step:?}");
            assert!(leftovers(dir.path()).is_empty(), "temp left after {step:?}");
        }
    }

    #[test]
    fn crash_after_rename_exposes_new_contents_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write(&path, "old").unwrap();

        for step in [WriteStep::Rename, WriteStep::SyncDir] {
            let _ = AtomicWriter::new()
                .crash_after(step)
                .write(&path, b"new", 0o644);
            assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        }
    }

    #[test]
    fn missing_parent_is_reported_as_io() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let err = AtomicWriter::new()
            .write(&blocker.join("profiles.toml"), b"x", 0o644)
            .unwrap_err();
        assert!(matches!(err, Error::Io { step: "create_dir", .. }));
    }
}
