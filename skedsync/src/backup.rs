//! Versioned snapshots of a single file.
//!
//! A backup of `path` lives next to it as `path.bak.N`; an update that is held
//! back for the operator lives at `path.new`.

use std::ffi::OsString;
use std::fs::{self, File, FileTimes};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BackupError;

const BACKUP_INFIX: &str = ".bak.";
const QUARANTINE_SUFFIX: &str = ".new";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub source_path: PathBuf,
    pub version: u32,
    pub backup_path: PathBuf,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn backup_path(path: &Path, version: u32) -> PathBuf {
    with_suffix(path, &format!("{BACKUP_INFIX}{version}"))
}

pub fn quarantine_path(path: &Path) -> PathBuf {
    with_suffix(path, QUARANTINE_SUFFIX)
}

/// Copy `path` to the first unused `path.bak.N`, probing from `N = 1`.
pub fn backup(path: &Path) -> Result<BackupSnapshot, BackupError> {
    if !path.exists() {
        return Err(BackupError::SourceMissing(path.to_path_buf()));
    }

    let version = (1u32..)
        .find(|n| !backup_path(path, *n).exists())
        .unwrap_or(u32::MAX);
    let target = backup_path(path, version);

    fs::copy(path, &target).map_err(|e| match e.kind() {
        ErrorKind::NotFound => BackupError::SourceMissing(path.to_path_buf()),
        _ => BackupError::Io {
            path: target.clone(),
            source: e,
        },
    })?;

    if !target.is_file() {
        return Err(BackupError::CopyMissing {
            source_path: path.to_path_buf(),
            backup_path: target,
        });
    }
    // keep the release time of the source file
    if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
        File::options()
            .write(true)
            .open(&target)
            .and_then(|f| f.set_times(FileTimes::new().set_modified(modified)))
            .map_err(io_err(&target))?;
    }
    debug!("Backed up {} to {}", path.display(), target.display());

    Ok(BackupSnapshot {
        source_path: path.to_path_buf(),
        version,
        backup_path: target,
    })
}

/// Remove a backup. Missing files are fine.
pub fn discard(backup_path: &Path) -> Result<(), BackupError> {
    match fs::remove_file(backup_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(backup_path)(e)),
    }
}

/// Replace `target` with `backup`, consuming the backup.
pub fn promote(backup: &Path, target: &Path) -> Result<(), BackupError> {
    fs::rename(backup, target).map_err(io_err(backup))?;
    debug!("Restored {} from {}", target.display(), backup.display());
    Ok(())
}

/// Move a freshly retrieved file aside to `path.new`, replacing any older one.
pub fn quarantine(path: &Path) -> Result<PathBuf, BackupError> {
    let held = quarantine_path(path);
    fs::rename(path, &held).map_err(io_err(path))?;
    Ok(held)
}

/// Every `path.bak.N` currently on disk, in version order.
pub fn leftover_backups(path: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(Vec::new());
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let prefix = format!("{}{BACKUP_INFIX}", name.to_string_lossy());

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir)(e)),
    };

    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err(dir))?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(version) = file_name
            .strip_prefix(&prefix)
            .and_then(|v| v.parse::<u32>().ok())
        {
            found.push((version, entry.path()));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// True when both files hold exactly the same bytes.
pub fn same_content(a: &Path, b: &Path) -> Result<bool, BackupError> {
    let meta_a = fs::metadata(a).map_err(io_err(a))?;
    let meta_b = fs::metadata(b).map_err(io_err(b))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let left = fs::read(a).map_err(io_err(a))?;
    let right = fs::read(b).map_err(io_err(b))?;
    Ok(left == right)
}
