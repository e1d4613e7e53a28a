//! Host-wide exclusion between skedsync instances.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info};

pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// An exclusive advisory lock on one file, released on drop.
pub struct LockHandle {
    path: PathBuf,
    _lock: Flock<File>,
}

impl LockHandle {
    /// Take the lock if nobody else holds it.
    pub fn try_acquire(path: &Path) -> anyhow::Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o666)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        // umask strips bits from the requested mode
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o666)) {
            debug!("Could not set permissions on {}: {e}", path.display());
        }

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!("Acquired lock {}", path.display());
                Ok(Some(LockHandle {
                    path: path.to_path_buf(),
                    _lock: lock,
                }))
            }
            Err((_file, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_file, e)) => Err(anyhow::anyhow!("Lock failed on {}: {}", path.display(), e)),
        }
    }

    /// Wait for the lock, retrying every `retry`.
    pub async fn acquire(path: &Path, retry: Duration) -> anyhow::Result<Self> {
        let mut announced = false;
        loop {
            if let Some(handle) = Self::try_acquire(path)? {
                return Ok(handle);
            }
            if !announced {
                info!(
                    "Another instance of skedsync is running. Waiting for it to finish ({})",
                    path.display()
                );
                announced = true;
            }
            tokio::time::sleep(retry).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        debug!("Released lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_lock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skedsync.lock");

        let lock1 = LockHandle::try_acquire(&path)
            .unwrap()
            .expect("First lock should succeed");
        assert!(LockHandle::try_acquire(&path).unwrap().is_none());

        drop(lock1);
        let lock3 = LockHandle::try_acquire(&path).unwrap();
        assert!(lock3.is_some());
    }

    #[test]
    fn test_lock_file_is_world_writable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skedsync.lock");
        let _lock = LockHandle::try_acquire(&path).unwrap().unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
    }

    #[tokio::test]
    async fn test_second_waits_for_release() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skedsync.lock");
        let first = LockHandle::try_acquire(&path).unwrap().unwrap();

        let waiter_path = path.clone();
        let waiter = tokio::spawn(async move {
            LockHandle::acquire(&waiter_path, Duration::from_millis(20)).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should finish after release")
            .unwrap()
            .unwrap();
        assert_eq!(second.path(), path.as_path());
    }
}
