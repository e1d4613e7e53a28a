//! Per-file synchronisation against the schedule servers.
//!
//! Each target goes through one pass of a small state machine: decide whether
//! a check is due, snapshot the local copy, ask every server in turn, then
//! reconcile what arrived against the snapshot. A re-published file with the
//! same bytes is quietly restored; a file whose content really changed is held
//! back as `<file>.new` until an operator accepts it.

pub mod auth;
pub mod http;
pub mod retrieval;

use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::backup::{self, BackupSnapshot};
use crate::error::SyncError;
use crate::session::ScheduleType;
use retrieval::{Retrieval, RetrievalClient, TargetId};

/// Terminal state of one target's sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Check interval not elapsed, or a read-only pass.
    Skipped,
    NoneFound,
    Unchanged,
    NewConfirmed,
    /// Different content arrived and was quarantined.
    NewAmbiguous,
}

/// A file to keep in sync during this cycle.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub id: TargetId,
    pub local_path: PathBuf,
    pub last_access_time: Option<SystemTime>,
    pub check_interval_hours: f64,
    pub forced: bool,
}

impl SyncTarget {
    /// Build a target in `dir`, reading the access time of any local copy.
    pub fn new(id: TargetId, dir: &Path, check_interval_hours: f64, forced: bool) -> Self {
        let local_path = dir.join(id.file_name());
        let last_access_time = fs::metadata(&local_path).and_then(|m| m.accessed()).ok();
        SyncTarget {
            id,
            local_path,
            last_access_time,
            check_interval_hours,
            forced,
        }
    }

    pub fn is_due(&self, now: SystemTime) -> bool {
        if self.forced || !self.local_path.exists() {
            return true;
        }
        let interval = Duration::try_from_secs_f64((self.check_interval_hours * 3600.0).max(0.0))
            .unwrap_or(Duration::MAX);
        match self.last_access_time {
            Some(accessed) => now
                .duration_since(accessed)
                .map(|elapsed| elapsed > interval)
                .unwrap_or(false),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub state: SyncState,
    pub got_file: bool,
    pub is_new: bool,
    pub resolved_type: Option<ScheduleType>,
    pub ok_to_process: bool,
}

impl SyncResult {
    fn new(state: SyncState, got_file: bool, is_new: bool, ok_to_process: bool) -> Self {
        SyncResult {
            state,
            got_file,
            is_new,
            resolved_type: None,
            ok_to_process,
        }
    }

    pub fn none_found() -> Self {
        SyncResult::new(SyncState::NoneFound, false, false, false)
    }
}

/// Per-cycle switches for the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Status mode: look at local files only.
    pub check_only: bool,
    /// Accept remote changes that would otherwise be quarantined.
    pub accept_updates: bool,
    pub freshness_hours: f64,
}

/// Drives the sync passes of one cycle; `now` is fixed for the whole cycle.
pub struct SyncCoordinator<'a> {
    client: &'a dyn RetrievalClient,
    servers: &'a [String],
    options: SyncOptions,
    now: SystemTime,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(
        client: &'a dyn RetrievalClient,
        servers: &'a [String],
        options: SyncOptions,
        now: SystemTime,
    ) -> Self {
        SyncCoordinator {
            client,
            servers,
            options,
            now,
        }
    }

    /// Run one target through the check/retrieve/reconcile pass.
    pub async fn sync_target(&self, target: &SyncTarget) -> Result<SyncResult, SyncError> {
        let local = &target.local_path;
        let local_exists = local.exists();

        if self.options.check_only {
            return Ok(SyncResult::new(
                SyncState::Skipped,
                local_exists,
                false,
                local_exists,
            ));
        }

        let pending = self.options.accept_updates && backup::quarantine_path(local).exists();
        if !target.is_due(self.now) && !pending {
            for leftover in backup::leftover_backups(local)? {
                backup::discard(&leftover)?;
            }
            info!(
                "Less than {} h since {} was last checked. Skipping",
                target.check_interval_hours, target.id
            );
            return Ok(SyncResult::new(SyncState::Skipped, true, false, true));
        }

        info!("Checking {}", target.id);
        if !local_exists {
            info!("File doesn't exist locally");
        } else if target.forced {
            info!("A download has been forced");
        } else if pending {
            info!("An update is waiting in {}", backup::quarantine_path(local).display());
        } else {
            info!(
                "It's been longer than the {} h check interval",
                target.check_interval_hours
            );
        }

        let snapshot = if local_exists {
            Some(backup::backup(local)?)
        } else {
            None
        };

        let fetched = self.retrieve_from_servers(target).await;
        let result = self.reconcile(target, snapshot, fetched)?;

        if result.got_file {
            mark_checked(local);
        }
        debug!("{} finished as {:?}", target.id, result.state);
        Ok(result)
    }

    /// Ask every server in priority order, one after the other.
    ///
    /// Once a forced download has produced a new file, later servers are only
    /// asked for something newer still.
    async fn retrieve_from_servers(&self, target: &SyncTarget) -> Retrieval {
        let dest_dir = target.local_path.parent().unwrap_or(Path::new("."));
        let mut forced = target.forced;
        let mut total = Retrieval::default();

        for server in self.servers {
            info!("Checking {} at {server}", target.id);
            match self
                .client
                .retrieve(server, &target.id, dest_dir, forced, self.options.freshness_hours)
                .await
            {
                Ok(got) => {
                    if forced && got.obtained && got.is_new {
                        forced = false;
                    }
                    total.obtained |= got.obtained;
                    total.is_new |= got.is_new;
                }
                Err(e) => warn!("Failed to retrieve {} from {server}: {e}", target.id),
            }
        }
        total
    }

    fn reconcile(
        &self,
        target: &SyncTarget,
        snapshot: Option<BackupSnapshot>,
        fetched: Retrieval,
    ) -> Result<SyncResult, SyncError> {
        let local = &target.local_path;
        let held = backup::quarantine_path(local);
        let accept = self.options.accept_updates;

        if let (Some(snap), true) = (&snapshot, fetched.obtained && fetched.is_new) {
            if accept {
                backup::discard(&held)?;
                backup::discard(&snap.backup_path)?;
                info!("Accepting the new version of {}", target.id);
                return Ok(SyncResult::new(SyncState::NewConfirmed, true, true, true));
            }

            if backup::same_content(local, &snap.backup_path)? {
                backup::promote(&snap.backup_path, local)?;
                info!(
                    "{} was re-published without content changes. Keeping the local copy.",
                    target.id
                );
                return Ok(SyncResult::new(SyncState::Unchanged, true, false, false));
            }

            let quarantined = backup::quarantine(local)?;
            backup::promote(&snap.backup_path, local)?;
            warn!(
                "A new version of {} differs from the local copy and has NOT been applied. \
                 It was saved as {}. Compare the two files; to use the new version either \
                 rename {} to {} by hand, or run again with --update.",
                target.id,
                quarantined.display(),
                quarantined.display(),
                local.display()
            );
            return Ok(SyncResult::new(SyncState::NewAmbiguous, true, true, false));
        }

        if let Some(snap) = snapshot {
            backup::discard(&snap.backup_path)?;
        }

        if accept && held.exists() && !(fetched.obtained && fetched.is_new) {
            backup::promote(&held, local)?;
            info!("Promoted {} to {}", held.display(), local.display());
            return Ok(SyncResult::new(SyncState::NewConfirmed, true, true, true));
        }

        match (fetched.obtained, fetched.is_new) {
            (false, _) => {
                info!("{} was not found on any server", target.id);
                Ok(SyncResult::none_found())
            }
            (true, true) => {
                if accept {
                    backup::discard(&held)?;
                }
                info!("Downloaded {}", target.id);
                Ok(SyncResult::new(SyncState::NewConfirmed, true, true, true))
            }
            (true, false) => {
                info!("The local copy of {} is up to date", target.id);
                Ok(SyncResult::new(SyncState::Unchanged, true, false, true))
            }
        }
    }

    /// Sync a master catalog.
    pub async fn sync_master(
        &self,
        id: TargetId,
        dir: &Path,
        check_interval_hours: f64,
        forced: bool,
    ) -> Result<SyncResult, SyncError> {
        let target = SyncTarget::new(id, dir, check_interval_hours, forced);
        self.sync_target(&target).await
    }

    /// Sync the schedule file of one session.
    ///
    /// If a local copy of some type exists only that type is checked,
    /// otherwise the types are tried in priority order until one is found.
    pub async fn sync_schedule(
        &self,
        code: &str,
        year: i32,
        dir: &Path,
        types: &[ScheduleType],
        check_interval_hours: f64,
        forced: bool,
    ) -> Result<SyncResult, SyncError> {
        let schedule = |sched_type| TargetId::Schedule {
            code: code.to_string(),
            year,
            sched_type,
        };
        let existing = types
            .iter()
            .copied()
            .find(|t| dir.join(schedule(*t).file_name()).exists());
        let candidates = match existing {
            Some(t) => vec![t],
            None => types.to_vec(),
        };
        debug!("Checking file types {candidates:?} for {code}");

        let mut last = SyncResult::none_found();
        for sched_type in candidates {
            let target = SyncTarget::new(schedule(sched_type), dir, check_interval_hours, forced);
            let mut result = self.sync_target(&target).await?;
            if result.got_file {
                result.resolved_type = Some(sched_type);
                return Ok(result);
            }
            last = result;
        }
        Ok(last)
    }
}

/// Record the check time on the local copy; the next due test reads it back.
fn mark_checked(path: &Path) {
    let touched = File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_times(FileTimes::new().set_accessed(SystemTime::now())));
    if let Err(e) = touched {
        debug!("Could not update access time of {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_interval_is_never_due() {
        let dir = tempfile::tempdir().unwrap();
        let id = TargetId::Master { year: 2024 };
        fs::write(dir.path().join(id.file_name()), "master").unwrap();

        let target = SyncTarget::new(id, dir.path(), f64::INFINITY, false);
        let later = SystemTime::now() + Duration::from_secs(3600 * 24 * 365);
        assert!(!target.is_due(later));

        let forced = SyncTarget {
            forced: true,
            ..target
        };
        assert!(forced.is_due(later));
    }
}
