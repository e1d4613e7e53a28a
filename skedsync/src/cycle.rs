//! One full pass: refresh the masters, pick sessions, refresh their schedules,
//! run drudg where needed, then report.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Utc};
use tracing::{error, info, warn};

use crate::catalog::read_master;
use crate::config::Config;
use crate::daemon::lock::{LockHandle, RETRY_INTERVAL};
use crate::error::CycleError;
use crate::invoker::ProcessingInvoker;
use crate::report::{StatusReport, write_last_check};
use crate::selector::select_sessions;
use crate::sync::retrieval::{RetrievalClient, TargetId};
use crate::sync::{SyncCoordinator, SyncOptions, SyncResult};
use crate::trigger::{ProcessingTrigger, SessionProcessing};

/// Flags that apply to one cycle only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCommand {
    pub force_master: bool,
    pub force_schedule: bool,
    /// Apply remote changes even when they differ from the local copy.
    pub accept_updates: bool,
    /// Status mode: no lock, no downloads, no processing.
    pub check_only: bool,
}

impl CycleCommand {
    /// The command for cycles after the first: forced downloads and accepted
    /// updates happen once.
    pub fn after_first(self) -> Self {
        if self.force_master {
            info!(
                "A forced Master schedule download was set. This has now been attempted so stopping the force."
            );
        }
        if self.force_schedule {
            info!(
                "A forced schedule download was set. This has now been attempted so stopping the force."
            );
        }
        if self.accept_updates {
            info!("Updated files were accepted in the first check. Later checks will hold them back again.");
        }
        CycleCommand {
            force_master: false,
            force_schedule: false,
            accept_updates: false,
            check_only: self.check_only,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCycle {
    pub code: String,
    /// `None` when syncing the schedule failed.
    pub sync: Option<SyncResult>,
    pub processing: Option<SessionProcessing>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub masters: Vec<(TargetId, SyncResult)>,
    pub sessions: Vec<SessionCycle>,
    pub status: StatusReport,
}

pub struct Cycle<'a> {
    config: &'a Config,
    client: &'a dyn RetrievalClient,
    invoker: &'a dyn ProcessingInvoker,
}

impl<'a> Cycle<'a> {
    pub fn new(
        config: &'a Config,
        client: &'a dyn RetrievalClient,
        invoker: &'a dyn ProcessingInvoker,
    ) -> Self {
        Cycle {
            config,
            client,
            invoker,
        }
    }

    fn master_targets(&self) -> Vec<TargetId> {
        let year = self.config.year;
        let mut targets = Vec::new();
        if self.config.get_master {
            targets.push(TargetId::Master { year });
        }
        if self.config.get_master_intensive {
            targets.push(TargetId::MasterIntensive { year });
        }
        targets
    }

    pub async fn run(&self, command: CycleCommand) -> Result<CycleReport, CycleError> {
        let config = self.config;
        let now = SystemTime::now();
        let lock = if command.check_only {
            None
        } else {
            Some(LockHandle::acquire(&config.lock_path, RETRY_INTERVAL).await?)
        };

        let options = SyncOptions {
            check_only: command.check_only,
            accept_updates: command.accept_updates,
            freshness_hours: 0.0,
        };
        let coordinator = SyncCoordinator::new(self.client, &config.servers, options, now);

        let targets = self.master_targets();
        let mut masters = Vec::new();
        if !command.check_only {
            for id in &targets {
                match coordinator
                    .sync_master(
                        id.clone(),
                        &config.sched_dir,
                        config.master_check_hours,
                        command.force_master,
                    )
                    .await
                {
                    Ok(result) => masters.push((id.clone(), result)),
                    Err(e) => error!("Failed to check {id}: {e}"),
                }
            }
        }

        let master_files: Vec<PathBuf> = targets
            .iter()
            .map(|id| config.sched_dir.join(id.file_name()))
            .filter(|p| p.exists())
            .collect();
        if master_files.is_empty() {
            return Err(CycleError::NoMasterFile(config.sched_dir.clone()));
        }

        let catalog = read_master(&master_files, config.year, &config.station_set())?;
        let now_utc: DateTime<Utc> = now.into();
        let selected = select_sessions(&catalog, now_utc, &config.selection_policy());
        if selected.is_empty() {
            warn!("No sessions were found that satisfy the criteria");
        }

        let trigger = ProcessingTrigger::new(self.invoker, config.do_drudg);
        let mut sessions = Vec::with_capacity(selected.len());
        for ses in &selected {
            let sync = coordinator
                .sync_schedule(
                    &ses.code,
                    ses.start.year(),
                    &config.sched_dir,
                    &config.sched_types,
                    config.schedule_check_hours,
                    command.force_schedule,
                )
                .await;
            let (sync, processing) = match sync {
                Ok(result) if command.check_only => (Some(result), None),
                Ok(result) => {
                    let processing = trigger.process(ses, &result).await;
                    (Some(result), Some(processing))
                }
                Err(e) => {
                    error!("Failed to check the schedule for {}: {e}", ses.code);
                    (None, None)
                }
            };
            sessions.push(SessionCycle {
                code: ses.code.clone(),
                sync,
                processing,
            });
        }

        if !command.check_only {
            if let Err(e) = write_last_check(&config.sched_dir, now_utc) {
                warn!("Failed to record the time of this check: {e}");
            }
            info!("** Schedule check completed **");
        }
        drop(lock);

        let status = StatusReport::gather(config, &master_files, &selected, SystemTime::now());
        status.log();
        Ok(CycleReport {
            masters,
            sessions,
            status,
        })
    }
}
