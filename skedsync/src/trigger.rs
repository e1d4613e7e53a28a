//! Decides, per station, whether drudg has to be (re-)run for a session.

use tracing::{error, info};

use crate::invoker::{Artifacts, ProcessingInvoker};
use crate::session::Session;
use crate::sync::{SyncResult, SyncState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub station: String,
    pub success: bool,
    /// SNAP, procedure and listing files on success.
    pub artifacts: Option<Artifacts>,
}

/// What the trigger did for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionProcessing {
    pub code: String,
    pub queued: Vec<String>,
    pub outcomes: Vec<ProcessingOutcome>,
    pub note: Option<String>,
}

impl SessionProcessing {
    pub fn failures(&self) -> impl Iterator<Item = &ProcessingOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

pub struct ProcessingTrigger<'a> {
    invoker: &'a dyn ProcessingInvoker,
    enabled: bool,
}

impl<'a> ProcessingTrigger<'a> {
    /// `enabled = false` computes the queue but never runs the invoker.
    pub fn new(invoker: &'a dyn ProcessingInvoker, enabled: bool) -> Self {
        ProcessingTrigger { invoker, enabled }
    }

    /// Stations of `session` that need processing given this cycle's sync result.
    pub fn stations_to_process(
        &self,
        session: &Session,
        result: &SyncResult,
    ) -> Result<Vec<String>, String> {
        match (result.state, result.resolved_type) {
            (SyncState::NewConfirmed, Some(_)) if result.ok_to_process => {
                Ok(session.relevant_stations.iter().cloned().collect())
            }
            (SyncState::Unchanged | SyncState::Skipped, Some(sched_type))
                if result.ok_to_process && result.got_file =>
            {
                Ok(session
                    .relevant_stations
                    .iter()
                    .filter(|stn| {
                        !self
                            .invoker
                            .artifacts_current(sched_type, &session.code, stn)
                    })
                    .cloned()
                    .collect())
            }
            (SyncState::NoneFound, _) | (_, None) => {
                Err("There is no schedule file on the server.".to_string())
            }
            (SyncState::NewAmbiguous, _) => Err(
                "A new schedule file is waiting for operator review. Not processing.".to_string(),
            ),
            _ => Err("The schedule file was re-published unchanged. Not processing.".to_string()),
        }
    }

    /// Queue stations and run the invoker once per queued station.
    pub async fn process(&self, session: &Session, result: &SyncResult) -> SessionProcessing {
        let mut processing = SessionProcessing {
            code: session.code.clone(),
            ..Default::default()
        };
        processing.queued = match self.stations_to_process(session, result) {
            Ok(queued) => queued,
            Err(note) => {
                info!("{}: {note}", session.code);
                processing.note = Some(note);
                return processing;
            }
        };

        if processing.queued.is_empty() {
            info!("{}: files for all stations are up to date", session.code);
            return processing;
        }
        if !self.enabled {
            info!(
                "{}: drudg will not be run (needed for {})",
                session.code,
                processing.queued.join(", ")
            );
            return processing;
        }
        let Some(sched_type) = result.resolved_type else {
            return processing;
        };

        for station in &processing.queued {
            let outcome = match self
                .invoker
                .invoke(station, &session.code, sched_type)
                .await
            {
                Ok(artifacts) => {
                    let [snap, prc, lst] = artifacts.paths();
                    info!(
                        "Drudg created the following files: {} {} {}",
                        snap.display(),
                        prc.display(),
                        lst.display()
                    );
                    ProcessingOutcome {
                        station: station.clone(),
                        success: true,
                        artifacts: Some(artifacts),
                    }
                }
                Err(e) => {
                    error!("{}: processing failed for station {station}: {e}", session.code);
                    ProcessingOutcome {
                        station: station.clone(),
                        success: false,
                        artifacts: None,
                    }
                }
            };
            processing.outcomes.push(outcome);
        }
        processing
    }
}
