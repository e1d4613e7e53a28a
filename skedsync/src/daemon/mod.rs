//! Continuous mode: one initial cycle, then a worker and a scheduler task
//! until SIGINT or SIGTERM.

pub mod lock;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::cycle::{Cycle, CycleCommand};
use crate::invoker::ProcessingInvoker;
use crate::sync::retrieval::RetrievalClient;
use scheduler::{CycleRunner, cycle_wait};

/// How long an in-flight cycle may keep the process alive after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Runs cycles with shared, immutable settings.
pub struct CycleService {
    pub config: Arc<Config>,
    pub client: Arc<dyn RetrievalClient>,
    pub invoker: Arc<dyn ProcessingInvoker>,
    pub command: CycleCommand,
}

#[async_trait]
impl CycleRunner for CycleService {
    async fn run_cycle(&self) {
        let cycle = Cycle::new(&self.config, self.client.as_ref(), self.invoker.as_ref());
        if let Err(e) = cycle.run(self.command).await {
            error!("Schedule check failed: {e}");
        }
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
pub fn watch_signals(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to listen for ctrl_c: {e:?}");
            }
        };
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e:?}");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        info!("Received shutdown signal, cancelling...");
        token.cancel();
    });
}

/// Run the first cycle, then keep checking until `shutdown` fires.
pub async fn run_continuous(
    service: CycleService,
    quiet: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let cycle = Cycle::new(
        &service.config,
        service.client.as_ref(),
        service.invoker.as_ref(),
    );
    cycle.run(service.command).await?;
    if shutdown.is_cancelled() {
        return Ok(());
    }

    let wait = cycle_wait(service.config.cycle_interval_hours());
    let service = Arc::new(CycleService {
        command: service.command.after_first(),
        ..service
    });
    let (worker, scheduler) = scheduler::pair(service, wait, quiet, shutdown.clone());
    let worker = tokio::spawn(worker.run());
    let scheduler = tokio::spawn(scheduler.run());

    scheduler.await?;
    match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(joined) => joined?,
        Err(_) => warn!("A schedule check is still running. Exiting anyway."),
    }
    warn!("Exiting.");
    Ok(())
}
