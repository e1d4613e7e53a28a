//! The two tasks of continuous mode.
//!
//! The scheduler waits out the check interval and raises the cycle trigger;
//! the worker runs one cycle per trigger and reports completion through the
//! `oneshot` sender it was handed. A tick that arrives while a cycle is still
//! running is dropped, so cycles never overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Margin added to the check interval so the files are due when the timer fires.
pub const WAIT_MARGIN: Duration = Duration::from_secs(30);
pub const SLICE: Duration = Duration::from_secs(2);
/// Slices between two progress log lines in quiet mode.
pub const LOG_EVERY: u64 = 15;

/// One full sync cycle. Failures are handled inside.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self);
}

pub type CycleTrigger = mpsc::Sender<oneshot::Sender<()>>;

/// Time between two scheduled cycles.
pub fn cycle_wait(interval_hours: f64) -> Duration {
    Duration::try_from_secs_f64(interval_hours.max(0.0) * 3600.0)
        .unwrap_or(Duration::MAX)
        .saturating_add(WAIT_MARGIN)
}

pub struct Worker<R: CycleRunner> {
    runner: Arc<R>,
    trigger: mpsc::Receiver<oneshot::Sender<()>>,
    in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl<R: CycleRunner> Worker<R> {
    pub async fn run(mut self) {
        loop {
            let done = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                msg = self.trigger.recv() => match msg {
                    Some(done) => done,
                    None => break,
                },
            };
            self.in_flight.store(true, Ordering::SeqCst);
            self.runner.run_cycle().await;
            self.in_flight.store(false, Ordering::SeqCst);
            if done.send(()).is_err() {
                debug!("Nobody is waiting for the cycle to finish");
            }
        }
        debug!("Worker stopped");
    }
}

pub struct Scheduler {
    wait: Duration,
    slice: Duration,
    quiet: bool,
    trigger: CycleTrigger,
    in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    /// Sleep out one interval in slices. Returns false on shutdown.
    async fn wait_interval(&self) -> bool {
        let slices = (self.wait.as_secs_f64() / self.slice.as_secs_f64()).ceil() as u64;
        let bar = if self.quiet {
            None
        } else {
            let bar = ProgressBar::new(slices);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {eta}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message("Next schedule check");
            Some(bar)
        };

        for i in 0..slices {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Some(bar) = &bar {
                        bar.finish_and_clear();
                    }
                    return false;
                }
                _ = tokio::time::sleep(self.slice) => {}
            }
            match &bar {
                Some(bar) => bar.inc(1),
                None if (i + 1) % LOG_EVERY == 0 => {
                    let left = self.slice.mul_f64((slices - i - 1) as f64);
                    info!("Next schedule check in {} min", left.as_secs() / 60);
                }
                None => {}
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        true
    }

    pub async fn run(self) {
        info!(
            "Checking for new schedules every {:.1} hours",
            self.wait.as_secs_f64() / 3600.0
        );
        while self.wait_interval().await {
            if self.in_flight.load(Ordering::SeqCst) {
                warn!("The previous check is still running. Skipping this one.");
                continue;
            }
            let (done_tx, done_rx) = oneshot::channel();
            match self.trigger.try_send(done_tx) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("The previous check is still running. Skipping this one.");
                    continue;
                }
                Err(TrySendError::Closed(_)) => break,
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                res = done_rx => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Scheduler stopped");
    }
}

/// Wire a worker and a scheduler to one trigger channel.
pub fn pair<R: CycleRunner>(
    runner: Arc<R>,
    wait: Duration,
    quiet: bool,
    shutdown: CancellationToken,
) -> (Worker<R>, Scheduler) {
    let (tx, rx) = mpsc::channel(1);
    let in_flight = Arc::new(AtomicBool::new(false));
    let worker = Worker {
        runner,
        trigger: rx,
        in_flight: in_flight.clone(),
        shutdown: shutdown.clone(),
    };
    let scheduler = Scheduler {
        wait,
        slice: SLICE,
        quiet,
        trigger: tx,
        in_flight,
        shutdown,
    };
    (worker, scheduler)
}
