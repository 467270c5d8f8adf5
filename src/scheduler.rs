//! Background scheduler driving batch passes and maintenance.
//!
//! One tokio task loops on a fixed interval. Each tick runs a batch pass,
//! then expiry, then whichever maintenance tiers are due. Failures (and
//! panics) inside a tick are logged and the loop carries on with the next
//! tick. Stopping waits for the tick in progress to finish, so a pass is
//! never cut off halfway.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::MatchingConfig;
use crate::error::MatchmakerError;

/// Work the scheduler runs on each tick.
#[async_trait::async_trait]
pub trait ScheduledJobs: Send + Sync + 'static {
    /// One batch pass. Returns the number of matches created.
    async fn run_batch(&self) -> Result<usize, MatchmakerError>;

    async fn expire_stale(&self) -> Result<usize, MatchmakerError>;

    /// Short-interval tier.
    async fn run_maintenance(&self) -> Result<(), MatchmakerError>;

    /// Long-interval tier.
    async fn run_daily_maintenance(&self) -> Result<(), MatchmakerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleIntervals {
    pub batch: Duration,
    pub maintenance: Duration,
    pub daily: Duration,
}

impl From<&MatchingConfig> for ScheduleIntervals {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            batch: config.batch_interval(),
            maintenance: config.maintenance_interval(),
            daily: config.daily_maintenance_interval(),
        }
    }
}

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct BackgroundScheduler {
    jobs: Arc<dyn ScheduledJobs>,
    intervals: ScheduleIntervals,
    running: parking_lot::Mutex<Option<RunningLoop>>,
    ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl BackgroundScheduler {
    pub fn new(jobs: Arc<dyn ScheduledJobs>, intervals: ScheduleIntervals) -> Self {
        Self {
            jobs,
            intervals,
            running: parking_lot::Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.running.lock().as_ref() {
            Some(running) if !running.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Ticks completed since construction.
    pub fn completed_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Job failures swallowed since construction.
    pub fn swallowed_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Spawns the loop. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), MatchmakerError> {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return Err(MatchmakerError::Scheduler("scheduler is already running".to_string()));
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.jobs.clone(),
            self.intervals,
            shutdown_rx,
            self.ticks.clone(),
            self.failures.clone(),
        ));

        log::info!(
            "Scheduler started (batch every {:?}, maintenance every {:?}/{:?})",
            self.intervals.batch,
            self.intervals.maintenance,
            self.intervals.daily
        );
        *running = Some(RunningLoop { shutdown_tx, handle });
        Ok(())
    }

    /// Signals the loop to exit after the current tick and waits for it.
    /// A no-op when not running.
    pub async fn stop(&self) -> Result<(), MatchmakerError> {
        let Some(current) = self.running.lock().take() else {
            return Ok(());
        };

        let _ = current.shutdown_tx.send(true);
        current
            .handle
            .await
            .map_err(|e| MatchmakerError::Scheduler(format!("scheduler task failed: {}", e)))?;
        log::info!("Scheduler stopped");
        Ok(())
    }
}

async fn run_loop(
    jobs: Arc<dyn ScheduledJobs>,
    intervals: ScheduleIntervals,
    mut shutdown_rx: watch::Receiver<bool>,
    ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(intervals.batch);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_maintenance = Instant::now();
    let mut last_daily = Instant::now();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }

        // Shutdown is not polled while a tick runs.
        let tick = run_tick(jobs.as_ref(), &intervals, &mut last_maintenance, &mut last_daily);
        match AssertUnwindSafe(tick).catch_unwind().await {
            Ok(failed) => {
                failures.fetch_add(failed, Ordering::Relaxed);
            }
            Err(_) => {
                log::error!("Scheduler tick panicked; continuing with the next tick");
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs one tick and returns the number of jobs that failed.
async fn run_tick(
    jobs: &dyn ScheduledJobs,
    intervals: &ScheduleIntervals,
    last_maintenance: &mut Instant,
    last_daily: &mut Instant,
) -> u64 {
    let mut failed = 0;

    match jobs.run_batch().await {
        Ok(0) => log::debug!("Scheduled batch pass created no matches"),
        Ok(n) => log::info!("Scheduled batch pass created {} matches", n),
        Err(e) => {
            log::error!("Scheduled batch pass failed: {}", e);
            failed += 1;
        }
    }

    if let Err(e) = jobs.expire_stale().await {
        log::error!("Expiring stale entries failed: {}", e);
        failed += 1;
    }

    if last_maintenance.elapsed() >= intervals.maintenance {
        *last_maintenance = Instant::now();
        if let Err(e) = jobs.run_maintenance().await {
            log::error!("Maintenance failed: {}", e);
            failed += 1;
        }
    }

    if last_daily.elapsed() >= intervals.daily {
        *last_daily = Instant::now();
        if let Err(e) = jobs.run_daily_maintenance().await {
            log::error!("Daily maintenance failed: {}", e);
            failed += 1;
        }
    }

    failed
}
