//! Periodic price polling.
//!
//! One worker task ticks on a fixed cadence and dispatches each fetch to its
//! own task, awaiting it (bounded by the cycle timeout) before the next tick
//! is considered, so fetches never overlap. Completed cycles are handed to
//! the session context through a single-slot channel.
//!
//! Data flow:
//! tick → PriceSource::fetch → ControlState (status, auto-pause) → CycleReport → session

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until, timeout};
use tracing::{Instrument, debug, info, warn};

use crate::logger::{annotate_outcome, cycle_span, warn_if_slow};
use crate::metrics::counters::Counters;
use crate::price::source::PriceSource;
use crate::price::types::{Asset, ConnectionStatus, FailureKind, FetchOutcome};
use crate::scheduler::control::{ControlState, FailureEffect, RunState};
use crate::time::now_ms;

/// Hard floor on the poll cadence; shorter settings trip CoinGecko's limiter.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub const AUTO_RESUME_AFTER: Duration = Duration::from_secs(30 * 60);

pub const DEFAULT_AUTO_PAUSE_AFTER: u32 = 3;

pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(45);

const SLOW_FETCH: Duration = Duration::from_secs(5);

pub fn effective_interval(configured: Duration) -> Duration {
    configured.max(MIN_POLL_INTERVAL)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Effective cadence, already clamped to `MIN_POLL_INTERVAL`.
    pub interval: Duration,
    /// Upper bound for one fetch; always shorter than `interval`.
    pub cycle_timeout: Duration,
    /// Consecutive failed cycles before auto-pausing.
    pub auto_pause_after: u32,
    pub auto_resume_after: Duration,
}

impl SchedulerConfig {
    pub fn new(configured_interval: Duration, cycle_timeout: Duration, auto_pause_after: u32) -> Self {
        let interval = effective_interval(configured_interval);
        let ceiling = interval - Duration::from_secs(1);

        Self {
            interval,
            cycle_timeout: cycle_timeout.clamp(Duration::from_secs(1), ceiling),
            auto_pause_after: auto_pause_after.max(1),
            auto_resume_after: AUTO_RESUME_AFTER,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(MIN_POLL_INTERVAL, DEFAULT_CYCLE_TIMEOUT, DEFAULT_AUTO_PAUSE_AFTER)
    }
}

/// One completed cycle, as seen by the session context.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: FetchOutcome,
    /// Connection status right after this cycle was recorded.
    pub status: ConnectionStatus,
    /// Wall-clock completion time.
    pub completed_ms: u64,
}

struct Shared {
    cfg: SchedulerConfig,
    control: Mutex<ControlState>,
    /// Wakes the worker for an immediate cycle (resume / auto-resume).
    kick: Notify,
    auto_resume: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl Shared {
    fn cancel_auto_resume(&self) {
        if let Some(timer) = self.auto_resume.lock().take() {
            timer.abort();
        }
    }
}

pub struct PollingScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Spawns the polling worker on the current tokio runtime. The first cycle
    /// runs immediately.
    pub fn start(
        cfg: SchedulerConfig,
        source: Arc<dyn PriceSource>,
        assets: Vec<Asset>,
        counters: Counters,
    ) -> (Self, mpsc::Receiver<CycleReport>) {
        let (tx, rx) = mpsc::channel(1);

        info!(
            every_s = cfg.interval.as_secs(),
            timeout_ms = cfg.cycle_timeout.as_millis() as u64,
            auto_pause_after = cfg.auto_pause_after,
            assets = assets.len(),
            "polling scheduler started"
        );

        let shared = Arc::new(Shared {
            control: Mutex::new(ControlState::new(cfg.auto_pause_after)),
            cfg,
            kick: Notify::new(),
            auto_resume: Mutex::new(None),
            counters,
        });

        let worker = tokio::spawn(run_loop(
            Arc::clone(&shared),
            source,
            Arc::from(assets),
            tx,
        ));

        (
            Self {
                shared,
                worker: Mutex::new(Some(worker)),
            },
            rx,
        )
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.cfg
    }

    pub fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub fn run_state(&self) -> RunState {
        self.shared.control.lock().run_state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.control.lock().status().clone()
    }

    /// Time left until the pending auto-resume, if auto-paused.
    pub fn auto_resume_remaining(&self) -> Option<Duration> {
        self.shared
            .control
            .lock()
            .auto_resume_at()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// User pause. Idempotent; cancels any pending auto-resume.
    pub fn pause(&self) {
        let mut control = self.shared.control.lock();
        if control.is_stopped() {
            return;
        }
        if control.pause() {
            self.shared.cancel_auto_resume();
            info!("polling paused by user");
        }
    }

    /// User resume. Idempotent; triggers an immediate cycle.
    pub fn resume(&self) {
        let mut control = self.shared.control.lock();
        if control.is_stopped() {
            return;
        }
        if control.resume() {
            self.shared.cancel_auto_resume();
            info!("polling resumed by user");
            self.shared.kick.notify_one();
        }
    }

    /// Cancels the worker and any pending timer. A fetch already dispatched
    /// runs to completion but its result is dropped.
    pub fn stop(&self) {
        let first = self.shared.control.lock().stop();
        self.shared.cancel_auto_resume();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        if first {
            info!("polling scheduler stopped");
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    source: Arc<dyn PriceSource>,
    assets: Arc<[Asset]>,
    tx: mpsc::Sender<CycleReport>,
) {
    let mut ticker = interval(shared.cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycle = 0u64;

    loop {
        // a pending kick wins over a due tick so the two never yield two cycles
        tokio::select! {
            biased;
            _ = shared.kick.notified() => {
                ticker.reset();
                debug!("immediate cycle requested");
            }
            _ = ticker.tick() => {}
        }

        {
            let control = shared.control.lock();
            if control.is_stopped() {
                break;
            }
            if !control.run_state().is_running() {
                Counters::bump(&shared.counters.cycles_skipped_paused);
                debug!(state = ?control.run_state(), "paused; skipping cycle");
                continue;
            }
        }

        cycle += 1;
        let span = cycle_span(cycle, assets.len());

        let Some(report) = run_cycle(&shared, &source, &assets, cycle)
            .instrument(span)
            .await
        else {
            continue;
        };

        if tx.send(report).await.is_err() {
            info!("report consumer dropped; polling loop exiting");
            break;
        }
    }
}

async fn run_cycle(
    shared: &Arc<Shared>,
    source: &Arc<dyn PriceSource>,
    assets: &Arc<[Asset]>,
    cycle: u64,
) -> Option<CycleReport> {
    let task = {
        let shared = Arc::clone(shared);
        let source = Arc::clone(source);
        let assets = Arc::clone(assets);
        tokio::spawn(async move {
            let outcome = warn_if_slow("price_fetch", SLOW_FETCH, source.fetch(&assets)).await;
            if shared.control.lock().is_stopped() {
                Counters::bump(&shared.counters.results_discarded);
                debug!("scheduler stopped during fetch; result discarded");
                return None;
            }
            Some(outcome)
        })
    };
    let abort = task.abort_handle();

    let outcome = match timeout(shared.cfg.cycle_timeout, task).await {
        Ok(Ok(Some(outcome))) => outcome,
        Ok(Ok(None)) => return None,
        Ok(Err(e)) => FetchOutcome::error(format!("fetch task failed: {e}")),
        Err(_) => {
            abort.abort();
            FetchOutcome::error(format!(
                "fetch timed out after {}ms",
                shared.cfg.cycle_timeout.as_millis()
            ))
        }
    };

    annotate_outcome(outcome.label());
    let completed_ms = now_ms();

    let mut control = shared.control.lock();

    if control.is_stopped() || !control.run_state().is_running() {
        Counters::bump(&shared.counters.results_discarded);
        info!(state = ?control.run_state(), "paused during fetch; result discarded");
        return None;
    }

    match &outcome {
        FetchOutcome::Prices(samples) => {
            control.record_success(completed_ms);
            Counters::bump(&shared.counters.cycles_ok);
            info!(cycle, prices = samples.len(), "price cycle completed");
        }
        FetchOutcome::Failed { kind, message } => {
            match kind {
                FailureKind::RateLimited => Counters::bump(&shared.counters.cycles_rate_limited),
                FailureKind::Error => Counters::bump(&shared.counters.cycles_errored),
            }

            let resume_at = Instant::now() + shared.cfg.auto_resume_after;

            match control.record_failure(*kind, message, resume_at) {
                FailureEffect::Counted => {
                    warn!(
                        cycle,
                        kind = ?kind,
                        failures = control.status().consecutive_failures,
                        error = %message,
                        "price cycle failed"
                    );
                }
                FailureEffect::AutoPaused { generation } => {
                    Counters::bump(&shared.counters.auto_pauses);
                    warn!(
                        cycle,
                        kind = ?kind,
                        failures = control.status().consecutive_failures,
                        resume_in_s = shared.cfg.auto_resume_after.as_secs(),
                        error = %message,
                        "too many consecutive failures; polling auto-paused"
                    );
                    schedule_auto_resume(shared, generation, resume_at);
                }
            }
        }
    }

    Some(CycleReport {
        cycle,
        outcome,
        status: control.status().clone(),
        completed_ms,
    })
}

/// Arms the auto-resume timer for `generation`, replacing any older timer.
/// Called with the control lock held.
fn schedule_auto_resume(shared: &Arc<Shared>, generation: u64, at: Instant) {
    let s = Arc::clone(shared);
    let timer = tokio::spawn(async move {
        sleep_until(at).await;

        let resumed = s.control.lock().auto_resume(generation);
        if resumed {
            Counters::bump(&s.counters.auto_resumes);
            info!(generation, "auto-resume: polling restarted");
            s.kick.notify_one();
        } else {
            debug!(generation, "auto-resume superseded");
        }
    });

    if let Some(old) = shared.auto_resume.lock().replace(timer) {
        old.abort();
    }
}
