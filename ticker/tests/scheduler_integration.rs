use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use ticker::{
    metrics::counters::Counters,
    price::{
        source::PriceSource,
        types::{Asset, AssetRole, ConnectionHealth, FailureKind, FetchOutcome, PriceSample},
    },
    scheduler::{CycleReport, PollingScheduler, RunState, SchedulerConfig},
    time::now_ms,
};

// -----------------------
// Scripted source
// -----------------------

#[derive(Clone)]
enum Reply {
    Prices,
    Fail(FailureKind),
}

#[derive(Clone)]
struct Step {
    delay: Duration,
    reply: Reply,
}

/// Plays back `script`, then repeats `fallback` forever. Records when each
/// fetch started and how many ran at once.
struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    fn new(fallback: Step) -> Arc<Self> {
        Self::scripted(Vec::new(), fallback)
    }

    fn scripted(script: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch(&self, assets: &[Asset]) -> FetchOutcome {
        self.calls.lock().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        sleep(step.delay).await;

        match step.reply {
            Reply::Prices => FetchOutcome::Prices(
                assets
                    .iter()
                    .map(|a| (a.id.clone(), PriceSample::ok(a.id.clone(), 100.0, now_ms())))
                    .collect::<HashMap<_, _>>(),
            ),
            Reply::Fail(kind) => FetchOutcome::Failed {
                kind,
                message: format!("scripted {kind:?}"),
            },
        }
    }
}

fn ok_after(secs: u64) -> Step {
    Step {
        delay: Duration::from_secs(secs),
        reply: Reply::Prices,
    }
}

fn fail_after(secs: u64, kind: FailureKind) -> Step {
    Step {
        delay: Duration::from_secs(secs),
        reply: Reply::Fail(kind),
    }
}

fn assets() -> Vec<Asset> {
    vec![
        Asset::new("BTC", AssetRole::Primary),
        Asset::new("ETH", AssetRole::Secondary),
    ]
}

fn start(
    cfg: SchedulerConfig,
    source: &Arc<ScriptedSource>,
) -> (PollingScheduler, mpsc::Receiver<CycleReport>, Counters) {
    let counters = Counters::default();
    let (scheduler, rx) = PollingScheduler::start(
        cfg,
        Arc::clone(source) as Arc<dyn PriceSource>,
        assets(),
        counters.clone(),
    );
    (scheduler, rx, counters)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// -----------------------
// Cadence
// -----------------------

#[tokio::test(start_paused = true)]
async fn short_interval_is_clamped_to_sixty_seconds() {
    let source = ScriptedSource::new(ok_after(0));
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(10), secs(5), 3), &source);

    assert_eq!(scheduler.config().interval, secs(60));

    for _ in 0..3 {
        let report = rx.recv().await.expect("report");
        assert!(matches!(report.outcome, FetchOutcome::Prices(_)));
    }

    let calls = source.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert_eq!(pair[1] - pair[0], secs(60));
    }
    assert_eq!(Counters::read(&counters.cycles_ok), 3);
}

#[tokio::test(start_paused = true)]
async fn fetches_never_overlap() {
    // every fetch eats most of the interval, a few blow through the timeout
    let source = ScriptedSource::scripted(
        vec![ok_after(50), ok_after(200), ok_after(58), ok_after(200)],
        ok_after(55),
    );
    let (_scheduler, mut rx, _) = start(SchedulerConfig::new(secs(60), secs(59), 10), &source);

    for _ in 0..6 {
        rx.recv().await.expect("report");
    }

    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(source.calls().windows(2).all(|p| p[1] - p[0] >= secs(60)));
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out_as_error() {
    let source = ScriptedSource::scripted(vec![ok_after(600)], ok_after(0));
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(60), secs(10), 3), &source);

    let started = Instant::now();
    let report = rx.recv().await.expect("report");

    assert_eq!(Instant::now() - started, secs(10));
    match &report.outcome {
        FetchOutcome::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::Error);
            assert!(message.contains("timed out"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(report.status.health, ConnectionHealth::Errored);
    assert_eq!(report.status.consecutive_failures, 1);
    assert_eq!(Counters::read(&counters.cycles_errored), 1);

    // the timed-out fetch was abandoned, the next one succeeds on schedule
    let report = rx.recv().await.expect("report");
    assert!(matches!(report.outcome, FetchOutcome::Prices(_)));
    assert_eq!(scheduler.status().consecutive_failures, 0);
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_reported_separately() {
    let source = ScriptedSource::scripted(vec![fail_after(0, FailureKind::RateLimited)], ok_after(0));
    let (_scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(60), secs(10), 3), &source);

    let report = rx.recv().await.expect("report");
    assert_eq!(report.status.health, ConnectionHealth::RateLimited);
    assert_eq!(Counters::read(&counters.cycles_rate_limited), 1);

    let report = rx.recv().await.expect("report");
    assert_eq!(report.status.health, ConnectionHealth::Healthy);
    assert!(report.status.last_success_ms.is_some());
}

// -----------------------
// Auto-pause
// -----------------------

#[tokio::test(start_paused = true)]
async fn auto_pause_then_auto_resume_after_thirty_minutes() {
    let source = ScriptedSource::new(fail_after(0, FailureKind::Error));
    // 70 s so no tick lands on the resume instant
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(70), secs(10), 3), &source);

    for expected in 1..=3u32 {
        let report = rx.recv().await.expect("report");
        assert_eq!(report.status.consecutive_failures, expected);
    }

    assert!(matches!(scheduler.run_state(), RunState::AutoPaused { .. }));
    assert_eq!(scheduler.auto_resume_remaining(), Some(secs(30 * 60)));
    assert_eq!(Counters::read(&counters.auto_pauses), 1);

    let report = rx.recv().await.expect("report after auto-resume");
    // streak restarted by the resume
    assert_eq!(report.status.consecutive_failures, 1);

    let calls = source.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3] - calls[2], secs(30 * 60));
    assert_eq!(Counters::read(&counters.auto_resumes), 1);
    assert!(Counters::read(&counters.cycles_skipped_paused) > 0);
    assert_eq!(scheduler.run_state(), RunState::Running);
}

#[tokio::test(start_paused = true)]
async fn user_pause_blocks_pending_auto_resume() {
    let source = ScriptedSource::new(fail_after(0, FailureKind::Error));
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(60), secs(10), 3), &source);

    for _ in 0..3 {
        rx.recv().await.expect("report");
    }
    assert!(matches!(scheduler.run_state(), RunState::AutoPaused { .. }));

    scheduler.pause();
    assert_eq!(scheduler.run_state(), RunState::UserPaused);
    assert_eq!(scheduler.auto_resume_remaining(), None);

    sleep(secs(31 * 60)).await;

    assert_eq!(scheduler.run_state(), RunState::UserPaused);
    assert_eq!(source.call_count(), 3);
    assert_eq!(Counters::read(&counters.auto_resumes), 0);

    // only the user can bring it back
    scheduler.resume();
    let report = rx.recv().await.expect("report");
    assert_eq!(report.status.consecutive_failures, 1);
    assert_eq!(source.call_count(), 4);
}

// -----------------------
// Pause / resume / stop
// -----------------------

#[tokio::test(start_paused = true)]
async fn pause_and_resume_are_idempotent() {
    let source = ScriptedSource::new(ok_after(0));
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(60), secs(10), 3), &source);

    rx.recv().await.expect("first report");

    scheduler.pause();
    scheduler.pause();
    assert_eq!(scheduler.run_state(), RunState::UserPaused);

    sleep(secs(5 * 60 + 30)).await;
    assert_eq!(source.call_count(), 1);
    assert!(Counters::read(&counters.cycles_skipped_paused) >= 4);

    let resumed_at = Instant::now();
    scheduler.resume();
    scheduler.resume();
    assert_eq!(scheduler.run_state(), RunState::Running);

    // resume runs a cycle right away, and only one
    rx.recv().await.expect("report after resume");
    assert_eq!(source.calls()[1], resumed_at);

    sleep(secs(1)).await;
    assert_eq!(source.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn status_is_frozen_while_paused() {
    let source = ScriptedSource::new(fail_after(20, FailureKind::Error));
    let (scheduler, _rx, counters) = start(SchedulerConfig::new(secs(60), secs(30), 3), &source);

    // first fetch is in flight when the user pauses
    sleep(secs(5)).await;
    assert_eq!(source.call_count(), 1);
    scheduler.pause();

    sleep(secs(10 * 60)).await;

    let status = scheduler.status();
    assert_eq!(status.health, ConnectionHealth::Healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.last_error, None);
    assert_eq!(Counters::read(&counters.results_discarded), 1);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_result() {
    let source = ScriptedSource::new(ok_after(30));
    let (scheduler, mut rx, counters) = start(SchedulerConfig::new(secs(60), secs(59), 3), &source);

    sleep(secs(10)).await;
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 1);

    scheduler.stop();
    scheduler.stop();

    assert!(rx.recv().await.is_none());

    // the dispatched call still finishes, its result goes nowhere
    sleep(secs(30)).await;
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(Counters::read(&counters.results_discarded), 1);
    assert_eq!(Counters::read(&counters.cycles_ok), 0);

    // a stopped scheduler ignores pause/resume
    scheduler.resume();
    sleep(secs(120)).await;
    assert_eq!(source.call_count(), 1);
}
