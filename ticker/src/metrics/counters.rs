use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub cycles_ok: Arc<AtomicU64>,
    pub cycles_rate_limited: Arc<AtomicU64>,
    pub cycles_errored: Arc<AtomicU64>,

    // ticks that did not dispatch a fetch
    pub cycles_skipped_paused: Arc<AtomicU64>,

    pub auto_pauses: Arc<AtomicU64>,
    pub auto_resumes: Arc<AtomicU64>,

    /// Results that completed after `stop()` and were dropped.
    pub results_discarded: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
