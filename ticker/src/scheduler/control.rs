//! Pause state machine and connection status for the polling scheduler.
//
//  Pure state: the scheduler wraps `ControlState` in a mutex and owns all
//  timers. Every transition here is idempotent.

use tokio::time::Instant;

use crate::price::types::{ConnectionHealth, ConnectionStatus, FailureKind};

/// Scheduler run state.
///
/// `AutoPaused` carries a generation so a pending auto-resume timer can tell
/// whether the pause it was armed for is still the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    UserPaused,
    AutoPaused { generation: u64 },
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

/// Result of recording a failed cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureEffect {
    Counted,
    /// Threshold reached; arm an auto-resume for this generation.
    AutoPaused { generation: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    run: RunState,
    status: ConnectionStatus,
    auto_pause_after: u32,
    generation: u64,
    auto_resume_at: Option<Instant>,
    stopped: bool,
}

impl ControlState {
    pub fn new(auto_pause_after: u32) -> Self {
        Self {
            run: RunState::Running,
            status: ConnectionStatus::default(),
            auto_pause_after: auto_pause_after.max(1),
            generation: 0,
            auto_resume_at: None,
            stopped: false,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn auto_resume_at(&self) -> Option<Instant> {
        self.auto_resume_at
    }

    /// User pause. Supersedes an auto-pause. Returns true if the state changed.
    pub fn pause(&mut self) -> bool {
        match self.run {
            RunState::UserPaused => false,
            RunState::Running | RunState::AutoPaused { .. } => {
                self.run = RunState::UserPaused;
                self.auto_resume_at = None;
                true
            }
        }
    }

    /// User resume, from either pause kind. Clears the failure streak so the
    /// next failure does not immediately re-trigger an auto-pause.
    pub fn resume(&mut self) -> bool {
        match self.run {
            RunState::Running => false,
            RunState::UserPaused | RunState::AutoPaused { .. } => {
                self.run = RunState::Running;
                self.auto_resume_at = None;
                self.status.consecutive_failures = 0;
                true
            }
        }
    }

    /// Timer-driven resume. Only applies if the auto-pause it was armed for
    /// is still in effect.
    pub fn auto_resume(&mut self, generation: u64) -> bool {
        match self.run {
            RunState::AutoPaused { generation: g } if g == generation => {
                self.run = RunState::Running;
                self.auto_resume_at = None;
                self.status.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    pub fn record_success(&mut self, now_ms: u64) {
        self.status.health = ConnectionHealth::Healthy;
        self.status.consecutive_failures = 0;
        self.status.last_success_ms = Some(now_ms);
        self.status.last_error = None;
    }

    pub fn record_failure(
        &mut self,
        kind: FailureKind,
        message: &str,
        resume_at: Instant,
    ) -> FailureEffect {
        self.status.health = kind.health();
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        self.status.last_error = Some(message.to_string());

        if self.run.is_running() && self.status.consecutive_failures >= self.auto_pause_after {
            self.generation += 1;
            self.run = RunState::AutoPaused {
                generation: self.generation,
            };
            self.auto_resume_at = Some(resume_at);
            return FailureEffect::AutoPaused {
                generation: self.generation,
            };
        }

        FailureEffect::Counted
    }

    pub fn stop(&mut self) -> bool {
        let first = !self.stopped;
        self.stopped = true;
        self.auto_resume_at = None;
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(1800)
    }

    fn fail(c: &mut ControlState) -> FailureEffect {
        c.record_failure(FailureKind::Error, "boom", later())
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut c = ControlState::new(3);

        assert!(c.pause());
        let after_first = c.clone();
        assert!(!c.pause());
        assert_eq!(c, after_first);

        assert!(c.resume());
        let after_first = c.clone();
        assert!(!c.resume());
        assert_eq!(c, after_first);
    }

    #[test]
    fn auto_pauses_after_threshold() {
        let mut c = ControlState::new(3);

        assert_eq!(fail(&mut c), FailureEffect::Counted);
        assert_eq!(fail(&mut c), FailureEffect::Counted);
        assert_eq!(fail(&mut c), FailureEffect::AutoPaused { generation: 1 });

        assert_eq!(c.run_state(), RunState::AutoPaused { generation: 1 });
        assert_eq!(c.status().health, ConnectionHealth::Errored);
        assert_eq!(c.status().consecutive_failures, 3);
        assert!(c.auto_resume_at().is_some());
    }

    #[test]
    fn success_resets_streak() {
        let mut c = ControlState::new(2);
        fail(&mut c);
        c.record_success(42);
        assert_eq!(fail(&mut c), FailureEffect::Counted);
        assert_eq!(c.status().last_success_ms, Some(42));
        assert_eq!(c.status().last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn rate_limit_sets_health() {
        let mut c = ControlState::new(5);
        c.record_failure(FailureKind::RateLimited, "429", later());
        assert_eq!(c.status().health, ConnectionHealth::RateLimited);
    }

    #[test]
    fn auto_resume_fires_only_for_current_auto_pause() {
        let mut c = ControlState::new(1);
        let FailureEffect::AutoPaused { generation } = fail(&mut c) else {
            panic!("expected auto pause");
        };

        // user pause in between supersedes the auto pause
        assert!(c.pause());
        assert!(!c.auto_resume(generation));
        assert_eq!(c.run_state(), RunState::UserPaused);

        // user resumes, fails again: new generation, old timer is stale
        assert!(c.resume());
        let FailureEffect::AutoPaused { generation: g2 } = fail(&mut c) else {
            panic!("expected auto pause");
        };
        assert_ne!(g2, generation);
        assert!(!c.auto_resume(generation));
        assert!(c.auto_resume(g2));
        assert_eq!(c.run_state(), RunState::Running);
        assert_eq!(c.status().consecutive_failures, 0);
        assert!(!c.auto_resume(g2), "second auto resume is a no-op");
    }

    #[test]
    fn failures_while_paused_do_not_rearm() {
        let mut c = ControlState::new(1);
        c.pause();
        assert_eq!(fail(&mut c), FailureEffect::Counted);
        assert_eq!(c.run_state(), RunState::UserPaused);
    }
}
