//! The consuming side of the scheduler handoff.
//!
//! `TickerSession` is the only writer of `PriceState`. It applies each
//! `CycleReport` in arrival order, runs alert rules against the resulting
//! price changes and turns everything into presenter events.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::alerts::engine::AlertEngine;
use crate::alerts::notifier::NotificationSink;
use crate::price::state::{PriceChange, PriceState};
use crate::price::types::{ConnectionHealth, FetchOutcome};
use crate::scheduler::scheduler::CycleReport;
use crate::session::events::PresenterEvent;
use crate::settings::SessionConfig;

pub struct TickerSession {
    config: Arc<SessionConfig>,
    prices: Arc<PriceState>,
    alerts: AlertEngine,
    notifier: Arc<dyn NotificationSink>,
    last_health: Option<ConnectionHealth>,
}

impl TickerSession {
    pub fn new(
        config: Arc<SessionConfig>,
        prices: Arc<PriceState>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            prices,
            alerts: AlertEngine::new(),
            notifier,
            last_health: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn prices(&self) -> &Arc<PriceState> {
        &self.prices
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Apply one cycle. Failed cycles only flag prices as stale; they never
    /// touch stored prices or fire alerts.
    #[instrument(skip(self, report), fields(cycle = report.cycle, outcome = report.outcome.label()), target = "session")]
    pub fn apply(&mut self, report: &CycleReport) -> Vec<PresenterEvent> {
        let mut events = Vec::new();

        match &report.outcome {
            FetchOutcome::Prices(samples) => {
                let changes = self.prices.update(samples);
                debug!(updated = changes.len(), "prices applied");

                for change in &changes {
                    push_price_events(&mut events, change);
                }

                if self.config.notifications_enabled {
                    for change in &changes {
                        self.run_alerts(change, report.completed_ms);
                    }
                }
            }
            FetchOutcome::Failed { kind, .. } => {
                if self.prices.mark_stale() {
                    debug!(?kind, "prices marked stale");
                }
            }
        }

        if self.last_health != Some(report.status.health) {
            self.last_health = Some(report.status.health);
            events.push(PresenterEvent::ConnectionStatusChanged {
                status: report.status.clone(),
            });
        }

        events
    }

    fn run_alerts(&mut self, change: &PriceChange, now_ms: u64) {
        let Some(previous) = &change.previous else {
            return;
        };

        let fired = self
            .alerts
            .evaluate(previous, &change.current, &self.config.alert_rules, now_ms);

        for request in fired {
            info!(
                asset = %request.asset_id,
                rule = request.rule_index,
                delta_pct = request.delta_pct,
                "alert fired"
            );
            // the cooldown already started; a failed dispatch is not retried
            if let Err(e) = self.notifier.dispatch(&request) {
                warn!(asset = %request.asset_id, rule = request.rule_index, error = %e, "alert dispatch failed");
            }
        }
    }

    /// Consume reports until the scheduler side closes, forwarding events.
    /// Returns early if the event consumer goes away.
    pub async fn run(mut self, mut reports: mpsc::Receiver<CycleReport>, events: mpsc::Sender<PresenterEvent>) {
        while let Some(report) = reports.recv().await {
            for event in self.apply(&report) {
                if events.send(event).await.is_err() {
                    info!("presenter gone; session loop exiting");
                    return;
                }
            }
        }
        info!("scheduler closed; session loop exiting");
    }
}

fn push_price_events(events: &mut Vec<PresenterEvent>, change: &PriceChange) {
    events.push(PresenterEvent::PriceUpdated {
        asset_id: change.asset_id.clone(),
        price: change.current.price,
        previous: change.previous.as_ref().map(|p| p.price),
        direction: change.direction,
        ts_ms: change.current.ts_ms,
    });

    if change.direction_changed {
        events.push(PresenterEvent::DirectionChanged {
            asset_id: change.asset_id.clone(),
            direction: change.direction,
        });
    }
}
