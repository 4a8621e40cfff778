//! Threshold alerts over consecutive price samples.
//
//  Pure: no IO, no clock. Callers pass `now_ms`.

use std::collections::HashMap;

use tracing::debug;

use crate::alerts::types::{AlertRule, NotificationRequest};
use crate::price::types::{Direction, PriceSample};

/// Why a rule did not fire for a given pair of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCheck {
    Fire,
    OtherAsset,
    BelowThreshold,
    WrongDirection,
    CooldownNotElapsed,
}

/// Per-rule cooldown tracking keyed by the rule's index in the session's rule
/// list. Rules are an immutable snapshot per session, so indices are stable.
#[derive(Debug, Default)]
pub struct AlertEngine {
    last_fired_ms: HashMap<usize, u64>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage move from `previous` to `current`.
    pub fn delta_pct(previous: &PriceSample, current: &PriceSample) -> f64 {
        (current.price - previous.price) / previous.price * 100.0
    }

    /// Evaluate every rule for `current.asset_id` and return the notifications
    /// to dispatch. Each fired rule's cooldown starts at `now_ms` immediately,
    /// whatever later happens to the dispatch.
    pub fn evaluate(
        &mut self,
        previous: &PriceSample,
        current: &PriceSample,
        rules: &[AlertRule],
        now_ms: u64,
    ) -> Vec<NotificationRequest> {
        if !previous.is_valid() || !current.is_valid() || previous.asset_id != current.asset_id {
            return Vec::new();
        }

        let delta = Self::delta_pct(previous, current);
        let mut out = Vec::new();

        for (idx, rule) in rules.iter().enumerate() {
            let check = self.check(idx, rule, &current.asset_id, delta, now_ms);
            if check != RuleCheck::Fire {
                if check != RuleCheck::OtherAsset {
                    debug!(asset = %current.asset_id, rule = idx, ?check, delta_pct = delta, "alert rule held");
                }
                continue;
            }

            self.last_fired_ms.insert(idx, now_ms);

            out.push(NotificationRequest {
                asset_id: current.asset_id.clone(),
                price: current.price,
                delta_pct: delta,
                direction: Direction::between(previous.price, current.price),
                sound: rule.sound.clone(),
                rule_index: idx,
            });
        }

        out
    }

    fn check(&self, idx: usize, rule: &AlertRule, asset_id: &str, delta: f64, now_ms: u64) -> RuleCheck {
        if rule.asset_id != asset_id {
            return RuleCheck::OtherAsset;
        }

        if delta.abs() < rule.threshold_pct {
            return RuleCheck::BelowThreshold;
        }

        if !rule.direction.admits(delta) {
            return RuleCheck::WrongDirection;
        }

        if let Some(last) = self.last_fired_ms.get(&idx) {
            if now_ms.saturating_sub(*last) < rule.cooldown_ms() {
                return RuleCheck::CooldownNotElapsed;
            }
        }

        RuleCheck::Fire
    }

    pub fn last_fired_ms(&self, rule_index: usize) -> Option<u64> {
        self.last_fired_ms.get(&rule_index).copied()
    }

    /// Forget all cooldowns, e.g. after the rule list was reloaded.
    pub fn reset(&mut self) {
        self.last_fired_ms.clear();
    }
}
