use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::price::types::{Direction, normalize_symbol};
use crate::time::MS_PER_MINUTE;

pub const MIN_THRESHOLD_PCT: f64 = 0.1;
pub const MAX_THRESHOLD_PCT: f64 = 100.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    Up,
    Down,
    #[default]
    Both,
}

impl DirectionFilter {
    pub fn admits(self, delta_pct: f64) -> bool {
        match self {
            DirectionFilter::Up => delta_pct > 0.0,
            DirectionFilter::Down => delta_pct < 0.0,
            DirectionFilter::Both => true,
        }
    }
}

fn default_cooldown_minutes() -> u64 {
    1
}

/// A percentage-move alert on one asset. Read-only once a session starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub asset_id: String,
    /// Absolute percentage move that triggers the rule, within 0.1..=100.
    pub threshold_pct: f64,
    #[serde(default)]
    pub direction: DirectionFilter,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default)]
    pub sound: Option<String>,
}

impl AlertRule {
    pub fn new(asset_id: &str, threshold_pct: f64, direction: DirectionFilter) -> Self {
        Self {
            asset_id: normalize_symbol(asset_id),
            threshold_pct,
            direction,
            cooldown_minutes: default_cooldown_minutes(),
            sound: None,
        }
    }

    pub fn with_cooldown_minutes(mut self, minutes: u64) -> Self {
        self.cooldown_minutes = minutes;
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_minutes.saturating_mul(MS_PER_MINUTE)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(MIN_THRESHOLD_PCT..=MAX_THRESHOLD_PCT).contains(&self.threshold_pct) {
            return Err(AppError::Config(format!(
                "alert threshold {}% for {} outside {}..={}",
                self.threshold_pct, self.asset_id, MIN_THRESHOLD_PCT, MAX_THRESHOLD_PCT
            )));
        }
        if self.asset_id.trim().is_empty() {
            return Err(AppError::Config("alert rule without asset".into()));
        }
        Ok(())
    }
}

/// Handed to the OS notification facility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub asset_id: String,
    pub price: f64,
    pub delta_pct: f64,
    pub direction: Direction,
    pub sound: Option<String>,
    /// Index of the firing rule in the session's rule list.
    pub rule_index: usize,
}

impl NotificationRequest {
    pub fn title(&self) -> String {
        format!("{} Price Alert", self.asset_id)
    }

    pub fn body(&self, vs_currency: &str) -> String {
        let sign = if self.delta_pct > 0.0 { "+" } else { "" };
        format!(
            "{:.2} {} ({}{:.2}%)",
            self.price,
            vs_currency.to_uppercase(),
            sign,
            self.delta_pct
        )
    }
}
