use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Primary,
    Secondary,
}

/// A tracked coin. `id` is the upper-cased ticker symbol and is unique within an `AssetSet`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub label: String,
    pub role: AssetRole,
}

impl Asset {
    pub fn new(symbol: &str, role: AssetRole) -> Self {
        let id = normalize_symbol(symbol);
        Self {
            label: id.clone(),
            id,
            role,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Order-preserving set of assets, unique by id. The first primary wins; later
/// duplicates are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetSet {
    assets: Vec<Asset>,
}

impl AssetSet {
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        let mut seen = HashSet::new();
        let assets = assets
            .into_iter()
            .filter(|a| !a.id.is_empty() && seen.insert(a.id.clone()))
            .collect();
        Self { assets }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.iter().any(|a| a.id == id)
    }

    pub fn primary(&self) -> Option<&Asset> {
        self.assets.iter().find(|a| a.role == AssetRole::Primary)
    }

    pub fn to_vec(&self) -> Vec<Asset> {
        self.assets.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Ok,
    RateLimited,
    Error,
}

/// One observed price for one asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub asset_id: String,
    pub price: f64,
    pub ts_ms: u64,
    pub status: SampleStatus,
}

impl PriceSample {
    pub fn ok(asset_id: impl Into<String>, price: f64, ts_ms: u64) -> Self {
        Self {
            asset_id: asset_id.into(),
            price,
            ts_ms,
            status: SampleStatus::Ok,
        }
    }

    /// Usable for direction and alert math.
    pub fn is_valid(&self) -> bool {
        self.status == SampleStatus::Ok && self.price.is_finite() && self.price > 0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
    #[default]
    Unknown,
}

impl Direction {
    pub fn between(old: f64, new: f64) -> Self {
        if new > old {
            Direction::Up
        } else if new < old {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
            Direction::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHealth {
    #[default]
    Healthy,
    RateLimited,
    Errored,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub health: ConnectionHealth,
    pub consecutive_failures: u32,
    /// Wall-clock ms of the last successful cycle.
    pub last_success_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Error,
}

impl FailureKind {
    pub fn health(self) -> ConnectionHealth {
        match self {
            FailureKind::RateLimited => ConnectionHealth::RateLimited,
            FailureKind::Error => ConnectionHealth::Errored,
        }
    }
}

/// Classified result of one batch fetch. Failures never carry samples.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Prices(HashMap<String, PriceSample>),
    Failed { kind: FailureKind, message: String },
}

impl FetchOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        FetchOutcome::Failed {
            kind: FailureKind::Error,
            message: message.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Prices(_) => "ok",
            FetchOutcome::Failed {
                kind: FailureKind::RateLimited,
                ..
            } => "rate_limited",
            FetchOutcome::Failed { .. } => "error",
        }
    }
}
