use serde::{Deserialize, Serialize};

use crate::price::types::{ConnectionStatus, Direction};

/// What the UI layer is told after each completed cycle.
///
/// Per cycle the order is fixed: for each asset in configured order a
/// `PriceUpdated`, followed by `DirectionChanged` when the arrow flipped;
/// then at most one `ConnectionStatusChanged`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenterEvent {
    PriceUpdated {
        asset_id: String,
        price: f64,
        previous: Option<f64>,
        direction: Direction,
        ts_ms: u64,
    },
    DirectionChanged {
        asset_id: String,
        direction: Direction,
    },
    ConnectionStatusChanged {
        status: ConnectionStatus,
    },
}
