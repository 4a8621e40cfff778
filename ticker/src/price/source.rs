use std::time::Duration;

use async_trait::async_trait;

use crate::price::types::{Asset, FetchOutcome};

/// A remote batch price provider.
///
/// Implementations perform one logical round trip for the whole batch and fold
/// every failure into `FetchOutcome::Failed`; they never return errors or panic
/// on bad upstream data.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, assets: &[Asset]) -> FetchOutcome;
}

/// Fixed-wait retry for transport failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            wait: Duration::from_secs(5),
        }
    }
}
