//! 24h on-disk cache shared by the coin list and the currency list.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::price::coingecko::types::Cached;

pub const CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Reads `path` if it holds a well-formed entry younger than `CACHE_TTL_MS`.
/// Missing, corrupt and expired files all read as `None`.
pub async fn load<T: DeserializeOwned>(path: &Path, now: u64) -> Option<T> {
    let raw = tokio::fs::read(path).await.ok()?;

    let cached: Cached<T> = match serde_json::from_slice(&raw) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring corrupt cache file");
            return None;
        }
    };

    if now.saturating_sub(cached.fetched_ms) >= CACHE_TTL_MS {
        debug!(path = %path.display(), "cache expired");
        return None;
    }

    Some(cached.data)
}

/// Best effort: failures are logged and otherwise ignored.
pub async fn save<T: Serialize>(path: &Path, data: &T, now: u64) {
    let cached = Cached {
        fetched_ms: now,
        data,
    };

    let bytes = match serde_json::to_vec(&cached) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to encode cache file");
            return;
        }
    };

    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(path = %dir.display(), error = %e, "failed to create cache dir");
            return;
        }
    }

    if let Err(e) = tokio::fs::write(path, bytes).await {
        warn!(path = %path.display(), error = %e, "failed to write cache file");
    }
}
