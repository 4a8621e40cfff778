use serde::{Deserialize, Serialize};

/// Error envelope CoinGecko embeds in otherwise successful (200) bodies.
#[derive(Debug, Deserialize)]
pub struct StatusEnvelope {
    pub status: ApiStatus,
}

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

/// One row of `/coins/list`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinListEntry {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

/// On-disk form of a cached CoinGecko list, stamped with when it was fetched.
#[derive(Debug, Serialize, Deserialize)]
pub struct Cached<T> {
    pub fetched_ms: u64,
    pub data: T,
}
