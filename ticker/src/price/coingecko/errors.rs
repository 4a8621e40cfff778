use thiserror::Error;

use crate::price::types::FailureKind;

#[derive(Error, Debug)]
pub enum CoinGeckoError {
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(reqwest::Error),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("rate limited by coingecko: {0}")]
    RateLimited(String),

    #[error("invalid response from coingecko: {0}")]
    InvalidResponse(String),

    #[error("no {currency} price for {asset}")]
    MissingAsset { asset: String, currency: String },

    #[error("symbol {0} has no coingecko id")]
    UnknownSymbol(String),

    #[error("coin list unavailable: {0}")]
    CoinListUnavailable(String),

    #[error("no requested asset could be resolved to a coin id")]
    NothingToFetch,
}

impl From<reqwest::Error> for CoinGeckoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoinGeckoError::Timeout(e)
        } else {
            CoinGeckoError::Http(e)
        }
    }
}

impl CoinGeckoError {
    /// Transport failures and server errors are worth another attempt;
    /// rate limits and bad payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoinGeckoError::Http(e) => !e.is_decode(),
            CoinGeckoError::Timeout(_) => true,
            CoinGeckoError::Status(code) => *code >= 500,
            _ => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CoinGeckoError::RateLimited(_) => FailureKind::RateLimited,
            _ => FailureKind::Error,
        }
    }
}
