//! Quote currencies CoinGecko accepts for `vs_currencies`.

use std::path::PathBuf;

use reqwest::Client;
use tracing::{debug, warn};

use crate::price::coingecko::cache;
use crate::price::coingecko::errors::CoinGeckoError;
use crate::time::now_ms;

/// Served when neither the cache nor the API can answer.
pub const FALLBACK_CURRENCIES: &[&str] = &["usd", "eur", "gbp", "jpy", "cad", "aud", "chf", "cny"];

pub struct SupportedCurrencies {
    cache_path: Option<PathBuf>,
}

impl SupportedCurrencies {
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self { cache_path }
    }

    pub fn fallback() -> Vec<String> {
        FALLBACK_CURRENCIES.iter().map(|c| c.to_string()).collect()
    }

    /// Lowercase currency codes, from the 24h cache, else the API, else the
    /// built-in fallback. Never fails.
    pub async fn list(&self, http: &Client, base_url: &str) -> Vec<String> {
        let now = now_ms();

        if let Some(path) = &self.cache_path {
            if let Some(cached) = cache::load::<Vec<String>>(path, now).await {
                return cached;
            }
        }

        match Self::download(http, base_url).await {
            Ok(currencies) if !currencies.is_empty() => {
                if let Some(path) = &self.cache_path {
                    cache::save(path, &currencies, now).await;
                }
                currencies
            }
            Ok(_) => {
                warn!("empty supported currency list; using fallback");
                Self::fallback()
            }
            Err(e) => {
                warn!(error = %e, "supported currency list unavailable; using fallback");
                Self::fallback()
            }
        }
    }

    async fn download(http: &Client, base_url: &str) -> Result<Vec<String>, CoinGeckoError> {
        let url = format!("{}/simple/supported_vs_currencies", base_url);
        let resp = http.get(&url).send().await?;

        if resp.status().as_u16() == 429 {
            return Err(CoinGeckoError::RateLimited("supported currencies: http 429".into()));
        }

        let currencies: Vec<String> = resp.error_for_status()?.json().await?;
        debug!(count = currencies.len(), "supported currencies fetched");

        Ok(currencies.into_iter().map(|c| c.to_lowercase()).collect())
    }
}
