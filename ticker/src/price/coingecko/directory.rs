//! Symbol → CoinGecko coin id resolution.
//!
//! Well-known symbols resolve from a built-in table. Anything else needs the
//! full `/coins/list`, which is cached on disk for 24h because it is large and
//! rarely changes.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::price::coingecko::cache;
use crate::price::coingecko::errors::CoinGeckoError;
use crate::price::coingecko::types::CoinListEntry;
use crate::price::types::{Asset, FailureKind, normalize_symbol};
use crate::time::now_ms;

/// Minimum spacing between two failed attempts to download the coin list.
const LIST_RETRY_MS: u64 = 10 * 60 * 1000;

/// Symbols are ambiguous on CoinGecko (many coins call themselves "ETH");
/// these always win over the downloaded list.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("XRP", "ripple"),
    ("DOT", "polkadot"),
    ("AVAX", "avalanche-2"),
];

/// Last failed coin list download, replayed while the retry window is open.
struct ListFailure {
    at_ms: u64,
    kind: FailureKind,
    message: String,
}

impl ListFailure {
    fn to_error(&self) -> CoinGeckoError {
        match self.kind {
            FailureKind::RateLimited => CoinGeckoError::RateLimited(self.message.clone()),
            FailureKind::Error => CoinGeckoError::CoinListUnavailable(self.message.clone()),
        }
    }
}

#[derive(Default)]
struct Listed {
    by_symbol: Option<HashMap<String, String>>,
    failure: Option<ListFailure>,
}

pub struct CoinDirectory {
    cache_path: Option<PathBuf>,
    listed: Mutex<Listed>,
}

impl CoinDirectory {
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self {
            cache_path,
            listed: Mutex::new(Listed::default()),
        }
    }

    pub fn well_known(symbol: &str) -> Option<&'static str> {
        let symbol = normalize_symbol(symbol);
        WELL_KNOWN
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, id)| *id)
    }

    /// Reverse of `well_known`, for settings that stored a coin id.
    pub fn well_known_symbol(coin_id: &str) -> Option<&'static str> {
        WELL_KNOWN
            .iter()
            .find(|(_, id)| *id == coin_id)
            .map(|(s, _)| *s)
    }

    /// Builds a symbol index keeping the first coin listed per symbol.
    pub fn index(coins: &[CoinListEntry]) -> HashMap<String, String> {
        let mut out = HashMap::with_capacity(coins.len());
        for coin in coins {
            out.entry(normalize_symbol(&coin.symbol))
                .or_insert_with(|| coin.id.clone());
        }
        out
    }

    /// Resolves every asset to an `(asset_id, coin_id)` pair, in input order.
    ///
    /// All or nothing: a batch with an unresolvable asset is an error, so a
    /// cycle never reports success while one of its assets went unpriced.
    /// When the coin list itself could not be fetched, that failure is
    /// returned instead (a 429 there stays a rate limit).
    pub async fn resolve(
        &self,
        http: &Client,
        base_url: &str,
        assets: &[Asset],
    ) -> Result<Vec<(String, String)>, CoinGeckoError> {
        let needs_list = assets.iter().any(|a| Self::well_known(&a.id).is_none());
        if needs_list {
            self.ensure_listed(http, base_url).await?;
        }

        let listed = self.listed.lock();

        assets
            .iter()
            .map(|asset| {
                Self::well_known(&asset.id)
                    .map(str::to_string)
                    .or_else(|| {
                        listed
                            .by_symbol
                            .as_ref()
                            .and_then(|m| m.get(&asset.id).cloned())
                    })
                    .map(|coin_id| (asset.id.clone(), coin_id))
                    .ok_or_else(|| CoinGeckoError::UnknownSymbol(asset.id.clone()))
            })
            .collect()
    }

    async fn ensure_listed(&self, http: &Client, base_url: &str) -> Result<(), CoinGeckoError> {
        let now = now_ms();
        {
            let listed = self.listed.lock();
            if listed.by_symbol.is_some() {
                return Ok(());
            }
            if let Some(failure) = &listed.failure {
                if now.saturating_sub(failure.at_ms) < LIST_RETRY_MS {
                    return Err(failure.to_error());
                }
            }
        }

        let cached = match &self.cache_path {
            Some(path) => cache::load::<Vec<CoinListEntry>>(path, now).await,
            None => None,
        };

        let coins = match cached {
            Some(coins) => coins,
            None => match self.download(http, base_url).await {
                Ok(coins) => {
                    if let Some(path) = &self.cache_path {
                        cache::save(path, &coins, now).await;
                    }
                    coins
                }
                Err(e) => {
                    warn!(error = %e, "coin list download failed");
                    self.listed.lock().failure = Some(ListFailure {
                        at_ms: now,
                        kind: e.failure_kind(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            },
        };

        info!(coins = coins.len(), "coin directory loaded");
        let mut listed = self.listed.lock();
        listed.by_symbol = Some(Self::index(&coins));
        listed.failure = None;
        Ok(())
    }

    #[instrument(skip(self, http), level = "debug")]
    async fn download(
        &self,
        http: &Client,
        base_url: &str,
    ) -> Result<Vec<CoinListEntry>, CoinGeckoError> {
        let url = format!("{}/coins/list", base_url);
        let resp = http.get(&url).send().await?;

        if resp.status().as_u16() == 429 {
            return Err(CoinGeckoError::RateLimited("coin list: http 429".into()));
        }

        let coins: Vec<CoinListEntry> = resp.error_for_status()?.json().await?;
        Ok(coins)
    }
}
