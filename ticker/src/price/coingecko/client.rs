use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::price::coingecko::currencies::SupportedCurrencies;
use crate::price::coingecko::directory::CoinDirectory;
use crate::price::coingecko::errors::CoinGeckoError;
use crate::price::coingecko::types::StatusEnvelope;
use crate::price::source::{PriceSource, RetryPolicy};
use crate::price::types::{Asset, FetchOutcome, PriceSample};
use crate::time::now_ms;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    vs_currency: String,
    retry: RetryPolicy,
    directory: CoinDirectory,
    currencies: SupportedCurrencies,
}

impl CoinGeckoClient {
    pub fn new(
        base_url: String,
        vs_currency: String,
        request_timeout: Duration,
        retry: RetryPolicy,
        directory: CoinDirectory,
    ) -> Result<Self, CoinGeckoError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_lowercase(),
            retry,
            directory,
            currencies: SupportedCurrencies::new(None),
        })
    }

    pub fn with_currencies(mut self, currencies: SupportedCurrencies) -> Self {
        self.currencies = currencies;
        self
    }

    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }

    pub async fn supported_currencies(&self) -> Vec<String> {
        self.currencies.list(&self.http, &self.base_url).await
    }

    /// Fetches the whole batch with one `/simple/price` call, retrying
    /// transport failures per the retry policy.
    #[instrument(skip(self, assets), fields(assets = assets.len()), level = "debug")]
    pub async fn fetch_prices(
        &self,
        assets: &[Asset],
    ) -> Result<HashMap<String, PriceSample>, CoinGeckoError> {
        if assets.is_empty() {
            return Err(CoinGeckoError::NothingToFetch);
        }

        let ids = self
            .directory
            .resolve(&self.http, &self.base_url, assets)
            .await?;

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.request_prices(&ids).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        wait_ms = self.retry.wait.as_millis() as u64,
                        "price request failed; retrying"
                    );
                    tokio::time::sleep(self.retry.wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn request_prices(
        &self,
        ids: &[(String, String)],
    ) -> Result<HashMap<String, PriceSample>, CoinGeckoError> {
        let url = format!("{}/simple/price", self.base_url);
        let joined = ids
            .iter()
            .map(|(_, coin)| coin.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("ids", joined.as_str()), ("vs_currencies", self.vs_currency.as_str())])
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        let samples = classify_response(status, &body, ids, &self.vs_currency, now_ms())?;

        debug!(prices = samples.len(), "coingecko prices fetched");
        Ok(samples)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch(&self, assets: &[Asset]) -> FetchOutcome {
        match self.fetch_prices(assets).await {
            Ok(samples) => FetchOutcome::Prices(samples),
            Err(e) => FetchOutcome::Failed {
                kind: e.failure_kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Turns a raw `/simple/price` response into samples keyed by asset id.
///
/// CoinGecko signals rate limiting either with HTTP 429 or with a 200 whose
/// body is `{"status": {"error_code": 429, ...}}`; both are checked before the
/// body is read as prices. Every requested coin must carry a positive finite
/// price in `vs_currency`, otherwise the whole batch is rejected.
pub fn classify_response(
    status: u16,
    body: &str,
    ids: &[(String, String)],
    vs_currency: &str,
    ts_ms: u64,
) -> Result<HashMap<String, PriceSample>, CoinGeckoError> {
    if status == 429 {
        return Err(CoinGeckoError::RateLimited(format!("http 429: {}", snippet(body))));
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(value) = &parsed {
        if let Ok(envelope) = serde_json::from_value::<StatusEnvelope>(value.clone()) {
            if envelope.status.error_code == Some(429) {
                let msg = envelope
                    .status
                    .error_message
                    .unwrap_or_else(|| "rate limit embedded in body".into());
                return Err(CoinGeckoError::RateLimited(msg));
            }
        }
    }

    if !(200..300).contains(&status) {
        return Err(CoinGeckoError::Status(status));
    }

    let Some(Value::Object(coins)) = parsed else {
        return Err(CoinGeckoError::InvalidResponse(format!(
            "expected a json object, got: {}",
            snippet(body)
        )));
    };

    let mut out = HashMap::with_capacity(ids.len());

    for (asset_id, coin_id) in ids {
        let price = coins
            .get(coin_id)
            .and_then(|quotes| quotes.get(vs_currency))
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| CoinGeckoError::MissingAsset {
                asset: asset_id.clone(),
                currency: vs_currency.to_string(),
            })?;

        out.insert(asset_id.clone(), PriceSample::ok(asset_id.clone(), price, ts_ms));
    }

    Ok(out)
}

fn snippet(body: &str) -> String {
    body.chars().take(120).collect()
}
