//! User settings document and the per-session snapshot derived from it.
//!
//! `Settings` mirrors the JSON file one to one and is what a settings dialog
//! edits. `SessionConfig` is the validated, immutable view every component is
//! built from; changing settings means building a new session.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::alerts::types::{AlertRule, DirectionFilter};
use crate::error::AppError;
use crate::price::coingecko::directory::CoinDirectory;
use crate::price::source::RetryPolicy;
use crate::price::types::{Asset, AssetRole, AssetSet, normalize_symbol};
use crate::scheduler::scheduler::{
    DEFAULT_AUTO_PAUSE_AFTER, DEFAULT_CYCLE_TIMEOUT, MIN_POLL_INTERVAL, SchedulerConfig,
};

pub const DEFAULT_SYMBOL: &str = "BTC";

const LEGACY_THRESHOLD_PCT: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crypto_symbol: String,
    pub secondary_cryptos: Vec<String>,
    pub vs_currency: String,
    /// Seconds between polls; anything under 60 is raised to 60.
    pub update_interval: u64,
    pub retry_attempts: u32,
    /// Seconds between retries.
    pub retry_wait: u64,
    /// Seconds per HTTP request.
    pub request_timeout: u64,
    pub auto_pause_after_failures: u32,
    pub notifications_enabled: bool,
    pub alert_rules: Vec<AlertRule>,
    pub always_on_top: bool,
    pub launch_on_startup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            crypto_symbol: "btc".into(),
            secondary_cryptos: Vec::new(),
            vs_currency: "usd".into(),
            update_interval: MIN_POLL_INTERVAL.as_secs(),
            retry_attempts: 3,
            retry_wait: 5,
            request_timeout: 10,
            auto_pause_after_failures: DEFAULT_AUTO_PAUSE_AFTER,
            notifications_enabled: false,
            alert_rules: Vec::new(),
            always_on_top: true,
            launch_on_startup: false,
        }
    }
}

impl Settings {
    /// Reads the settings file. A missing file yields defaults silently; an
    /// unreadable or corrupt one yields defaults and is logged.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %AppError::io(path, e), "settings unreadable, using defaults");
                return Self::default();
            }
        };

        match Self::from_json(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings corrupt, using defaults");
                Self::default()
            }
        }
    }

    /// Parses a settings document, migrating older layouts first.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let mut doc: Value = serde_json::from_str(raw)?;
        let Some(obj) = doc.as_object_mut() else {
            return Err(AppError::Config("settings document is not an object".into()));
        };

        migrate_legacy(obj);
        Ok(serde_json::from_value(doc)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;
        }

        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body).map_err(|e| AppError::io(path, e))
    }
}

/// Rewrites fields from older settings files in place.
fn migrate_legacy(obj: &mut Map<String, Value>) {
    if let Some(old_id) = obj.remove("crypto_id") {
        let symbol = old_id
            .as_str()
            .and_then(CoinDirectory::well_known_symbol)
            .unwrap_or(DEFAULT_SYMBOL);
        obj.insert("crypto_symbol".into(), Value::from(symbol.to_lowercase()));
    }

    if let Some(v) = obj.remove("start_with_windows") {
        obj.insert("launch_on_startup".into(), v);
    }

    let threshold = obj.remove("notification_threshold");
    let direction = obj.remove("notification_direction");
    let cooldown = obj.remove("notification_cooldown");
    let sound = obj.remove("notification_sound");

    let had_legacy_alert =
        threshold.is_some() || direction.is_some() || cooldown.is_some() || sound.is_some();
    if !had_legacy_alert || obj.contains_key("alert_rules") {
        return;
    }

    let primary = obj
        .get("crypto_symbol")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SYMBOL);

    let direction = direction
        .and_then(|d| serde_json::from_value::<DirectionFilter>(d).ok())
        .unwrap_or_default();

    let mut rule = AlertRule::new(
        primary,
        threshold.and_then(|t| t.as_f64()).unwrap_or(LEGACY_THRESHOLD_PCT),
        direction,
    );
    if let Some(minutes) = cooldown.and_then(|c| c.as_u64()) {
        rule = rule.with_cooldown_minutes(minutes);
    }
    if let Some(path) = sound.as_ref().and_then(Value::as_str).filter(|s| !s.is_empty()) {
        rule = rule.with_sound(path);
    }

    match serde_json::to_value(vec![rule]) {
        Ok(rules) => {
            obj.insert("alert_rules".into(), rules);
        }
        Err(e) => warn!(error = %e, "could not migrate legacy alert settings"),
    }
}

/// Validated settings for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub assets: AssetSet,
    pub vs_currency: String,
    /// As configured; the scheduler applies the 60 s floor.
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub auto_pause_after: u32,
    pub notifications_enabled: bool,
    pub alert_rules: Vec<AlertRule>,
    pub always_on_top: bool,
    pub launch_on_startup: bool,
}

impl SessionConfig {
    /// Builds a session snapshot, correcting what it can. Every correction is
    /// returned as a `Config` error so the caller can surface it once.
    pub fn from_settings(settings: &Settings) -> (Self, Vec<AppError>) {
        let mut errors = Vec::new();

        let assets = build_assets(settings, &mut errors);

        let mut poll_interval = Duration::from_secs(settings.update_interval);
        if poll_interval < MIN_POLL_INTERVAL {
            errors.push(AppError::Config(format!(
                "update interval {}s below minimum, using {}s",
                settings.update_interval,
                MIN_POLL_INTERVAL.as_secs()
            )));
            poll_interval = MIN_POLL_INTERVAL;
        }

        let request_timeout = if settings.request_timeout == 0 {
            errors.push(AppError::Config("request timeout of 0s, using 10s".into()));
            Duration::from_secs(10)
        } else {
            Duration::from_secs(settings.request_timeout)
        };

        let attempts = if settings.retry_attempts == 0 {
            errors.push(AppError::Config("retry attempts of 0, using 1".into()));
            1
        } else {
            settings.retry_attempts
        };

        let auto_pause_after = if settings.auto_pause_after_failures == 0 {
            errors.push(AppError::Config(format!(
                "auto-pause threshold of 0, using {DEFAULT_AUTO_PAUSE_AFTER}"
            )));
            DEFAULT_AUTO_PAUSE_AFTER
        } else {
            settings.auto_pause_after_failures
        };

        let alert_rules = settings
            .alert_rules
            .iter()
            .cloned()
            .map(|mut rule| {
                rule.asset_id = normalize_symbol(&rule.asset_id);
                rule
            })
            .filter(|rule| match rule.validate() {
                Err(e) => {
                    errors.push(e);
                    false
                }
                Ok(()) if !assets.contains(&rule.asset_id) => {
                    errors.push(AppError::Config(format!(
                        "alert rule for untracked asset {} dropped",
                        rule.asset_id
                    )));
                    false
                }
                Ok(()) => true,
            })
            .collect();

        let vs_currency = match settings.vs_currency.trim() {
            "" => {
                errors.push(AppError::Config("empty quote currency, using usd".into()));
                "usd".to_string()
            }
            cur => cur.to_lowercase(),
        };

        let config = Self {
            assets,
            vs_currency,
            poll_interval,
            request_timeout,
            retry: RetryPolicy {
                attempts,
                wait: Duration::from_secs(settings.retry_wait),
            },
            auto_pause_after,
            notifications_enabled: settings.notifications_enabled,
            alert_rules,
            always_on_top: settings.always_on_top,
            launch_on_startup: settings.launch_on_startup,
        };

        (config, errors)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.poll_interval, DEFAULT_CYCLE_TIMEOUT, self.auto_pause_after)
    }
}

fn build_assets(settings: &Settings, errors: &mut Vec<AppError>) -> AssetSet {
    let mut symbols: Vec<String> = std::iter::once(&settings.crypto_symbol)
        .chain(settings.secondary_cryptos.iter())
        .map(|s| normalize_symbol(s))
        .filter(|s| !s.is_empty())
        .collect();

    if symbols.is_empty() {
        errors.push(AppError::Config(format!(
            "no assets configured, tracking {DEFAULT_SYMBOL}"
        )));
        symbols.push(DEFAULT_SYMBOL.to_string());
    } else if normalize_symbol(&settings.crypto_symbol).is_empty() {
        errors.push(AppError::Config(format!(
            "no primary asset configured, promoting {}",
            symbols[0]
        )));
    }

    let mut seen = std::collections::HashSet::new();
    let mut assets = Vec::with_capacity(symbols.len());
    for (i, symbol) in symbols.iter().enumerate() {
        if !seen.insert(symbol.clone()) {
            errors.push(AppError::Config(format!("duplicate asset {symbol} dropped")));
            continue;
        }
        let role = if i == 0 {
            AssetRole::Primary
        } else {
            AssetRole::Secondary
        };
        assets.push(Asset::new(symbol, role));
    }

    AssetSet::new(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::types::AssetRole;

    fn ids(cfg: &SessionConfig) -> Vec<String> {
        cfg.assets.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn defaults_produce_clean_session() {
        let (cfg, errors) = SessionConfig::from_settings(&Settings::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(ids(&cfg), vec!["BTC"]);
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.auto_pause_after, 3);
        assert_eq!(cfg.retry.attempts, 3);
    }

    #[test]
    fn unknown_keys_and_missing_fields_are_tolerated() {
        let s = Settings::from_json(r#"{"font_size": 30, "secondary_cryptos": ["eth"]}"#).unwrap();
        assert_eq!(s.crypto_symbol, "btc");
        assert_eq!(s.secondary_cryptos, vec!["eth"]);
        assert!(s.always_on_top);
    }

    #[test]
    fn legacy_document_is_migrated() {
        let raw = r#"{
            "crypto_id": "avalanche-2",
            "start_with_windows": true,
            "notification_threshold": 2.5,
            "notification_direction": "down",
            "notification_cooldown": 10,
            "notification_sound": "sounds/alert.mp3"
        }"#;
        let s = Settings::from_json(raw).unwrap();

        assert_eq!(s.crypto_symbol, "avax");
        assert!(s.launch_on_startup);
        assert_eq!(s.alert_rules.len(), 1);

        let rule = &s.alert_rules[0];
        assert_eq!(rule.asset_id, "AVAX");
        assert_eq!(rule.threshold_pct, 2.5);
        assert_eq!(rule.direction, DirectionFilter::Down);
        assert_eq!(rule.cooldown_minutes, 10);
        assert_eq!(rule.sound.as_deref(), Some("sounds/alert.mp3"));
    }

    #[test]
    fn unknown_legacy_coin_id_falls_back_to_btc() {
        let s = Settings::from_json(r#"{"crypto_id": "shiba-inu"}"#).unwrap();
        assert_eq!(s.crypto_symbol, "btc");
    }

    #[test]
    fn explicit_rules_win_over_legacy_fields() {
        let raw = r#"{
            "notification_threshold": 9.0,
            "alert_rules": [{"asset_id": "btc", "threshold_pct": 1.0}]
        }"#;
        let s = Settings::from_json(raw).unwrap();
        assert_eq!(s.alert_rules.len(), 1);
        assert_eq!(s.alert_rules[0].threshold_pct, 1.0);
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(matches!(Settings::from_json("[1,2]"), Err(AppError::Config(_))));
        assert!(matches!(Settings::from_json("{oops"), Err(AppError::Json(_))));
    }

    #[test]
    fn corrections_are_reported() {
        let settings = Settings {
            crypto_symbol: "eth".into(),
            secondary_cryptos: vec!["btc".into(), "ETH".into(), "sol".into(), "btc".into()],
            update_interval: 10,
            retry_attempts: 0,
            auto_pause_after_failures: 0,
            alert_rules: vec![
                AlertRule::new("eth", 1.0, DirectionFilter::Up),
                AlertRule::new("btc", 0.01, DirectionFilter::Both),
                AlertRule::new("doge", 5.0, DirectionFilter::Both),
                AlertRule {
                    asset_id: "sol".into(),
                    ..AlertRule::new("sol", 2.0, DirectionFilter::Down)
                },
            ],
            ..Settings::default()
        };

        let (cfg, errors) = SessionConfig::from_settings(&settings);

        assert_eq!(ids(&cfg), vec!["ETH", "BTC", "SOL"]);
        assert_eq!(cfg.assets.primary().map(|a| a.id.as_str()), Some("ETH"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.retry.attempts, 1);
        assert_eq!(cfg.auto_pause_after, 3);
        assert_eq!(
            cfg.alert_rules.iter().map(|r| r.asset_id.as_str()).collect::<Vec<_>>(),
            vec!["ETH", "SOL"]
        );

        // 2 duplicates, interval, retries, auto-pause, bad threshold, untracked rule
        assert_eq!(errors.len(), 7, "{errors:?}");
        assert!(errors.iter().all(|e| matches!(e, AppError::Config(_))));
    }

    #[test]
    fn empty_asset_list_tracks_btc() {
        let settings = Settings {
            crypto_symbol: "  ".into(),
            ..Settings::default()
        };
        let (cfg, errors) = SessionConfig::from_settings(&settings);
        assert_eq!(ids(&cfg), vec!["BTC"]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn missing_primary_promotes_first_secondary() {
        let settings = Settings {
            crypto_symbol: String::new(),
            secondary_cryptos: vec!["sol".into(), "ada".into()],
            ..Settings::default()
        };
        let (cfg, errors) = SessionConfig::from_settings(&settings);
        assert_eq!(ids(&cfg), vec!["SOL", "ADA"]);
        assert_eq!(cfg.assets.primary().map(|a| a.role), Some(AssetRole::Primary));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn scheduler_config_clamps_interval() {
        let settings = Settings {
            update_interval: 300,
            ..Settings::default()
        };
        let (cfg, _) = SessionConfig::from_settings(&settings);
        let sched = cfg.scheduler_config();
        assert_eq!(sched.interval, Duration::from_secs(300));
        assert!(sched.cycle_timeout < sched.interval);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("ticker-settings-{}.json", uuid::Uuid::new_v4()));
        let settings = Settings {
            secondary_cryptos: vec!["eth".into()],
            notifications_enabled: true,
            alert_rules: vec![AlertRule::new("btc", 3.0, DirectionFilter::Up).with_cooldown_minutes(15)],
            ..Settings::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());

        let _ = std::fs::remove_file(&path);
    }
}
