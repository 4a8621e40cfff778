use std::path::PathBuf;

use tracing::warn;

use crate::error::AppError;
use crate::position::anchor::{FALLBACK_SCREEN, ScreenGeometry, Size};
use crate::price::coingecko::client::DEFAULT_BASE_URL;

/// Process-level configuration from environment variables.
///
/// User-facing options live in the settings file (`settings::Settings`);
/// this only says where things are and how the process runs.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Settings JSON document.
    pub settings_path: PathBuf,

    /// Persisted widget anchor.
    pub position_path: PathBuf,

    /// Holds the downloaded coin list.
    pub cache_dir: PathBuf,

    pub coingecko_base_url: String,

    /// Screen layout reported to the position store by the headless runner,
    /// primary first. Format: `x,y,w,h;x,y,w,h`.
    pub screens: Vec<ScreenGeometry>,

    /// Widget size used for corner anchoring. Format: `w,h`.
    pub widget_size: Size,

    /// `APP_ENV=production` switches logs to JSON.
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with an arbitrary variable source. Malformed
    /// values are logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str, default: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let screens = parse_screens(&var("TICKER_SCREENS", "")).unwrap_or_else(|e| {
            warn!(error = %e, "TICKER_SCREENS ignored");
            vec![FALLBACK_SCREEN]
        });

        let widget_size = parse_size(&var("TICKER_WIDGET_SIZE", "200,50")).unwrap_or_else(|e| {
            warn!(error = %e, "TICKER_WIDGET_SIZE ignored");
            Size::new(200, 50)
        });

        Self {
            settings_path: PathBuf::from(var("TICKER_SETTINGS_PATH", "ticker_settings.json")),
            position_path: PathBuf::from(var("TICKER_POSITION_PATH", "ticker_position.json")),
            cache_dir: PathBuf::from(var("TICKER_CACHE_DIR", ".ticker_cache")),
            coingecko_base_url: var("COINGECKO_BASE_URL", DEFAULT_BASE_URL),
            screens,
            widget_size,
            json_logs: var("APP_ENV", "development").eq_ignore_ascii_case("production"),
        }
    }

    pub fn coin_list_cache(&self) -> PathBuf {
        self.cache_dir.join("coin_list.json")
    }

    pub fn currency_list_cache(&self) -> PathBuf {
        self.cache_dir.join("supported_currencies.json")
    }
}

fn parse_ints<const N: usize>(raw: &str) -> Result<[i32; N], AppError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(AppError::Config(format!("expected {N} numbers, got {raw:?}")));
    }

    let mut out = [0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| AppError::Config(format!("not an integer: {part:?}")))?;
    }
    Ok(out)
}

/// `x,y,w,h;...`. Empty input means the fallback 1920x1080 screen.
pub fn parse_screens(raw: &str) -> Result<Vec<ScreenGeometry>, AppError> {
    if raw.trim().is_empty() {
        return Ok(vec![FALLBACK_SCREEN]);
    }

    raw.split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            let [x, y, w, h] = parse_ints::<4>(s)?;
            if w <= 0 || h <= 0 {
                return Err(AppError::Config(format!("screen with empty area: {s:?}")));
            }
            Ok(ScreenGeometry::new(x, y, w, h))
        })
        .collect()
}

pub fn parse_size(raw: &str) -> Result<Size, AppError> {
    let [w, h] = parse_ints::<2>(raw)?;
    if w <= 0 || h <= 0 {
        return Err(AppError::Config(format!("widget size must be positive: {raw:?}")));
    }
    Ok(Size::new(w, h))
}
