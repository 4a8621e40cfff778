use std::sync::Arc;

use anyhow::Context;
use ticker::{
    alerts::notifier::LogNotifier,
    config::AppConfig,
    logger::init_tracing,
    metrics::counters::Counters,
    position::{JsonFileAnchorRepository, PositionStore},
    price::{
        PriceState,
        coingecko::{CoinDirectory, CoinGeckoClient, SupportedCurrencies},
    },
    scheduler::PollingScheduler,
    session::{PresenterEvent, TickerSession},
    settings::{SessionConfig, Settings},
};
use tokio::sync::mpsc;

/// Loads the settings file and validates it into a session snapshot.
/// Corrections are logged once here and not treated as fatal.
fn load_session_config(cfg: &AppConfig) -> SessionConfig {
    let settings = Settings::load(&cfg.settings_path);
    let (session, problems) = SessionConfig::from_settings(&settings);

    for problem in &problems {
        tracing::warn!(error = %problem, "settings corrected");
    }

    session
}

async fn restore_widget_position(cfg: &AppConfig) {
    let store = PositionStore::new(
        JsonFileAnchorRepository::new(&cfg.position_path),
        cfg.widget_size,
    );
    let pos = store.load(&cfg.screens).await;
    tracing::info!(x = pos.x, y = pos.y, screens = cfg.screens.len(), "widget position restored");
}

fn build_price_source(cfg: &AppConfig, session: &SessionConfig) -> anyhow::Result<CoinGeckoClient> {
    let directory = CoinDirectory::new(Some(cfg.coin_list_cache()));

    CoinGeckoClient::new(
        cfg.coingecko_base_url.clone(),
        session.vs_currency.clone(),
        session.request_timeout,
        session.retry,
        directory,
    )
    .map(|client| client.with_currencies(SupportedCurrencies::new(Some(cfg.currency_list_cache()))))
    .context("building CoinGecko client")
}

/// Warns when the configured quote currency is not one CoinGecko prices in.
/// Polling still starts; every cycle will then fail with a missing price.
async fn check_vs_currency(source: &CoinGeckoClient) {
    let supported = source.supported_currencies().await;
    if !supported.iter().any(|c| c == source.vs_currency()) {
        tracing::warn!(
            currency = source.vs_currency(),
            supported = supported.len(),
            "quote currency is not supported by coingecko"
        );
    }
}

/// Stand-in for the UI: logs whatever the presenter would render.
fn start_presenter_log(mut events: mpsc::Receiver<PresenterEvent>, vs_currency: String) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PresenterEvent::PriceUpdated {
                    asset_id,
                    price,
                    direction,
                    ..
                } => {
                    tracing::info!(target: "presenter", asset = %asset_id, price, currency = %vs_currency, %direction, "price")
                }
                PresenterEvent::DirectionChanged { asset_id, direction } => {
                    tracing::debug!(target: "presenter", asset = %asset_id, %direction, "direction changed")
                }
                PresenterEvent::ConnectionStatusChanged { status } => {
                    tracing::info!(
                        target: "presenter",
                        health = ?status.health,
                        failures = status.consecutive_failures,
                        "connection status"
                    )
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    init_tracing(cfg.json_logs);

    tracing::info!("Starting crypto ticker...");

    let session_cfg = Arc::new(load_session_config(&cfg));

    restore_widget_position(&cfg).await;

    let source = Arc::new(build_price_source(&cfg, &session_cfg)?);
    check_vs_currency(&source).await;
    let prices = Arc::new(PriceState::new(&session_cfg.assets));
    let counters = Counters::default();

    let (scheduler, reports) = PollingScheduler::start(
        session_cfg.scheduler_config(),
        source,
        session_cfg.assets.to_vec(),
        counters.clone(),
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    start_presenter_log(events_rx, session_cfg.vs_currency.to_uppercase());

    let notifier = Arc::new(LogNotifier::new(session_cfg.vs_currency.clone()));
    let session = TickerSession::new(Arc::clone(&session_cfg), prices, notifier);
    let session_task = tokio::spawn(session.run(reports, events_tx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    scheduler.stop();
    drop(scheduler);
    let _ = session_task.await;

    tracing::info!(
        ok = Counters::read(&counters.cycles_ok),
        rate_limited = Counters::read(&counters.cycles_rate_limited),
        errored = Counters::read(&counters.cycles_errored),
        auto_pauses = Counters::read(&counters.auto_pauses),
        "ticker stopped"
    );

    Ok(())
}
