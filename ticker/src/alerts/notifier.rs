use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tracing::info;

use crate::alerts::types::NotificationRequest;

/// Outlet for fired alerts (OS toast, tray balloon, sound player...).
///
/// Called from the session context, so implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, request: &NotificationRequest) -> Result<()>;
}

/// Writes alerts to the log. Used by the headless runner.
pub struct LogNotifier {
    vs_currency: String,
}

impl LogNotifier {
    pub fn new(vs_currency: impl Into<String>) -> Self {
        Self {
            vs_currency: vs_currency.into(),
        }
    }
}

impl NotificationSink for LogNotifier {
    fn dispatch(&self, request: &NotificationRequest) -> Result<()> {
        info!(
            target: "alerts",
            title = %request.title(),
            body = %request.body(&self.vs_currency),
            sound = request.sound.as_deref().unwrap_or("-"),
            "price alert"
        );
        Ok(())
    }
}

/// Forwards alerts to another task (e.g. the UI layer) without waiting.
/// A full queue is a dispatch failure, not backpressure.
pub struct ChannelNotifier {
    tx: mpsc::Sender<NotificationRequest>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<NotificationRequest>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelNotifier {
    fn dispatch(&self, request: &NotificationRequest) -> Result<()> {
        self.tx
            .try_send(request.clone())
            .map_err(|e| anyhow!("notification queue unavailable: {e}"))
    }
}
