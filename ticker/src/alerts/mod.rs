pub mod engine;
pub mod notifier;
pub mod types;

pub use engine::AlertEngine;
pub use notifier::{ChannelNotifier, LogNotifier, NotificationSink};
pub use types::*;
