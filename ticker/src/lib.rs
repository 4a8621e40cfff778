pub mod alerts;
pub mod config;
pub mod metrics;
pub mod position;
pub mod price;
pub mod scheduler;
pub mod session;
pub mod settings;

pub mod error;
pub mod logger;
pub mod time;
