pub mod cache;
pub mod client;
pub mod currencies;
pub mod directory;
pub mod errors;
pub mod types;

pub use client::CoinGeckoClient;
pub use currencies::SupportedCurrencies;
pub use directory::CoinDirectory;
pub use errors::CoinGeckoError;
pub use types::*;
