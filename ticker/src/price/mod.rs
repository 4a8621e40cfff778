pub mod coingecko;
pub mod source;
pub mod state;
pub mod types;

pub use source::{PriceSource, RetryPolicy};
pub use state::{PriceChange, PriceEntry, PriceState};
pub use types::*;
