pub mod context;
pub mod events;

pub use context::TickerSession;
pub use events::PresenterEvent;
