pub mod anchor;
pub mod store;

pub use anchor::{Corner, CornerAnchor, Point, ScreenGeometry, Size};
pub use store::{AnchorRepository, InMemoryAnchorRepository, JsonFileAnchorRepository, PositionStore};
