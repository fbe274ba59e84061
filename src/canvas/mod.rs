pub mod cursor;
pub mod preview;
pub mod tile;
pub mod tile_store;
pub mod user;
pub mod viewport;

pub use cursor::{Cursor, PointerButton};
pub use preview::{level_for_zoom, Preview, PreviewStore, SweepPlan};
pub use tile::{PixelDelta, Tile};
pub use tile_store::TileStore;
pub use user::{User, UserId, UserRoster};
pub use viewport::{Boundary, Viewport};
