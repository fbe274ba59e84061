pub mod command;
pub mod compress;
pub mod reader;
pub mod types;

pub use command::{ClientCmd, ClientCommand, ServerCmd, ServerCommand};
pub use reader::BinaryReader;
pub use types::{
    local_offset, Color, IndexRange, MessageKind, PreviewPos, TilePos, ToolKind, TILE_CHANNELS,
    TILE_IMAGE_BYTES, TILE_SIZE,
};
