//! Mural client engine
//!
//! A headless client for a shared, unbounded, tile-partitioned raster canvas.
//! The engine keeps a local cache of tiles and coarse previews synchronized
//! with a remote authority over a binary WebSocket protocol and renders the
//! visible portion through a pluggable backend. The client never owns canvas
//! state; it is a consistency-seeking cache fed by server pushes and its own
//! speculative input echo.

pub mod canvas;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod render;

pub use canvas::{
    Boundary, Cursor, PointerButton, Preview, PreviewStore, TileStore, User, UserId, UserRoster,
    Viewport,
};
pub use client::{CanvasEvent, EventCollector, EventHandler, Session, Timestep};
pub use codec::{
    ClientCommand, Color, IndexRange, MessageKind, PreviewPos, ServerCommand, TilePos, ToolKind,
    TILE_SIZE,
};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use protocol::{Connection, ConnectionState};
pub use render::{HeadlessBackend, Rect, RenderBackend, TextureHandle};
