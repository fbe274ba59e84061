use ahash::AHashMap;
use tracing::debug;

use crate::canvas::tile::{PixelDelta, Tile};
use crate::canvas::viewport::Boundary;
use crate::codec::{compress, local_offset, Color, TilePos, TILE_IMAGE_BYTES, TILE_SIZE};
use crate::error::{Error, Result};
use crate::render::{Rect, RenderBackend};

/// Cache of canvas tiles, keyed by tile coordinate.
///
/// Tiles exist only because the server said so: `chunk_create` makes them,
/// `chunk_remove` destroys them, and pixel traffic for a coordinate with no
/// tile is dropped on the floor. The store is the sole owner of every tile's
/// texture.
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: AHashMap<TilePos, Tile>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, pos: TilePos) -> bool {
        self.tiles.contains_key(&pos)
    }

    /// Idempotent: an existing tile is returned untouched, pixel data intact.
    pub fn create_tile(&mut self, pos: TilePos) -> &mut Tile {
        self.tiles.entry(pos).or_insert_with(Tile::new)
    }

    /// Drop a tile and its texture. No-op when absent.
    pub fn remove_tile(&mut self, pos: TilePos, backend: &mut dyn RenderBackend) {
        if let Some(mut tile) = self.tiles.remove(&pos) {
            tile.release(backend);
        }
    }

    /// Decode a bulk tile image and overwrite the tile's buffer with it.
    /// The declared raw size and the decompressed length are both validated
    /// before any pixel moves; an image for an unknown tile is dropped.
    pub fn apply_full_image(&mut self, pos: TilePos, compressed: &[u8], raw_size: u32) -> Result<()> {
        if raw_size as usize != TILE_IMAGE_BYTES {
            return Err(Error::DecompressedSize {
                expected: TILE_IMAGE_BYTES,
                actual: raw_size as usize,
            });
        }
        let raw = compress::decompress(compressed, TILE_IMAGE_BYTES)?;

        match self.tiles.get_mut(&pos) {
            Some(tile) => tile.set_image(&raw),
            None => debug!(?pos, "dropping image for unknown tile"),
        }
        Ok(())
    }

    /// Queue a single pixel write addressed in world coordinates. Writes to
    /// tiles that are not loaded are silently dropped.
    pub fn apply_pixel_delta(&mut self, world_x: i32, world_y: i32, color: Color) {
        let pos = TilePos::of_world(world_x, world_y);
        let Some(tile) = self.tiles.get_mut(&pos) else {
            return;
        };
        let (x, y) = local_offset(world_x, world_y);
        tile.push_pixel(PixelDelta { x, y, color });
    }

    /// Committed color at a world coordinate, or `None` when the tile is
    /// absent. Queued writes are not visible until the next flush.
    pub fn get_pixel(&self, world_x: i32, world_y: i32) -> Option<Color> {
        let pos = TilePos::of_world(world_x, world_y);
        let tile = self.tiles.get(&pos)?;
        let (x, y) = local_offset(world_x, world_y);
        Some(tile.pixel(x, y))
    }

    /// Flush queued writes and draw every tile intersecting the boundary.
    pub fn flush_and_draw(&mut self, boundary: &Boundary, backend: &mut dyn RenderBackend) {
        let range = boundary.tile_range();
        for (x, y) in range.iter() {
            let Some(tile) = self.tiles.get_mut(&TilePos::new(x, y)) else {
                continue;
            };
            tile.flush(backend);
            if let Some(texture) = tile.texture() {
                let size = TILE_SIZE as f64;
                backend.draw_quad(
                    texture,
                    Rect::new(x as f64 * size, y as f64 * size, size, size),
                    1.0,
                );
            }
        }
    }

    /// Release every tile, e.g. when the session ends.
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for (_, mut tile) in self.tiles.drain() {
            tile.release(backend);
        }
    }
}
