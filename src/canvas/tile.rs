use crate::codec::{Color, TILE_CHANNELS, TILE_IMAGE_BYTES, TILE_SIZE};
use crate::render::{RenderBackend, TextureHandle};

/// One queued pixel write in tile-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDelta {
    pub x: u8,
    pub y: u8,
    pub color: Color,
}

/// A cached square of the canvas.
///
/// Pixel writes are queued and folded into the buffer in arrival order on the
/// next flush, so a pixel pack with thousands of deltas costs one texture
/// upload instead of one per pixel. The texture is created lazily on the
/// first flush that has something to show.
#[derive(Debug)]
pub struct Tile {
    pixels: Vec<u8>,
    texture: Option<TextureHandle>,
    pending: Vec<PixelDelta>,
    dirty: bool,
}

impl Tile {
    pub fn new() -> Self {
        Self {
            pixels: vec![0xFF; TILE_IMAGE_BYTES],
            texture: None,
            pending: Vec::new(),
            dirty: false,
        }
    }

    pub fn push_pixel(&mut self, delta: PixelDelta) {
        self.pending.push(delta);
    }

    /// Committed color at a local offset; queued writes are not visible here.
    pub fn pixel(&self, local_x: u8, local_y: u8) -> Color {
        let offset = buffer_offset(local_x, local_y);
        Color::new(
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        )
    }

    /// Full overwrite from a decoded tile image. Queued writes stay queued.
    pub fn set_image(&mut self, raw: &[u8]) {
        debug_assert_eq!(raw.len(), TILE_IMAGE_BYTES);
        self.pixels.copy_from_slice(raw);
        self.dirty = true;
    }

    /// Apply queued writes and push the buffer to the texture in one upload.
    /// Returns true if anything changed.
    pub fn flush(&mut self, backend: &mut dyn RenderBackend) -> bool {
        if self.pending.is_empty() && !self.dirty {
            return false;
        }

        for delta in self.pending.drain(..) {
            let offset = buffer_offset(delta.x, delta.y);
            self.pixels[offset] = delta.color.r;
            self.pixels[offset + 1] = delta.color.g;
            self.pixels[offset + 2] = delta.color.b;
        }
        self.dirty = false;

        let texture = *self
            .texture
            .get_or_insert_with(|| backend.create_texture(TILE_SIZE as u32, TILE_SIZE as u32));
        backend.upload(texture, TILE_SIZE as u32, TILE_SIZE as u32, &self.pixels);
        true
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Release the GPU side. Must be called by the owning store before the
    /// tile is dropped.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(texture) = self.texture.take() {
            backend.destroy_texture(texture);
        }
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::new()
    }
}

fn buffer_offset(local_x: u8, local_y: u8) -> usize {
    (local_y as usize * TILE_SIZE as usize + local_x as usize) * TILE_CHANNELS
}
