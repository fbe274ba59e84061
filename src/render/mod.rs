//! Seam between the canvas caches and whatever actually draws.
//!
//! The engine never talks to a GPU directly. Stores mint textures through a
//! [`RenderBackend`], keep the returned opaque handles, and are the only
//! owners allowed to destroy them, so a handle cannot outlive its store or be
//! freed twice.

use ahash::AHashMap;

/// Opaque texture identifier minted by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// World-space rectangle for a draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

pub trait RenderBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle;

    /// Replace the full contents of a texture with tightly packed RGB bytes.
    fn upload(&mut self, handle: TextureHandle, width: u32, height: u32, pixels: &[u8]);

    fn draw_quad(&mut self, handle: TextureHandle, rect: Rect, alpha: f32);

    fn destroy_texture(&mut self, handle: TextureHandle);
}

/// Backend that records resource traffic without touching a GPU. Used by the
/// headless binary and by tests that assert texture lifetime pairing.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    live: AHashMap<TextureHandle, (u32, u32)>,
    pub uploads: u64,
    pub draws: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        let handle = TextureHandle(self.next_id);
        self.next_id += 1;
        self.live.insert(handle, (width, height));
        handle
    }

    fn upload(&mut self, handle: TextureHandle, width: u32, height: u32, pixels: &[u8]) {
        debug_assert_eq!(pixels.len(), (width * height) as usize * 3);
        if let Some(size) = self.live.get_mut(&handle) {
            *size = (width, height);
            self.uploads += 1;
        }
    }

    fn draw_quad(&mut self, handle: TextureHandle, _rect: Rect, _alpha: f32) {
        if self.live.contains_key(&handle) {
            self.draws += 1;
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.live.remove(&handle);
    }
}
