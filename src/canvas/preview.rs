use std::time::{Duration, Instant};

use ahash::AHashMap;
use tracing::debug;

use crate::codec::{compress, IndexRange, PreviewPos, TILE_IMAGE_BYTES, TILE_SIZE};
use crate::error::Result;
use crate::render::{Rect, RenderBackend, TextureHandle};

/// Number of preview LOD levels the authority maintains.
pub const LAYER_COUNT: u8 = 5;

/// A preview missing this many refresh cycles in a row is destroyed.
pub const MISSED_REFRESH_LIMIT: u32 = 10;

/// Cap on preview requests issued per sync cycle. A fast pan or zoom can
/// expose hundreds of missing previews at once; the rest are picked up on the
/// following cycles instead of flooding the server.
pub const MAX_REQUESTS_PER_CYCLE: usize = 30;

/// Fade-in duration for freshly created previews.
pub const FADE_IN: Duration = Duration::from_millis(300);

/// Below this zoom the authority stops pushing raw tiles and the client
/// renders previews instead.
pub const BOUNDARY_ZOOM_MIN: f64 = 0.45;

/// Preview level to request at a given zoom, or `None` when raw tiles are in
/// play. Each level halves the zoom threshold of the one before it.
pub fn level_for_zoom(zoom: f64) -> Option<u8> {
    if zoom >= BOUNDARY_ZOOM_MIN {
        return None;
    }
    let mut level = 1u8;
    let mut threshold = 0.5f64;
    while level < LAYER_COUNT && zoom < threshold * 0.5 {
        threshold *= 0.5;
        level += 1;
    }
    Some(level)
}

/// A coarse image covering `2^level` tiles per side. Write-once-per-update:
/// there is no addressable pixel buffer, only the texture.
#[derive(Debug)]
pub struct Preview {
    texture: Option<TextureHandle>,
    pub missed_refresh_count: u32,
    created_at: Instant,
}

impl Preview {
    fn new(now: Instant) -> Self {
        Self {
            texture: None,
            missed_refresh_count: 0,
            created_at: now,
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn fade_alpha(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.created_at);
        (elapsed.as_secs_f32() / FADE_IN.as_secs_f32()).clamp(0.0, 1.0)
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(texture) = self.texture.take() {
            backend.destroy_texture(texture);
        }
    }
}

/// Preview requests planned by one sync cycle.
#[derive(Debug, Default)]
pub struct SweepPlan {
    pub requests: Vec<PreviewPos>,
    /// True when the request cap cut the wave short; the caller should run
    /// another cycle on the next tick rather than wait for a viewport change.
    pub truncated: bool,
}

/// LOD cache: level → preview coordinate → preview.
///
/// Entries double as request markers: a missing preview inside the active
/// band gets a placeholder the moment its request is planned, so the next
/// cycle does not ask again. Data arriving for a coordinate that has been
/// evicted in the meantime is dropped.
#[derive(Debug, Default)]
pub struct PreviewStore {
    levels: AHashMap<u8, AHashMap<PreviewPos, Preview>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(|slots| slots.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, level: u8, pos: PreviewPos) -> bool {
        self.levels
            .get(&level)
            .is_some_and(|slots| slots.contains_key(&pos))
    }

    pub fn get_or_create(&mut self, level: u8, pos: PreviewPos, now: Instant) -> &mut Preview {
        self.levels
            .entry(level)
            .or_default()
            .entry(pos)
            .or_insert_with(|| Preview::new(now))
    }

    /// Decode a preview payload and push it to the texture. Returns false
    /// when the slot no longer exists (evicted before the response arrived).
    pub fn set_data(
        &mut self,
        level: u8,
        pos: PreviewPos,
        compressed: &[u8],
        backend: &mut dyn RenderBackend,
    ) -> Result<bool> {
        let raw = compress::decompress(compressed, TILE_IMAGE_BYTES)?;

        let Some(preview) = self.levels.get_mut(&level).and_then(|s| s.get_mut(&pos)) else {
            debug!(level, ?pos, "dropping preview for evicted slot");
            return Ok(false);
        };

        let texture = *preview
            .texture
            .get_or_insert_with(|| backend.create_texture(TILE_SIZE as u32, TILE_SIZE as u32));
        backend.upload(texture, TILE_SIZE as u32, TILE_SIZE as u32, &raw);
        preview.missed_refresh_count = 0;
        Ok(true)
    }

    /// One eviction/request cycle.
    ///
    /// Previews outside the active band age by one missed refresh and die
    /// past the limit. Holes inside the band become placeholders plus request
    /// entries, capped per cycle.
    pub fn sweep(
        &mut self,
        active: Option<(u8, IndexRange)>,
        now: Instant,
        backend: &mut dyn RenderBackend,
    ) -> SweepPlan {
        for (&level, slots) in self.levels.iter_mut() {
            slots.retain(|pos, preview| {
                let in_band = matches!(
                    active,
                    Some((active_level, range))
                        if active_level == level && range.contains(pos.x, pos.y)
                );
                if in_band {
                    return true;
                }
                preview.missed_refresh_count += 1;
                if preview.missed_refresh_count > MISSED_REFRESH_LIMIT {
                    preview.release(backend);
                    false
                } else {
                    true
                }
            });
        }

        let mut plan = SweepPlan::default();
        if let Some((level, range)) = active {
            for (x, y) in range.iter() {
                let pos = PreviewPos::new(x, y);
                if self.contains(level, pos) {
                    continue;
                }
                if plan.requests.len() >= MAX_REQUESTS_PER_CYCLE {
                    plan.truncated = true;
                    break;
                }
                self.get_or_create(level, pos, now);
                plan.requests.push(pos);
            }
        }
        plan
    }

    /// Visit every cached preview of a level inside an index range.
    pub fn for_each_in_range(
        &mut self,
        level: u8,
        range: IndexRange,
        mut f: impl FnMut(PreviewPos, &mut Preview),
    ) {
        let Some(slots) = self.levels.get_mut(&level) else {
            return;
        };
        for (x, y) in range.iter() {
            let pos = PreviewPos::new(x, y);
            if let Some(preview) = slots.get_mut(&pos) {
                f(pos, preview);
            }
        }
    }

    /// Draw every loaded preview of a level inside the range, with fade-in.
    pub fn draw(
        &mut self,
        level: u8,
        range: IndexRange,
        now: Instant,
        backend: &mut dyn RenderBackend,
    ) {
        let extent = PreviewPos::world_extent(level) as f64;
        self.for_each_in_range(level, range, |pos, preview| {
            if let Some(texture) = preview.texture() {
                backend.draw_quad(
                    texture,
                    Rect::new(pos.x as f64 * extent, pos.y as f64 * extent, extent, extent),
                    preview.fade_alpha(now),
                );
            }
        });
    }

    /// Release every preview, e.g. when the session ends.
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for (_, mut slots) in self.levels.drain() {
            for (_, mut preview) in slots.drain() {
                preview.release(backend);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;

    fn band(level: u8, extent: i32) -> Option<(u8, IndexRange)> {
        Some((
            level,
            IndexRange {
                start_x: 0,
                start_y: 0,
                end_x: extent,
                end_y: extent,
            },
        ))
    }

    #[test]
    fn test_level_for_zoom_thresholds() {
        assert_eq!(level_for_zoom(1.0), None);
        assert_eq!(level_for_zoom(0.45), None);
        assert_eq!(level_for_zoom(0.4), Some(1));
        assert_eq!(level_for_zoom(0.2), Some(2));
        assert_eq!(level_for_zoom(0.05), Some(4));
        assert_eq!(level_for_zoom(0.001), Some(5));
    }

    #[test]
    fn test_eviction_after_missed_refreshes() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let now = Instant::now();
        let pos = PreviewPos::new(0, 0);
        store.get_or_create(2, pos, now);

        for _ in 0..9 {
            store.sweep(None, now, &mut backend);
        }
        assert!(store.contains(2, pos));

        store.sweep(None, now, &mut backend);
        assert!(store.contains(2, pos)); // exactly at the limit, still held

        store.sweep(None, now, &mut backend);
        assert!(!store.contains(2, pos)); // driven past the limit
    }

    #[test]
    fn test_fresh_data_resets_missed_count() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let now = Instant::now();
        let pos = PreviewPos::new(1, -1);
        store.get_or_create(1, pos, now);

        for _ in 0..5 {
            store.sweep(None, now, &mut backend);
        }

        let raw = vec![128u8; TILE_IMAGE_BYTES];
        let packed = compress::compress(&raw);
        assert!(store.set_data(1, pos, &packed, &mut backend).unwrap());
        assert_eq!(store.get_or_create(1, pos, now).missed_refresh_count, 0);
    }

    #[test]
    fn test_data_for_evicted_slot_dropped() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let raw = vec![1u8; TILE_IMAGE_BYTES];
        let packed = compress::compress(&raw);

        assert!(!store
            .set_data(3, PreviewPos::new(5, 5), &packed, &mut backend)
            .unwrap());
        assert_eq!(backend.live_textures(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_request_cap_and_dirty_flag() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let now = Instant::now();

        // 7x7 = 49 holes, one cycle may only request 30.
        let plan = store.sweep(band(1, 7), now, &mut backend);
        assert_eq!(plan.requests.len(), MAX_REQUESTS_PER_CYCLE);
        assert!(plan.truncated);
        assert_eq!(store.len(), MAX_REQUESTS_PER_CYCLE);

        // The next cycle picks up the remainder without re-requesting.
        let plan = store.sweep(band(1, 7), now, &mut backend);
        assert_eq!(plan.requests.len(), 19);
        assert!(!plan.truncated);
        assert_eq!(store.len(), 49);

        let plan = store.sweep(band(1, 7), now, &mut backend);
        assert!(plan.requests.is_empty());
    }

    #[test]
    fn test_band_change_ages_out_old_level() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let now = Instant::now();

        store.sweep(band(1, 2), now, &mut backend);
        assert_eq!(store.len(), 4);

        let raw = vec![9u8; TILE_IMAGE_BYTES];
        let packed = compress::compress(&raw);
        store
            .set_data(1, PreviewPos::new(0, 0), &packed, &mut backend)
            .unwrap();
        assert_eq!(backend.live_textures(), 1);

        for _ in 0..=MISSED_REFRESH_LIMIT {
            store.sweep(band(2, 2), now, &mut backend);
        }
        assert_eq!(store.levels.get(&1).map_or(0, |slots| slots.len()), 0);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_draw_skips_placeholders() {
        let mut backend = HeadlessBackend::new();
        let mut store = PreviewStore::new();
        let now = Instant::now();

        store.sweep(band(1, 2), now, &mut backend);
        let raw = vec![7u8; TILE_IMAGE_BYTES];
        let packed = compress::compress(&raw);
        store
            .set_data(1, PreviewPos::new(1, 1), &packed, &mut backend)
            .unwrap();

        let range = IndexRange {
            start_x: 0,
            start_y: 0,
            end_x: 2,
            end_y: 2,
        };
        store.draw(1, range, now + FADE_IN, &mut backend);
        assert_eq!(backend.draws, 1);
    }
}
