use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::canvas::cursor::{Cursor, PointerButton};
use crate::canvas::preview::{level_for_zoom, PreviewStore};
use crate::canvas::tile_store::TileStore;
use crate::canvas::user::UserRoster;
use crate::canvas::viewport::{Boundary, Viewport};
use crate::client::events::{CanvasEvent, EventCollector, EventHandler};
use crate::client::timestep::Timestep;
use crate::codec::{compress, ClientCommand, Color, ServerCommand, TilePos, ToolKind, TILE_SIZE};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::Connection;
use crate::render::RenderBackend;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Slice of each frame spent draining inbound traffic.
const NETWORK_BUDGET: Duration = Duration::from_millis(4);

/// One connected room: the orchestrator owning every cache, the viewport and
/// the connection for the lifetime of the session.
///
/// Inbound commands mutate the stores; two slow cadences (boundary broadcast
/// and keep-alive ping) and a fixed-timestep frame driver run interleaved on
/// the same task, so no shared state ever needs a lock.
pub struct Session {
    config: ClientConfig,
    connection: Option<Connection>,
    tiles: TileStore,
    previews: PreviewStore,
    viewport: Viewport,
    users: UserRoster,
    cursor: Cursor,
    timestep: Timestep,
    events: EventCollector,
    local_id: Option<u16>,
    chunks_received: u32,
    needs_boundary_update: bool,
    closed: bool,
    last_frame: Option<Instant>,
    last_boundary: Instant,
    last_ping: Instant,
    /// Boundary at the previous and current tick, blended by the timestep
    /// alpha when rendering.
    prev_boundary: Boundary,
    tick_boundary: Boundary,
}

impl Session {
    /// Connect to the configured server and room.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let connection =
            Connection::open(&config.server_url, &config.room, &config.nickname).await?;
        info!(room = %config.room, nickname = %config.nickname, "session opened");
        Ok(Self::with_connection(config, Some(connection)))
    }

    /// Session without a transport: commands can be applied directly, sends
    /// are dropped. Used for offline replay and by tests.
    pub fn detached(config: ClientConfig) -> Self {
        Self::with_connection(config, None)
    }

    fn with_connection(config: ClientConfig, connection: Option<Connection>) -> Self {
        let viewport = Viewport::new(config.canvas_width, config.canvas_height);
        let boundary = viewport.boundary();
        let now = Instant::now();
        Self {
            timestep: Timestep::new(config.tick_rate),
            config,
            connection,
            tiles: TileStore::new(),
            previews: PreviewStore::new(),
            viewport,
            users: UserRoster::new(),
            cursor: Cursor::new(),
            events: EventCollector::new(),
            local_id: None,
            chunks_received: 0,
            needs_boundary_update: true,
            closed: false,
            last_frame: None,
            last_boundary: now,
            last_ping: now,
            prev_boundary: boundary,
            tick_boundary: boundary,
        }
    }

    /// True once the server has assigned us an id.
    pub fn ready(&self) -> bool {
        self.local_id.is_some()
    }

    pub fn local_id(&self) -> Option<u16> {
        self.local_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn tiles(&self) -> &TileStore {
        &self.tiles
    }

    pub fn users(&self) -> &UserRoster {
        &self.users
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn chunks_received(&self) -> u32 {
        self.chunks_received
    }

    pub fn drain_events(&mut self) -> Vec<CanvasEvent> {
        self.events.drain()
    }

    async fn send(&mut self, command: ClientCommand) -> Result<()> {
        match self.connection.as_mut() {
            Some(connection) => connection.send(command).await,
            None => Ok(()),
        }
    }

    /// Drive the session until the connection ends or we are kicked.
    pub async fn run(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let result = self.drive(backend).await;
        self.shutdown(backend).await;
        result
    }

    async fn drive(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        while !self.closed {
            let frame_started = Instant::now();
            self.poll_network(NETWORK_BUDGET, backend).await?;
            if self.closed {
                break;
            }
            self.frame(backend);
            self.flush_cadences(backend).await?;
            if let Some(idle) = FRAME_INTERVAL.checked_sub(frame_started.elapsed()) {
                tokio::time::sleep(idle).await;
            }
        }
        Ok(())
    }

    /// Drain and apply inbound commands for up to `budget`.
    pub async fn poll_network(
        &mut self,
        budget: Duration,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        let deadline = Instant::now() + budget;
        while !self.closed {
            let Some(connection) = self.connection.as_mut() else {
                return Ok(());
            };
            if connection.is_closed() {
                self.events.on_event(CanvasEvent::Disconnected);
                self.closed = true;
                return Ok(());
            }
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(());
            };
            match connection.poll(left).await {
                Ok(Some(command)) => self.handle_command(command, backend).await?,
                Ok(None) => continue, // timeout or close; re-checked above
                Err(e) => {
                    warn!(error = %e, "connection lost");
                    self.events.on_event(CanvasEvent::Disconnected);
                    self.closed = true;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Apply one decoded server command to the local state.
    ///
    /// Malformed payloads (bad decompression, inconsistent sizes) are logged
    /// and dropped here; they never reach the render path.
    pub async fn handle_command(
        &mut self,
        command: ServerCommand,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        match command {
            ServerCommand::Message { kind, text } => {
                self.events.on_event(CanvasEvent::Chat { kind, text });
            }
            ServerCommand::YourId { id } => {
                info!(id, "server assigned session id");
                self.local_id = Some(id);
                self.events.on_event(CanvasEvent::Ready { user_id: id });
            }
            ServerCommand::Kick { reason } => {
                warn!(%reason, "kicked by server");
                self.events.on_event(CanvasEvent::Kicked { reason });
                if let Some(connection) = self.connection.as_mut() {
                    connection.close().await;
                }
                self.closed = true;
            }
            ServerCommand::ChunkImage {
                pos,
                raw_size,
                compressed,
            } => {
                if let Err(e) = self.tiles.apply_full_image(pos, &compressed, raw_size) {
                    warn!(?pos, error = %e, "dropping chunk image");
                }
            }
            ServerCommand::ChunkPixelPack {
                pos,
                pixel_count,
                raw_size,
                compressed,
            } => {
                if let Err(e) = self.apply_pixel_pack(pos, pixel_count, raw_size, &compressed) {
                    warn!(?pos, error = %e, "dropping pixel pack");
                }
            }
            ServerCommand::ChunkCreate { pos } => {
                self.chunks_received += 1;
                let count = self.chunks_received;
                self.tiles.create_tile(pos);
                // Flow-control acknowledgment the server's push pipeline
                // relies on; must accompany every chunk_create.
                self.send(ClientCommand::ChunksReceived { count }).await?;
            }
            ServerCommand::ChunkRemove { pos } => {
                self.tiles.remove_tile(pos, backend);
            }
            ServerCommand::PreviewImage {
                pos,
                level,
                compressed,
            } => match self.previews.set_data(level, pos, &compressed, backend) {
                Ok(applied) => {
                    if !applied {
                        debug!(level, ?pos, "preview arrived after eviction");
                    }
                }
                Err(e) => warn!(level, ?pos, error = %e, "dropping preview image"),
            },
            ServerCommand::UserCreate { id, nickname } => {
                self.users.add(id, nickname.clone());
                self.events.on_event(CanvasEvent::UserJoined { id, nickname });
            }
            ServerCommand::UserRemove { id } => {
                if self.users.remove(id).is_some() {
                    self.events.on_event(CanvasEvent::UserLeft { id });
                }
            }
            ServerCommand::UserCursorPos { id, x, y } => {
                if self.users.set_cursor(id, x, y) {
                    self.events.on_event(CanvasEvent::UserCursor { id, x, y });
                }
            }
            ServerCommand::StatusText { text } => {
                self.events.on_event(CanvasEvent::StatusText { text });
            }
        }
        Ok(())
    }

    fn apply_pixel_pack(
        &mut self,
        pos: TilePos,
        pixel_count: u32,
        raw_size: u32,
        compressed: &[u8],
    ) -> Result<()> {
        let expected = pixel_count as usize * 5;
        if raw_size as usize != expected {
            return Err(Error::PixelPackSize {
                pixel_count,
                raw_size,
            });
        }
        let raw = compress::decompress(compressed, expected)?;

        for pixel in raw.chunks_exact(5) {
            let world_x = pos.x * TILE_SIZE + pixel[0] as i32;
            let world_y = pos.y * TILE_SIZE + pixel[1] as i32;
            self.tiles
                .apply_pixel_delta(world_x, world_y, Color::new(pixel[2], pixel[3], pixel[4]));
        }
        Ok(())
    }

    /// One display frame: run due simulation ticks, then draw.
    pub fn frame(&mut self, backend: &mut dyn RenderBackend) {
        let now = Instant::now();
        let elapsed = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_frame = Some(now);

        let ticks = self.timestep.advance(elapsed);
        for _ in 0..ticks {
            self.tick();
        }
        self.render(now, backend);
    }

    /// One fixed-timestep tick: snapshot the boundary for interpolation.
    fn tick(&mut self) {
        self.prev_boundary = self.tick_boundary;
        self.tick_boundary = self.viewport.boundary();
    }

    fn render(&mut self, now: Instant, backend: &mut dyn RenderBackend) {
        let boundary = Boundary::lerp(self.timestep.alpha(), &self.prev_boundary, &self.tick_boundary);

        if let Some(level) = level_for_zoom(self.viewport.zoom()) {
            self.previews
                .draw(level, boundary.preview_range(level), now, backend);
        }
        self.tiles.flush_and_draw(&boundary, backend);
    }

    /// Fire the boundary broadcast and keep-alive ping when due.
    pub async fn flush_cadences(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_boundary)
            >= Duration::from_millis(self.config.boundary_interval_ms)
        {
            self.last_boundary = now;
            self.broadcast_boundary(backend).await?;
        }
        if now.saturating_duration_since(self.last_ping)
            >= Duration::from_millis(self.config.ping_interval_ms)
        {
            self.last_ping = now;
            self.send(ClientCommand::Ping).await?;
        }
        Ok(())
    }

    /// Tell the server what we can see and run the preview request/eviction
    /// pass. Skipped while the viewport is unchanged.
    async fn broadcast_boundary(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        if !self.needs_boundary_update {
            return Ok(());
        }
        self.needs_boundary_update = false;

        let zoom = self.viewport.zoom();
        let boundary = self.viewport.boundary();
        self.send(ClientCommand::Boundary {
            range: boundary.tile_range(),
            zoom: zoom as f32,
        })
        .await?;

        let active = level_for_zoom(zoom).map(|level| (level, boundary.preview_range(level)));
        let plan = self.previews.sweep(active, Instant::now(), backend);
        if let Some((level, _)) = active {
            for pos in plan.requests {
                self.send(ClientCommand::PreviewRequest { pos, level }).await?;
            }
        }
        if plan.truncated {
            // Another request wave fires on the next cycle.
            self.needs_boundary_update = true;
        }
        Ok(())
    }

    async fn shutdown(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(connection) = self.connection.as_mut() {
            connection.close().await;
        }
        self.tiles.clear(backend);
        self.previews.clear(backend);
    }

    // --- input surface -----------------------------------------------------

    /// Pointer moved to a new screen position.
    pub async fn pointer_moved(&mut self, screen_x: f64, screen_y: f64) -> Result<()> {
        self.cursor.move_to(screen_x, screen_y);
        let (world_x, world_y) = self.viewport.screen_to_world(screen_x, screen_y);
        self.cursor.world_x = world_x;
        self.cursor.world_y = world_y;
        self.send(ClientCommand::CursorPos {
            x: world_x,
            y: world_y,
        })
        .await?;

        if self.cursor.down_right {
            let (dx, dy) = self.cursor.screen_delta();
            self.viewport.pan_by_screen(dx, dy);
            self.needs_boundary_update = true;
        }
        if self.cursor.down_left && self.cursor.tool == ToolKind::Brush {
            // Speculative echo; the authoritative pack arrives later.
            let color = self.cursor.tool_color;
            self.tiles.apply_pixel_delta(world_x, world_y, color);
        }
        Ok(())
    }

    pub async fn pointer_pressed(&mut self, button: PointerButton) -> Result<()> {
        match button {
            PointerButton::Left => {
                self.cursor.down_left = true;
                self.send(ClientCommand::CursorDown).await?;
                if self.cursor.tool == ToolKind::Brush {
                    let (x, y, color) =
                        (self.cursor.world_x, self.cursor.world_y, self.cursor.tool_color);
                    self.tiles.apply_pixel_delta(x, y, color);
                }
            }
            PointerButton::Middle => {
                if let Some(color) = self.tiles.get_pixel(self.cursor.world_x, self.cursor.world_y)
                {
                    self.set_tool_color(color).await?;
                }
            }
            PointerButton::Right => self.cursor.down_right = true,
        }
        Ok(())
    }

    pub async fn pointer_released(&mut self, button: PointerButton) -> Result<()> {
        match button {
            PointerButton::Left => {
                self.cursor.down_left = false;
                self.send(ClientCommand::CursorUp).await?;
            }
            PointerButton::Right => self.cursor.down_right = false,
            PointerButton::Middle => {}
        }
        Ok(())
    }

    /// Wheel scroll: zoom anchored at the current cursor position.
    pub fn scroll_zoom(&mut self, wheel_delta: f64) {
        let step = (-wheel_delta * 100.0).clamp(-1.0, 1.0) * 0.2;
        let (width, height) = self.viewport.canvas_size();
        self.viewport.add_zoom(
            step,
            self.cursor.screen_x / width as f64,
            self.cursor.screen_y / height as f64,
        );
        self.needs_boundary_update = true;
    }

    /// Drag-style pan in screen pixels.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by_screen(dx, dy);
        self.needs_boundary_update = true;
    }

    pub async fn set_tool(&mut self, tool: ToolKind) -> Result<()> {
        self.cursor.tool = tool;
        self.send(ClientCommand::ToolType { tool }).await
    }

    pub async fn set_tool_color(&mut self, color: Color) -> Result<()> {
        self.cursor.tool_color = color;
        self.send(ClientCommand::ToolColor { color }).await
    }

    pub async fn set_tool_size(&mut self, size: u8) -> Result<()> {
        self.cursor.tool_size = size;
        self.send(ClientCommand::ToolSize { size }).await
    }

    pub async fn set_tool_flow(&mut self, flow: u32) -> Result<()> {
        self.cursor.tool_flow = flow;
        self.send(ClientCommand::ToolFlow { flow }).await
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<()> {
        self.send(ClientCommand::Message {
            text: text.to_owned(),
        })
        .await
    }

    pub async fn undo(&mut self) -> Result<()> {
        self.send(ClientCommand::Undo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TILE_IMAGE_BYTES;
    use crate::render::HeadlessBackend;

    fn detached() -> Session {
        Session::detached(ClientConfig::default())
    }

    fn pixel_pack(pos: TilePos, pixels: &[(u8, u8, Color)]) -> ServerCommand {
        let mut raw = Vec::new();
        for (x, y, color) in pixels {
            raw.extend_from_slice(&[*x, *y, color.r, color.g, color.b]);
        }
        ServerCommand::ChunkPixelPack {
            pos,
            pixel_count: pixels.len() as u32,
            raw_size: raw.len() as u32,
            compressed: compress::compress(&raw),
        }
    }

    #[tokio::test]
    async fn test_chunk_sync_end_to_end() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();
        let pos = TilePos::new(3, -2);

        session
            .handle_command(ServerCommand::ChunkCreate { pos }, &mut backend)
            .await
            .unwrap();
        assert!(session.tiles().contains(pos));
        assert_eq!(session.chunks_received(), 1);

        let red = Color::new(255, 0, 0);
        let blue = Color::new(0, 0, 255);
        session
            .handle_command(pixel_pack(pos, &[(0, 0, red), (255, 255, blue)]), &mut backend)
            .await
            .unwrap();

        // Bring the tile into view, then let the frame driver tick twice so
        // the render boundary catches up and the queue is flushed.
        session.pan_by(-896.0, 384.0);
        session.frame(&mut backend);
        std::thread::sleep(Duration::from_millis(40));
        session.frame(&mut backend);

        assert_eq!(session.tiles().get_pixel(3 * 256, -2 * 256), Some(red));
        assert_eq!(
            session.tiles().get_pixel(3 * 256 + 255, -2 * 256 + 255),
            Some(blue)
        );
    }

    #[tokio::test]
    async fn test_chunk_create_counts_acks() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();

        for x in 0..3 {
            session
                .handle_command(
                    ServerCommand::ChunkCreate {
                        pos: TilePos::new(x, 0),
                    },
                    &mut backend,
                )
                .await
                .unwrap();
        }
        assert_eq!(session.chunks_received(), 3);
    }

    #[tokio::test]
    async fn test_kick_closes_session() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();

        session
            .handle_command(
                ServerCommand::Kick {
                    reason: "bye".into(),
                },
                &mut backend,
            )
            .await
            .unwrap();

        assert!(session.is_closed());
        let events = session.drain_events();
        assert!(events.contains(&CanvasEvent::Kicked {
            reason: "bye".into()
        }));
    }

    #[tokio::test]
    async fn test_user_roster_follows_commands() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();

        session
            .handle_command(
                ServerCommand::UserCreate {
                    id: 4,
                    nickname: "ada".into(),
                },
                &mut backend,
            )
            .await
            .unwrap();
        session
            .handle_command(
                ServerCommand::UserCursorPos { id: 4, x: 7, y: -7 },
                &mut backend,
            )
            .await
            .unwrap();

        let user = session.users().get(4).unwrap();
        assert_eq!((user.cursor_x, user.cursor_y), (7, -7));

        session
            .handle_command(ServerCommand::UserRemove { id: 4 }, &mut backend)
            .await
            .unwrap();
        assert!(session.users().get(4).is_none());

        // Cursor updates for an unknown id are ignored.
        session
            .handle_command(
                ServerCommand::UserCursorPos { id: 4, x: 0, y: 0 },
                &mut backend,
            )
            .await
            .unwrap();

        let events = session.drain_events();
        assert_eq!(
            events,
            vec![
                CanvasEvent::UserJoined {
                    id: 4,
                    nickname: "ada".into()
                },
                CanvasEvent::UserCursor { id: 4, x: 7, y: -7 },
                CanvasEvent::UserLeft { id: 4 },
            ]
        );
    }

    #[tokio::test]
    async fn test_corrupt_image_is_dropped_not_fatal() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();
        let pos = TilePos::new(0, 0);

        session
            .handle_command(ServerCommand::ChunkCreate { pos }, &mut backend)
            .await
            .unwrap();
        session
            .handle_command(
                ServerCommand::ChunkImage {
                    pos,
                    raw_size: TILE_IMAGE_BYTES as u32,
                    compressed: vec![0xFF; 32],
                },
                &mut backend,
            )
            .await
            .unwrap();

        // Tile untouched by the malformed payload.
        assert_eq!(
            session.tiles().get_pixel(0, 0),
            Some(Color::new(255, 255, 255))
        );
    }

    #[tokio::test]
    async fn test_pixel_pack_size_mismatch_dropped() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();
        let pos = TilePos::new(0, 0);

        session
            .handle_command(ServerCommand::ChunkCreate { pos }, &mut backend)
            .await
            .unwrap();

        let raw = [0u8, 0, 9, 9, 9];
        session
            .handle_command(
                ServerCommand::ChunkPixelPack {
                    pos,
                    pixel_count: 2, // lies about the count
                    raw_size: raw.len() as u32,
                    compressed: compress::compress(&raw),
                },
                &mut backend,
            )
            .await
            .unwrap();

        session.frame(&mut backend);
        assert_eq!(
            session.tiles().get_pixel(0, 0),
            Some(Color::new(255, 255, 255))
        );
    }

    #[tokio::test]
    async fn test_boundary_pass_requests_previews_with_cap() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();

        // Zoom far out: level 2 previews become active.
        session.viewport.set_zoom(0.2);
        session.needs_boundary_update = true;
        session.broadcast_boundary(&mut backend).await.unwrap();

        // 1280x720 at zoom 0.2 spans 8x4 level-2 cells = 32 holes; the wave
        // is capped at 30 and the cycle marked dirty.
        assert_eq!(session.previews.len(), 30);
        assert!(session.needs_boundary_update);

        session.broadcast_boundary(&mut backend).await.unwrap();
        assert_eq!(session.previews.len(), 32);
        assert!(!session.needs_boundary_update);
    }

    #[tokio::test]
    async fn test_brush_echo_applies_locally() {
        let mut backend = HeadlessBackend::new();
        let mut session = detached();
        session
            .handle_command(
                ServerCommand::ChunkCreate {
                    pos: TilePos::new(0, 0),
                },
                &mut backend,
            )
            .await
            .unwrap();

        let green = Color::new(0, 200, 0);
        session.set_tool_color(green).await.unwrap();
        // Screen center maps to world (0, 0) with the default viewport.
        session.pointer_moved(640.0, 360.0).await.unwrap();
        session.pointer_pressed(PointerButton::Left).await.unwrap();
        session.pointer_released(PointerButton::Left).await.unwrap();

        session.frame(&mut backend);
        assert_eq!(session.tiles().get_pixel(0, 0), Some(green));
    }

    #[tokio::test]
    async fn test_right_drag_pans_viewport() {
        let mut session = detached();

        session.pointer_moved(100.0, 100.0).await.unwrap();
        session.pointer_pressed(PointerButton::Right).await.unwrap();
        session.pointer_moved(150.0, 80.0).await.unwrap();
        session.pointer_released(PointerButton::Right).await.unwrap();

        assert_eq!(session.viewport().pan(), (50.0, -20.0));
        assert!(session.needs_boundary_update);
    }
}
