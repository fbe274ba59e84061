use crate::codec::{Color, ToolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

/// Local pointer and tool state. Rebuilt from input events, never persisted.
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Screen-space position of the pointer.
    pub screen_x: f64,
    pub screen_y: f64,
    pub prev_screen_x: f64,
    pub prev_screen_y: f64,
    /// World pixel currently under the pointer.
    pub world_x: i32,
    pub world_y: i32,
    pub down_left: bool,
    pub down_right: bool,
    pub tool: ToolKind,
    pub tool_size: u8,
    pub tool_color: Color,
    pub tool_flow: u32,
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            screen_x: 0.0,
            screen_y: 0.0,
            prev_screen_x: 0.0,
            prev_screen_y: 0.0,
            world_x: 0,
            world_y: 0,
            down_left: false,
            down_right: false,
            tool: ToolKind::Brush,
            tool_size: 1,
            tool_color: Color::new(0, 0, 0),
            tool_flow: 0,
        }
    }

    /// Record a pointer move, keeping the previous position for drag deltas.
    pub fn move_to(&mut self, screen_x: f64, screen_y: f64) {
        self.prev_screen_x = self.screen_x;
        self.prev_screen_y = self.screen_y;
        self.screen_x = screen_x;
        self.screen_y = screen_y;
    }

    pub fn screen_delta(&self) -> (f64, f64) {
        (
            self.screen_x - self.prev_screen_x,
            self.screen_y - self.prev_screen_y,
        )
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}
