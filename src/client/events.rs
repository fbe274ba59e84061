use crate::canvas::user::UserId;
use crate::codec::MessageKind;

/// Events the session surfaces to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// The server assigned our session id; the protocol is now ready.
    Ready { user_id: UserId },

    /// Chat line from the server or another user.
    Chat { kind: MessageKind, text: String },

    /// Advisory processing status, display-only.
    StatusText { text: String },

    UserJoined { id: UserId, nickname: String },

    UserLeft { id: UserId },

    UserCursor { id: UserId, x: i32, y: i32 },

    /// The server kicked us; the connection is closed afterwards.
    Kicked { reason: String },

    /// The connection ended (cleanly or after a terminal error).
    Disconnected,
}

/// Event sink the session pushes into.
pub trait EventHandler {
    fn on_event(&mut self, event: CanvasEvent);
}

/// Simple buffering handler for applications that poll.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<CanvasEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn drain(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventHandler for EventCollector {
    fn on_event(&mut self, event: CanvasEvent) {
        self.events.push(event);
    }
}
