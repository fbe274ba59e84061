//! Typed wire commands.
//!
//! Every frame starts with a 2-byte signed big-endian command identifier
//! followed by a fixed per-command layout. Inbound frames are decoded into a
//! closed [`ServerCommand`] enum; each variant's fixed prefix length is
//! checked before any field is read, so a short frame is rejected instead of
//! read out of bounds. Unknown identifiers decode to `None` and are never
//! fatal.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::reader::BinaryReader;
use crate::codec::types::{Color, IndexRange, MessageKind, PreviewPos, TilePos, ToolKind};
use crate::error::{Error, Result};

const HEADER_LEN: usize = 2;

/// Outbound (client → server) command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ClientCmd {
    Message = 1,
    Announce = 2,
    Ping = 4,
    CursorPos = 100,
    CursorDown = 101,
    CursorUp = 102,
    Boundary = 103,
    ChunksReceived = 104,
    PreviewRequest = 105,
    ToolType = 200,
    ToolColor = 201,
    ToolSize = 202,
    ToolFlow = 203,
    Undo = 300,
}

/// Inbound (server → client) command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ServerCmd {
    Message = 1,
    YourId = 2,
    Kick = 3,
    ChunkImage = 100,
    ChunkPixelPack = 101,
    ChunkCreate = 110,
    ChunkRemove = 111,
    PreviewImage = 200,
    UserCreate = 1000,
    UserRemove = 1001,
    UserCursorPos = 1002,
    ProcessingStatusText = 1100,
}

impl ServerCmd {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Message),
            2 => Some(Self::YourId),
            3 => Some(Self::Kick),
            100 => Some(Self::ChunkImage),
            101 => Some(Self::ChunkPixelPack),
            110 => Some(Self::ChunkCreate),
            111 => Some(Self::ChunkRemove),
            200 => Some(Self::PreviewImage),
            1000 => Some(Self::UserCreate),
            1001 => Some(Self::UserRemove),
            1002 => Some(Self::UserCursorPos),
            1100 => Some(Self::ProcessingStatusText),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::YourId => "your_id",
            Self::Kick => "kick",
            Self::ChunkImage => "chunk_image",
            Self::ChunkPixelPack => "chunk_pixel_pack",
            Self::ChunkCreate => "chunk_create",
            Self::ChunkRemove => "chunk_remove",
            Self::PreviewImage => "preview_image",
            Self::UserCreate => "user_create",
            Self::UserRemove => "user_remove",
            Self::UserCursorPos => "user_cursor_pos",
            Self::ProcessingStatusText => "processing_status_text",
        }
    }

    /// Fixed payload prefix each variant needs before variable-length data.
    fn required_len(self) -> usize {
        match self {
            Self::Message => 1,
            Self::YourId => 2,
            Self::Kick => 2,
            Self::ChunkImage => 12,
            Self::ChunkPixelPack => 16,
            Self::ChunkCreate | Self::ChunkRemove => 8,
            Self::PreviewImage => 9,
            Self::UserCreate | Self::UserRemove => 2,
            Self::UserCursorPos => 10,
            Self::ProcessingStatusText => 0,
        }
    }
}

/// Command sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Message { text: String },
    Announce { room: String, nickname: String },
    Ping,
    CursorPos { x: i32, y: i32 },
    CursorDown,
    CursorUp,
    Boundary { range: IndexRange, zoom: f32 },
    ChunksReceived { count: u32 },
    PreviewRequest { pos: PreviewPos, level: u8 },
    ToolType { tool: ToolKind },
    ToolColor { color: Color },
    ToolSize { size: u8 },
    ToolFlow { flow: u32 },
    Undo,
}

impl ClientCommand {
    fn id(&self) -> ClientCmd {
        match self {
            Self::Message { .. } => ClientCmd::Message,
            Self::Announce { .. } => ClientCmd::Announce,
            Self::Ping => ClientCmd::Ping,
            Self::CursorPos { .. } => ClientCmd::CursorPos,
            Self::CursorDown => ClientCmd::CursorDown,
            Self::CursorUp => ClientCmd::CursorUp,
            Self::Boundary { .. } => ClientCmd::Boundary,
            Self::ChunksReceived { .. } => ClientCmd::ChunksReceived,
            Self::PreviewRequest { .. } => ClientCmd::PreviewRequest,
            Self::ToolType { .. } => ClientCmd::ToolType,
            Self::ToolColor { .. } => ClientCmd::ToolColor,
            Self::ToolSize { .. } => ClientCmd::ToolSize,
            Self::ToolFlow { .. } => ClientCmd::ToolFlow,
            Self::Undo => ClientCmd::Undo,
        }
    }

    /// Serialize to a complete frame, ready for the transport.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 20);
        buf.put_i16(self.id() as i16);

        match self {
            Self::Message { text } => buf.put_slice(text.as_bytes()),
            Self::Announce { room, nickname } => {
                put_str_u8(&mut buf, room);
                put_str_u8(&mut buf, nickname);
            }
            Self::Ping | Self::CursorDown | Self::CursorUp | Self::Undo => {}
            Self::CursorPos { x, y } => {
                buf.put_i32(*x);
                buf.put_i32(*y);
            }
            Self::Boundary { range, zoom } => {
                buf.put_i32(range.start_x);
                buf.put_i32(range.start_y);
                buf.put_i32(range.end_x);
                buf.put_i32(range.end_y);
                buf.put_f32(*zoom);
            }
            Self::ChunksReceived { count } => buf.put_u32(*count),
            Self::PreviewRequest { pos, level } => {
                buf.put_i32(pos.x);
                buf.put_i32(pos.y);
                buf.put_u8(*level);
            }
            Self::ToolType { tool } => buf.put_u8(*tool as u8),
            Self::ToolColor { color } => {
                buf.put_u8(color.r);
                buf.put_u8(color.g);
                buf.put_u8(color.b);
            }
            Self::ToolSize { size } => buf.put_u8(*size),
            Self::ToolFlow { flow } => buf.put_u32(*flow),
        }

        buf.freeze()
    }
}

// String with a 1-byte length prefix, truncated to fit the prefix.
fn put_str_u8(buf: &mut BytesMut, s: &str) {
    let mut bytes = s.as_bytes();
    if bytes.len() > u8::MAX as usize {
        bytes = &bytes[..u8::MAX as usize];
    }
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
}

/// Command received from the server, decoded and validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    Message {
        kind: MessageKind,
        text: String,
    },
    YourId {
        id: u16,
    },
    Kick {
        reason: String,
    },
    ChunkImage {
        pos: TilePos,
        raw_size: u32,
        compressed: Vec<u8>,
    },
    ChunkPixelPack {
        pos: TilePos,
        pixel_count: u32,
        raw_size: u32,
        compressed: Vec<u8>,
    },
    ChunkCreate {
        pos: TilePos,
    },
    ChunkRemove {
        pos: TilePos,
    },
    PreviewImage {
        pos: PreviewPos,
        level: u8,
        compressed: Vec<u8>,
    },
    UserCreate {
        id: u16,
        nickname: String,
    },
    UserRemove {
        id: u16,
    },
    UserCursorPos {
        id: u16,
        x: i32,
        y: i32,
    },
    StatusText {
        text: String,
    },
}

impl ServerCommand {
    /// Decode one inbound frame.
    ///
    /// Returns `Ok(None)` for an unknown command identifier. A frame shorter
    /// than the 2-byte header is the only structurally fatal case; everything
    /// past that surfaces as a recoverable error the caller can skip.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>> {
        if frame.len() < HEADER_LEN {
            return Err(Error::TruncatedHeader { len: frame.len() });
        }
        let id = i16::from_be_bytes([frame[0], frame[1]]);
        let Some(cmd) = ServerCmd::from_i16(id) else {
            tracing::debug!(id, "ignoring unknown server command");
            return Ok(None);
        };

        let payload = &frame[HEADER_LEN..];
        if payload.len() < cmd.required_len() {
            return Err(Error::ShortFrame {
                command: cmd.name(),
                need: cmd.required_len(),
                have: payload.len(),
            });
        }

        let mut reader = BinaryReader::new(payload);
        let decoded = match cmd {
            ServerCmd::Message => Self::Message {
                kind: MessageKind::from_u8(reader.read_u8()?),
                text: reader.read_str_to_end()?,
            },
            ServerCmd::YourId => Self::YourId {
                id: reader.read_u16()?,
            },
            ServerCmd::Kick => Self::Kick {
                reason: reader.read_str_u16()?,
            },
            ServerCmd::ChunkImage => Self::ChunkImage {
                pos: TilePos::new(reader.read_i32()?, reader.read_i32()?),
                raw_size: reader.read_u32()?,
                compressed: reader.read_remaining().to_vec(),
            },
            ServerCmd::ChunkPixelPack => Self::ChunkPixelPack {
                pos: TilePos::new(reader.read_i32()?, reader.read_i32()?),
                pixel_count: reader.read_u32()?,
                raw_size: reader.read_u32()?,
                compressed: reader.read_remaining().to_vec(),
            },
            ServerCmd::ChunkCreate => Self::ChunkCreate {
                pos: TilePos::new(reader.read_i32()?, reader.read_i32()?),
            },
            ServerCmd::ChunkRemove => Self::ChunkRemove {
                pos: TilePos::new(reader.read_i32()?, reader.read_i32()?),
            },
            ServerCmd::PreviewImage => Self::PreviewImage {
                pos: PreviewPos::new(reader.read_i32()?, reader.read_i32()?),
                level: reader.read_u8()?,
                compressed: reader.read_remaining().to_vec(),
            },
            ServerCmd::UserCreate => Self::UserCreate {
                id: reader.read_u16()?,
                nickname: reader.read_str_to_end()?,
            },
            ServerCmd::UserRemove => Self::UserRemove {
                id: reader.read_u16()?,
            },
            ServerCmd::UserCursorPos => Self::UserCursorPos {
                id: reader.read_u16()?,
                x: reader.read_i32()?,
                y: reader.read_i32()?,
            },
            ServerCmd::ProcessingStatusText => Self::StatusText {
                text: reader.read_str_to_end()?,
            },
        };

        Ok(Some(decoded))
    }
}
