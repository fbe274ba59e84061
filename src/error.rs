#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("truncated frame header: {len} bytes")]
    TruncatedHeader { len: usize },

    #[error("short frame for {command}: need {need} bytes, have {have}")]
    ShortFrame {
        command: &'static str,
        need: usize,
        have: usize,
    },

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decompressed size mismatch: expected {expected} bytes, got {actual}")]
    DecompressedSize { expected: usize, actual: usize },

    #[error("pixel pack size mismatch: {pixel_count} pixels declared, {raw_size} raw bytes")]
    PixelPackSize { pixel_count: u32, raw_size: u32 },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
