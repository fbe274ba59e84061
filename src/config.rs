use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Session configuration with sensible interactive defaults. Loadable from a
/// JSON file for headless deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub room: String,
    pub nickname: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Simulation ticks per second, decoupled from the display rate.
    pub tick_rate: f64,
    /// How often the tracked boundary is pushed to the server.
    pub boundary_interval_ms: u64,
    /// Keep-alive cadence.
    pub ping_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9000".into(),
            room: "main".into(),
            nickname: "guest".into(),
            canvas_width: 1280,
            canvas_height: 720,
            tick_rate: 60.0,
            boundary_interval_ms: 200,
            ping_interval_ms: 8000,
        }
    }
}

impl ClientConfig {
    pub fn new(
        server_url: impl Into<String>,
        room: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            room: room.into(),
            nickname: nickname.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"room": "plaza", "nickname": "ada"}"#).unwrap();
        assert_eq!(config.room, "plaza");
        assert_eq!(config.nickname, "ada");
        assert_eq!(config.tick_rate, 60.0);
        assert_eq!(config.boundary_interval_ms, 200);
    }
}
