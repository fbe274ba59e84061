use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::codec::{ClientCommand, Color, IndexRange, PreviewPos, ServerCommand, ToolKind};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Binary-framed connection to the canvas authority.
///
/// Owns the transport and the codec on both directions. The announce is sent
/// the moment the socket opens; the session is protocol-ready only once the
/// server answers with `your_id`. There is no reconnect: an unclean close
/// surfaces one terminal error and the connection stays `Closed`.
pub struct Connection {
    ws: WsStream,
    state: ConnectionState,
    terminal_reported: bool,
}

impl Connection {
    /// Establish the transport and announce room + nickname.
    pub async fn open(url: &str, room: &str, nickname: &str) -> Result<Self> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        debug!(url, room, "socket connected");

        let mut connection = Self {
            ws,
            state: ConnectionState::Open,
            terminal_reported: false,
        };
        connection
            .send(ClientCommand::Announce {
                room: room.to_owned(),
                nickname: nickname.to_owned(),
            })
            .await?;
        Ok(connection)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Fire-and-forget send of one encoded command.
    pub async fn send(&mut self, command: ClientCommand) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(Error::NotConnected);
        }
        if let Err(e) = self.ws.send(Message::Binary(command.encode())).await {
            self.state = ConnectionState::Closed;
            if !self.terminal_reported {
                self.terminal_reported = true;
                return Err(Error::Transport(e.to_string()));
            }
        }
        Ok(())
    }

    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        self.send(ClientCommand::Message { text: text.to_owned() }).await
    }

    pub async fn send_ping(&mut self) -> Result<()> {
        self.send(ClientCommand::Ping).await
    }

    pub async fn send_cursor_pos(&mut self, x: i32, y: i32) -> Result<()> {
        self.send(ClientCommand::CursorPos { x, y }).await
    }

    pub async fn send_cursor_down(&mut self) -> Result<()> {
        self.send(ClientCommand::CursorDown).await
    }

    pub async fn send_cursor_up(&mut self) -> Result<()> {
        self.send(ClientCommand::CursorUp).await
    }

    pub async fn send_boundary(&mut self, range: IndexRange, zoom: f32) -> Result<()> {
        self.send(ClientCommand::Boundary { range, zoom }).await
    }

    pub async fn send_chunks_received(&mut self, count: u32) -> Result<()> {
        self.send(ClientCommand::ChunksReceived { count }).await
    }

    pub async fn send_preview_request(&mut self, pos: PreviewPos, level: u8) -> Result<()> {
        self.send(ClientCommand::PreviewRequest { pos, level }).await
    }

    pub async fn send_tool_type(&mut self, tool: ToolKind) -> Result<()> {
        self.send(ClientCommand::ToolType { tool }).await
    }

    pub async fn send_tool_color(&mut self, color: Color) -> Result<()> {
        self.send(ClientCommand::ToolColor { color }).await
    }

    pub async fn send_tool_size(&mut self, size: u8) -> Result<()> {
        self.send(ClientCommand::ToolSize { size }).await
    }

    pub async fn send_tool_flow(&mut self, flow: u32) -> Result<()> {
        self.send(ClientCommand::ToolFlow { flow }).await
    }

    pub async fn send_undo(&mut self) -> Result<()> {
        self.send(ClientCommand::Undo).await
    }

    /// Next decoded inbound command.
    ///
    /// `Ok(None)` means the connection is closed (cleanly, or after the one
    /// terminal error has already been delivered). Malformed frames for known
    /// commands and unknown identifiers are skipped, never fatal.
    pub async fn next_event(&mut self) -> Result<Option<ServerCommand>> {
        loop {
            if self.state == ConnectionState::Closed {
                return Ok(None);
            }
            match self.ws.next().await {
                None => return self.close_unclean("connection reset"),
                Some(Err(e)) => {
                    let reason = e.to_string();
                    return self.close_unclean(&reason);
                }
                Some(Ok(Message::Binary(data))) => match ServerCommand::decode(&data) {
                    Ok(Some(command)) => return Ok(Some(command)),
                    Ok(None) => continue,
                    Err(e @ Error::TruncatedHeader { .. }) => {
                        self.state = ConnectionState::Closed;
                        if self.terminal_reported {
                            return Ok(None);
                        }
                        self.terminal_reported = true;
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping malformed frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    debug!("server closed connection");
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Like [`next_event`](Self::next_event) but gives up after `timeout`,
    /// returning `Ok(None)` so callers can keep their frame pacing.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Option<ServerCommand>> {
        match tokio::time::timeout(timeout, self.next_event()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Close the transport deliberately, e.g. after a kick.
    pub async fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.ws.close(None).await;
            self.state = ConnectionState::Closed;
        }
    }

    fn close_unclean(&mut self, reason: &str) -> Result<Option<ServerCommand>> {
        self.state = ConnectionState::Closed;
        if self.terminal_reported {
            return Ok(None);
        }
        self.terminal_reported = true;
        Err(Error::ConnectionClosed {
            reason: reason.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use tokio_tungstenite::accept_async;

    use crate::codec::{BinaryReader, ClientCmd};

    #[tokio::test]
    async fn test_open_announces_then_receives() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // First frame must be the announce.
            let data = ws.next().await.unwrap().unwrap().into_data();
            let mut reader = BinaryReader::new(&data);
            assert_eq!(reader.read_i16().unwrap(), ClientCmd::Announce as i16);
            assert_eq!(reader.read_str_u8().unwrap(), "plaza");
            assert_eq!(reader.read_str_u8().unwrap(), "bot");

            let mut buf = BytesMut::new();
            buf.put_i16(2); // your_id
            buf.put_u16(42);
            ws.send(Message::Binary(buf.freeze())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut connection = Connection::open(&format!("ws://{addr}"), "plaza", "bot")
            .await
            .unwrap();
        assert_eq!(connection.state(), ConnectionState::Open);

        let event = connection.next_event().await.unwrap();
        assert_eq!(event, Some(ServerCommand::YourId { id: 42 }));

        // Clean close: no terminal error, just end-of-events.
        let event = connection.next_event().await.unwrap();
        assert_eq!(event, None);
        assert!(connection.is_closed());

        let err = connection.send_ping().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _announce = ws.next().await.unwrap().unwrap();

            // Unknown id, then a short user_cursor_pos, then a good frame.
            let mut unknown = BytesMut::new();
            unknown.put_i16(4242);
            ws.send(Message::Binary(unknown.freeze())).await.unwrap();

            let mut short = BytesMut::new();
            short.put_i16(1002);
            short.put_u16(1);
            ws.send(Message::Binary(short.freeze())).await.unwrap();

            let mut good = BytesMut::new();
            good.put_i16(1001); // user_remove
            good.put_u16(9);
            ws.send(Message::Binary(good.freeze())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut connection = Connection::open(&format!("ws://{addr}"), "plaza", "bot")
            .await
            .unwrap();
        let event = connection.next_event().await.unwrap();
        assert_eq!(event, Some(ServerCommand::UserRemove { id: 9 }));

        server.await.unwrap();
    }
}
