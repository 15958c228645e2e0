//! WebSocket client for the collaboration hub.
//!
//! Handles the connection lifecycle (connect, authenticate, disconnect)
//! and exposes typed senders for room events plus an mpsc stream of
//! everything the hub pushes back. Used by the integration tests and by
//! native front-ends.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use uuid::Uuid;

use crate::protocol::{ClientEvent, CursorPosition, ProtocolError, ServerEvent};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Socket established and handshake sent.
    Connected,
    /// Socket closed (either side).
    Disconnected,
    /// A decoded event from the hub.
    Server(ServerEvent),
}

/// The hub client.
pub struct CollabClient {
    server_url: String,
    token: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl CollabClient {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            token: token.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Connect to the hub and send the authentication handshake.
    ///
    /// Spawns background tasks for the socket reader and writer; the
    /// hub's verdict arrives as `Server(Authenticated { .. })` or
    /// `Server(Error { .. })` on the event stream.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.server_url)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket, then
        // close the socket when the channel is dropped.
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Handshake: the first frame must authenticate.
        let auth = ClientEvent::Authenticate {
            token: self.token.clone(),
        };
        self.send(&auth).await?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SessionEvent::Connected).await;

        // Reader task: decode hub events onto the event stream.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ServerEvent::decode(&bytes) {
                            Ok(event) => {
                                let _ = event_tx.send(SessionEvent::Server(event)).await;
                            }
                            Err(e) => {
                                log::warn!("undecodable frame from hub: {e}");
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SessionEvent::Disconnected).await;
        });

        Ok(())
    }

    pub async fn join_note(&self, note_id: Uuid) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::JoinNote { note_id }).await
    }

    pub async fn update_note(
        &self,
        note_id: Uuid,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::NoteUpdate {
            note_id,
            title,
            content,
        })
        .await
    }

    pub async fn cursor_move(
        &self,
        note_id: Uuid,
        position: CursorPosition,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::CursorMove { note_id, position }).await
    }

    pub async fn leave_note(&self, note_id: Uuid) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::LeaveNote { note_id }).await
    }

    /// Drop the outgoing channel, closing the socket. The hub treats
    /// this like any other disconnect and cleans up presence.
    pub fn disconnect(&mut self) {
        self.outgoing_tx = None;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn send(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        let encoded = event.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}
