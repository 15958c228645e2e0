//! WebSocket collaboration hub with room-based note routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!            ├── Gatekeeper ── CollabHub ── AccessPolicy
//! Client B ──┘                    │
//!                                 ├── PresenceRegistry (who is live)
//!                                 ├── RoomRegistry     (fan-out buses)
//!                                 └── NoteStore        (content writes)
//! ```
//!
//! Each connection is one tokio task holding one half of the socket and
//! an optional room-bus receiver. The per-connection lifecycle is an
//! explicit state machine:
//!
//! ```text
//! Connecting ── handshake ──► Authenticated (RoomIdle) ⇄ RoomJoined ──► Closed
//!      └────── rejection ───────────────────────────────────────────► Closed
//! ```
//!
//! Room membership is re-authorized on every join and every edit;
//! cursor traffic rides on the joined state alone. Concurrent edits are
//! last-writer-wins at the store: no merge, no conflict detection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use cowrite_auth::CredentialAuthority;
use cowrite_core::{AccessPolicy, Capability, GrantStore, NotePatch, NoteStore, UserStore};

use crate::gate::{ConnectedUser, GateError, Gatekeeper};
use crate::presence::PresenceRegistry;
use crate::protocol::{
    ClientEvent, CursorPosition, NoteSnapshot, Participant, ProtocolError, ServerEvent, UpdatedBy,
};
use crate::rooms::{Outbound, RoomRegistry};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum participants per note room
    pub max_room_participants: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9300".to_string(),
            max_room_participants: 100,
            broadcast_capacity: 256,
        }
    }
}

/// Hub-wide statistics.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_handshakes: u64,
    pub total_events: u64,
    pub active_rooms: usize,
}

/// The collaborators the hub is wired to. The presence registry is
/// injected rather than constructed internally so tests and multi-hub
/// deployments own the instance.
pub struct HubServices {
    pub authority: Arc<CredentialAuthority>,
    pub users: Arc<dyn UserStore>,
    pub notes: Arc<dyn NoteStore>,
    pub grants: Arc<dyn GrantStore>,
    pub presence: Arc<PresenceRegistry>,
}

/// Shared per-connection context.
#[derive(Clone)]
struct ConnCtx {
    config: HubConfig,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    gate: Arc<Gatekeeper>,
    policy: Arc<AccessPolicy>,
    notes: Arc<dyn NoteStore>,
    /// Serializes every membership mutation together with the
    /// `active-users` broadcast it triggers, so racing joins/leaves can
    /// never publish membership lists out of order.
    membership: Arc<Mutex<()>>,
    stats: Arc<RwLock<HubStats>>,
}

/// The collaboration hub.
pub struct CollabHub {
    ctx: ConnCtx,
}

impl CollabHub {
    pub fn new(config: HubConfig, services: HubServices) -> Self {
        let rooms = Arc::new(RoomRegistry::new(config.broadcast_capacity));
        let gate = Arc::new(Gatekeeper::new(services.authority, services.users));
        let policy = Arc::new(AccessPolicy::new(services.grants));
        Self {
            ctx: ConnCtx {
                config,
                presence: services.presence,
                rooms,
                gate,
                policy,
                notes: services.notes,
                membership: Arc::new(Mutex::new(())),
                stats: Arc::new(RwLock::new(HubStats::default())),
            },
        }
    }

    /// Accept connections forever. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        log::info!("collaboration hub listening on {}", self.ctx.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, ctx).await {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.ctx.config.bind_addr
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.ctx.presence
    }

    pub async fn stats(&self) -> HubStats {
        self.ctx.stats.read().await.clone()
    }
}

/// Handle one WebSocket connection from handshake to cleanup.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnCtx,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    {
        let mut stats = ctx.stats.write().await;
        stats.total_connections += 1;
    }

    // Connecting → Authenticated: the first frame must carry the token.
    let handshake = match ws_receiver.next().await {
        Some(Ok(Message::Binary(data))) => {
            let bytes: Vec<u8> = data.into();
            ClientEvent::decode(&bytes).ok()
        }
        _ => None,
    };

    let token = match handshake {
        Some(ClientEvent::Authenticate { token }) => token,
        _ => {
            reject(&mut ws_sender, &ctx, addr, &GateError::MissingAuth.to_string()).await;
            return Ok(());
        }
    };

    let user = match ctx.gate.admit(&token).await {
        Ok(user) => user,
        Err(e) => {
            reject(&mut ws_sender, &ctx, addr, &e.to_string()).await;
            return Ok(());
        }
    };

    let connection_id = Uuid::new_v4();
    if send_event(
        &mut ws_sender,
        &ServerEvent::Authenticated {
            user_id: user.id,
            connection_id,
        },
    )
    .await
    .is_err()
    {
        return Ok(());
    }

    {
        let mut stats = ctx.stats.write().await;
        stats.active_connections += 1;
    }
    log::info!("connection {connection_id} authenticated as {} ({addr})", user.name);

    // RoomIdle ⇄ RoomJoined state for this connection.
    let mut joined: Option<Uuid> = None;
    let mut room_rx: Option<broadcast::Receiver<Outbound>> = None;

    loop {
        tokio::select! {
            // Incoming client event
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let bytes: Vec<u8> = data.into();
                        match ClientEvent::decode(&bytes) {
                            Ok(event) => {
                                {
                                    let mut stats = ctx.stats.write().await;
                                    stats.total_events += 1;
                                }
                                let result = dispatch(
                                    &ctx,
                                    &user,
                                    connection_id,
                                    event,
                                    &mut joined,
                                    &mut room_rx,
                                    &mut ws_sender,
                                )
                                .await;
                                if result.is_err() {
                                    // Socket gone mid-reply; fall through to cleanup.
                                    break;
                                }
                            }
                            Err(e) => {
                                log::warn!("undecodable frame from {connection_id}: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("connection {connection_id} closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        log::warn!("socket error on {connection_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            // Outgoing room broadcast
            out = async {
                match room_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    // Not in a room — park until a join installs a receiver.
                    None => std::future::pending().await,
                }
            } => {
                match out {
                    Ok(outbound) => {
                        if outbound.exclude == Some(connection_id) {
                            continue;
                        }
                        if ws_sender
                            .send(Message::Binary(outbound.frame.to_vec().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("connection {connection_id} lagged by {n} broadcasts");
                    }
                    Err(_) => break,
                }
            }
        }
    }

    // Closed: the one mandatory cleanup path. Runs for clean and
    // unclean disconnects alike; an explicit leave beforehand makes it
    // a no-op.
    drop(room_rx);
    {
        let _membership = ctx.membership.lock().await;
        let changed = ctx.presence.remove_connection_everywhere(connection_id).await;
        for (note_id, users) in changed {
            if users.is_empty() {
                ctx.rooms.remove(note_id).await;
            } else if let Some(bus) = ctx.rooms.get(note_id).await {
                let _ = bus.send(
                    &ServerEvent::ActiveUsers { note_id, users },
                    Some(connection_id),
                );
            }
        }
    }

    {
        let mut stats = ctx.stats.write().await;
        stats.active_connections -= 1;
        stats.active_rooms = ctx.presence.room_count().await;
    }
    log::info!("connection {connection_id} cleaned up ({})", user.name);

    Ok(())
}

/// Send a terminal error during the handshake and close.
async fn reject(ws: &mut WsSink, ctx: &ConnCtx, addr: SocketAddr, reason: &str) {
    log::info!("rejecting connection from {addr}: {reason}");
    let _ = send_event(ws, &ServerEvent::error(reason)).await;
    let _ = ws.send(Message::Close(None)).await;
    let mut stats = ctx.stats.write().await;
    stats.rejected_handshakes += 1;
}

async fn send_event(ws: &mut WsSink, event: &ServerEvent) -> Result<(), ProtocolError> {
    let frame = event.encode()?;
    ws.send(Message::Binary(frame.into()))
        .await
        .map_err(|_| ProtocolError::ConnectionClosed)
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    ctx: &ConnCtx,
    user: &ConnectedUser,
    connection_id: Uuid,
    event: ClientEvent,
    joined: &mut Option<Uuid>,
    room_rx: &mut Option<broadcast::Receiver<Outbound>>,
    ws: &mut WsSink,
) -> Result<(), ProtocolError> {
    match event {
        ClientEvent::Authenticate { .. } => {
            send_event(ws, &ServerEvent::error("Already authenticated")).await
        }
        ClientEvent::JoinNote { note_id } => {
            handle_join(ctx, user, connection_id, note_id, joined, room_rx, ws).await
        }
        ClientEvent::NoteUpdate {
            note_id,
            title,
            content,
        } => handle_update(ctx, user, connection_id, note_id, title, content, joined, ws).await,
        ClientEvent::CursorMove { note_id, position } => {
            handle_cursor(ctx, user, connection_id, note_id, position, joined, ws).await
        }
        ClientEvent::LeaveNote { note_id } => {
            handle_leave(ctx, connection_id, note_id, joined, room_rx).await;
            Ok(())
        }
    }
}

async fn handle_join(
    ctx: &ConnCtx,
    user: &ConnectedUser,
    connection_id: Uuid,
    note_id: Uuid,
    joined: &mut Option<Uuid>,
    room_rx: &mut Option<broadcast::Receiver<Outbound>>,
    ws: &mut WsSink,
) -> Result<(), ProtocolError> {
    if joined.is_some() {
        return send_event(ws, &ServerEvent::error("Already in a note room")).await;
    }

    // Existence and view capability are re-checked on every join;
    // membership from a prior session proves nothing.
    let note = match ctx.notes.get(note_id).await {
        Ok(Some(note)) => note,
        Ok(None) => return send_event(ws, &ServerEvent::error("Note not found")).await,
        Err(e) => {
            log::error!("note lookup failed for {note_id}: {e}");
            return send_event(ws, &ServerEvent::error("Failed to join note")).await;
        }
    };

    let decision = match ctx.policy.evaluate(&note, user.id, Capability::View).await {
        Ok(decision) => decision,
        Err(e) => {
            log::error!("grant lookup failed for {note_id}: {e}");
            return send_event(ws, &ServerEvent::error("Failed to join note")).await;
        }
    };
    if !decision.allowed {
        return send_event(ws, &ServerEvent::error("Access denied")).await;
    }

    {
        let _membership = ctx.membership.lock().await;

        if ctx.presence.count(note_id).await >= ctx.config.max_room_participants {
            drop(_membership);
            return send_event(ws, &ServerEvent::error("Room is full")).await;
        }

        // Subscribe before the membership broadcast so the joiner sees it.
        let bus = ctx.rooms.get_or_create(note_id).await;
        *room_rx = Some(bus.subscribe());

        let users = ctx
            .presence
            .add(
                note_id,
                Participant {
                    user_id: user.id,
                    connection_id,
                    name: user.name.clone(),
                },
            )
            .await;
        *joined = Some(note_id);

        if let Err(e) = bus.send(&ServerEvent::ActiveUsers { note_id, users }, None) {
            log::error!("presence broadcast failed for {note_id}: {e}");
        }
    }

    log::info!(
        "{} joined note {note_id} as {:?}",
        user.name,
        decision.tier
    );
    send_event(
        ws,
        &ServerEvent::Joined {
            note_id,
            note: NoteSnapshot::from(&note),
        },
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn handle_update(
    ctx: &ConnCtx,
    user: &ConnectedUser,
    connection_id: Uuid,
    note_id: Uuid,
    title: Option<String>,
    content: Option<String>,
    joined: &mut Option<Uuid>,
    ws: &mut WsSink,
) -> Result<(), ProtocolError> {
    if *joined != Some(note_id) {
        return send_event(ws, &ServerEvent::error("Join the note before editing")).await;
    }

    let note = match ctx.notes.get(note_id).await {
        Ok(Some(note)) => note,
        Ok(None) => return send_event(ws, &ServerEvent::error("Note not found")).await,
        Err(e) => {
            log::error!("note lookup failed for {note_id}: {e}");
            return send_event(ws, &ServerEvent::error("Update failed")).await;
        }
    };

    // Edit, not just view: a viewer present in the room must never
    // mutate through this channel.
    let decision = match ctx.policy.evaluate(&note, user.id, Capability::Edit).await {
        Ok(decision) => decision,
        Err(e) => {
            log::error!("grant lookup failed for {note_id}: {e}");
            return send_event(ws, &ServerEvent::error("Update failed")).await;
        }
    };
    if !decision.allowed {
        return send_event(ws, &ServerEvent::error("No edit permission")).await;
    }

    // Persist first; an unpersisted edit is never fanned out.
    let updated = match ctx
        .notes
        .update(
            note_id,
            NotePatch {
                title: title.clone(),
                content: content.clone(),
            },
        )
        .await
    {
        Ok(Some(updated)) => updated,
        Ok(None) => return send_event(ws, &ServerEvent::error("Note not found")).await,
        Err(e) => {
            log::error!("note write failed for {note_id}: {e}");
            return send_event(ws, &ServerEvent::error("Update failed")).await;
        }
    };

    if let Some(bus) = ctx.rooms.get(note_id).await {
        let event = ServerEvent::NoteUpdated {
            note_id,
            title,
            content,
            updated_by: UpdatedBy {
                id: user.id,
                name: user.name.clone(),
            },
            updated_at: updated.updated_at,
        };
        if let Err(e) = bus.send(&event, Some(connection_id)) {
            log::error!("update broadcast failed for {note_id}: {e}");
        }
    }
    Ok(())
}

async fn handle_cursor(
    ctx: &ConnCtx,
    user: &ConnectedUser,
    connection_id: Uuid,
    note_id: Uuid,
    position: CursorPosition,
    joined: &mut Option<Uuid>,
    ws: &mut WsSink,
) -> Result<(), ProtocolError> {
    if *joined != Some(note_id) {
        return send_event(ws, &ServerEvent::error("Join the note before sending cursors")).await;
    }

    // Lossy, best-effort: no persistence, no re-check, drops are fine.
    if let Some(bus) = ctx.rooms.get(note_id).await {
        let _ = bus.send(
            &ServerEvent::CursorMoved {
                user_id: user.id,
                name: user.name.clone(),
                position,
            },
            Some(connection_id),
        );
    }
    Ok(())
}

async fn handle_leave(
    ctx: &ConnCtx,
    connection_id: Uuid,
    note_id: Uuid,
    joined: &mut Option<Uuid>,
    room_rx: &mut Option<broadcast::Receiver<Outbound>>,
) {
    // Idempotent: leaving a room we are not in is a no-op.
    if *joined != Some(note_id) {
        return;
    }
    *joined = None;
    *room_rx = None;

    let _membership = ctx.membership.lock().await;
    if let Some(users) = ctx.presence.remove(note_id, connection_id).await {
        if users.is_empty() {
            ctx.rooms.remove(note_id).await;
        } else if let Some(bus) = ctx.rooms.get(note_id).await {
            let _ = bus.send(
                &ServerEvent::ActiveUsers { note_id, users },
                Some(connection_id),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cowrite_auth::{AuthConfig, MemoryRefreshTokenStore};
    use cowrite_core::{MemoryGrantStore, MemoryNoteStore, MemoryUserStore};

    fn test_hub(config: HubConfig) -> CollabHub {
        let auth_config = AuthConfig::new("hub-test-secret", 900, 900);
        let authority = Arc::new(CredentialAuthority::new(
            &auth_config,
            Arc::new(MemoryRefreshTokenStore::new()),
        ));
        CollabHub::new(
            config,
            HubServices {
                authority,
                users: Arc::new(MemoryUserStore::new()),
                notes: Arc::new(MemoryNoteStore::new()),
                grants: Arc::new(MemoryGrantStore::new()),
                presence: Arc::new(PresenceRegistry::new()),
            },
        )
    }

    #[test]
    fn config_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9300");
        assert_eq!(config.max_room_participants, 100);
        assert_eq!(config.broadcast_capacity, 256);
    }

    #[tokio::test]
    async fn hub_starts_with_empty_stats() {
        let hub = test_hub(HubConfig::default());
        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.rejected_handshakes, 0);
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn hub_exposes_injected_presence() {
        let hub = test_hub(HubConfig::default());
        assert_eq!(hub.presence().room_count().await, 0);
        assert_eq!(hub.bind_addr(), "127.0.0.1:9300");
    }
}
