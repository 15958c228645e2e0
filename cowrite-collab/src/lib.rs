//! # cowrite-collab — real-time collaboration hub for cowrite
//!
//! WebSocket-based multiplayer note editing: authenticated connections,
//! room-scoped presence, and permission-gated update broadcast.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ CollabClient │ ◄────────────────► │  CollabHub   │
//! │ (per user)   │    Binary Proto    │  (central)   │
//! └──────────────┘                    └──────┬───────┘
//!                                            │
//!                              ┌─────────────┼──────────────┐
//!                              ▼             ▼              ▼
//!                        Gatekeeper   PresenceRegistry  RoomRegistry
//!                        (token gate) (who is live)     (fan-out)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — binary wire protocol (bincode-encoded events)
//! - [`gate`] — connection authentication before hub admission
//! - [`presence`] — per-note participant tracking
//! - [`rooms`] — room-scoped broadcast with sender exclusion
//! - [`server`] — the hub event loop
//! - [`client`] — WebSocket client with typed event stream

pub mod client;
pub mod gate;
pub mod presence;
pub mod protocol;
pub mod rooms;
pub mod server;

pub use client::{CollabClient, ConnectionState, SessionEvent};
pub use gate::{ConnectedUser, GateError, Gatekeeper};
pub use presence::PresenceRegistry;
pub use protocol::{
    ClientEvent, CursorPosition, NoteSnapshot, Participant, ProtocolError, ServerEvent, UpdatedBy,
};
pub use rooms::{Outbound, RoomBus, RoomRegistry};
pub use server::{CollabHub, HubConfig, HubServices, HubStats};
