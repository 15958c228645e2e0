//! Connection gatekeeper: authenticates an inbound connection before
//! the hub processes any room event.
//!
//! Runs exactly once per connection, against the bearer token carried
//! in the handshake frame. On success the connection is bound to the
//! resolved identity for its whole lifetime; room events trust that
//! binding and are never re-verified per message — a token expiring
//! mid-connection keeps its session until disconnect, trading a small
//! security window for per-message throughput.

use std::sync::Arc;

use cowrite_auth::CredentialAuthority;
use cowrite_core::{StoreError, UserStore};
use thiserror::Error;
use uuid::Uuid;

/// Identity bound to an admitted connection.
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Handshake rejections. The display strings are what the client sees
/// in the terminal `Error` event.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Authentication failed")]
    Backend(#[from] StoreError),
}

pub struct Gatekeeper {
    authority: Arc<CredentialAuthority>,
    users: Arc<dyn UserStore>,
}

impl Gatekeeper {
    pub fn new(authority: Arc<CredentialAuthority>, users: Arc<dyn UserStore>) -> Self {
        Self { authority, users }
    }

    /// Verify the bearer token and resolve the account. The account
    /// must still exist — a valid signature for a deleted user is
    /// rejected.
    pub async fn admit(&self, token: &str) -> Result<ConnectedUser, GateError> {
        // Expired and malformed tokens alike collapse into the same
        // rejection on the wire; the distinction stays internal.
        let user_id = self
            .authority
            .verify_access(token)
            .map_err(|_| GateError::InvalidToken)?;

        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or(GateError::UserNotFound)?;

        Ok(ConnectedUser {
            id: user.id,
            name: user.name,
            email: user.email,
        })
    }
}
