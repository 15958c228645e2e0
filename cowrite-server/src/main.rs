//! cowrite-server — runnable collaboration hub.
//!
//! Wires the credential authority and the hub together over in-memory
//! stores. The store traits are the integration seam: a deployment with
//! a database backend swaps the constructors here and nothing else.
//!
//! Environment:
//! - `JWT_SECRET` (required) — access-token signing secret
//! - `ACCESS_TTL_SECS`, `REFRESH_TTL_SECS` — token lifetimes
//! - `COWRITE_BIND` — hub bind address (default 127.0.0.1:9300)

use std::sync::Arc;

use cowrite_auth::{AuthConfig, CredentialAuthority, MemoryRefreshTokenStore};
use cowrite_collab::{CollabHub, HubConfig, HubServices, PresenceRegistry};
use cowrite_core::{MemoryGrantStore, MemoryNoteStore, MemoryUserStore};
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let auth_config = AuthConfig::from_env();
    let authority = Arc::new(CredentialAuthority::new(
        &auth_config,
        Arc::new(MemoryRefreshTokenStore::new()),
    ));

    let config = HubConfig {
        bind_addr: std::env::var("COWRITE_BIND")
            .unwrap_or_else(|_| HubConfig::default().bind_addr),
        ..HubConfig::default()
    };

    info!("starting cowrite hub on {}", config.bind_addr);

    let hub = CollabHub::new(
        config,
        HubServices {
            authority,
            users: Arc::new(MemoryUserStore::new()),
            notes: Arc::new(MemoryNoteStore::new()),
            grants: Arc::new(MemoryGrantStore::new()),
            presence: Arc::new(PresenceRegistry::new()),
        },
    );

    hub.run().await
}
