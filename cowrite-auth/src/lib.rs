//! # cowrite-auth — session-token authority for cowrite
//!
//! Issues, verifies, rotates, and revokes the access/refresh token
//! pairs that gate every collaborative action.
//!
//! ## Token contract
//!
//! ```text
//! issue(user) ──► access token   (JWT, signed, short-lived, stateless)
//!            └──► refresh token  (random, store-backed, 7-day lineage)
//!
//! verify_access(token)  — signature + expiry only, no storage
//! rotate(refresh)       — atomic remove + reissue; replay fails
//! revoke(refresh)       — idempotent delete
//! ```
//!
//! ## Modules
//!
//! - [`authority`] — issue / verify / rotate / revoke
//! - [`jwt`] — HS256 claims, signing, verification
//! - [`store`] — refresh-token records and persistence contract
//! - [`accounts`] — register / login / refresh / logout
//! - [`password`] — argon2 hashing
//! - [`config`] — environment-driven configuration

pub mod accounts;
pub mod authority;
pub mod config;
pub mod error;
pub mod jwt;
pub mod password;
pub mod store;

pub use accounts::{AccountService, Session};
pub use authority::{CredentialAuthority, TokenPair};
pub use config::AuthConfig;
pub use error::AuthError;
pub use store::{MemoryRefreshTokenStore, RefreshTokenRecord, RefreshTokenStore};
