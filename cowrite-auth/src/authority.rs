//! The credential authority: issues, verifies, rotates, and revokes
//! access/refresh token pairs.
//!
//! Access tokens are stateless (signature + expiry only); refresh
//! tokens are stateful (store-backed, single lineage). The asymmetry is
//! deliberate — it is what makes verification cheap and revocation
//! possible — and the two paths are never unified.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwt::{self, Keys};
use crate::store::{RefreshTokenRecord, RefreshTokenStore};

/// Entropy of a refresh-token value, in bytes (hex-encoded on issue).
const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct CredentialAuthority {
    keys: Keys,
    refresh: Arc<dyn RefreshTokenStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialAuthority {
    pub fn new(config: &AuthConfig, refresh: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            keys: Keys::from_secret(config.token_secret.as_bytes()),
            refresh,
            access_ttl: Duration::seconds(config.access_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_ttl_secs),
        }
    }

    /// Mint a signed access token and a random refresh token for the
    /// identity, persisting one refresh-token record.
    pub async fn issue(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = jwt::sign(&self.keys, &jwt::access_claims(user_id, self.access_ttl))?;

        let mut buf = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        let refresh_token = hex::encode(buf);

        self.refresh
            .insert(RefreshTokenRecord {
                token_hash: jwt::sha256_hex(&refresh_token),
                user_id,
                expires_at: Utc::now() + self.refresh_ttl,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token. Pure signature/expiry check — no store
    /// lookup, safe to call on every connection and request.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, AuthError> {
        jwt::verify(&self.keys, token)
    }

    /// Exchange a refresh token for a fresh pair, invalidating the old
    /// value. The store's atomic `remove` is the replay gate: a token
    /// that has already been rotated (or revoked) is gone and fails
    /// with [`AuthError::RefreshUnknown`].
    pub async fn rotate(&self, refresh_token: &str) -> Result<(Uuid, TokenPair), AuthError> {
        let record = self
            .refresh
            .remove(&jwt::sha256_hex(refresh_token))
            .await?
            .ok_or(AuthError::RefreshUnknown)?;

        if record.is_expired() {
            return Err(AuthError::RefreshExpired);
        }

        let pair = self.issue(record.user_id).await?;
        Ok((record.user_id, pair))
    }

    /// Delete the refresh record. Revoking an absent token is not an
    /// error.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.refresh.remove(&jwt::sha256_hex(refresh_token)).await?;
        Ok(())
    }
}
