//! Stateless access-token signing and verification (HS256).
//!
//! Access tokens are never persisted: a verify is a pure signature and
//! expiry check, cheap enough to run on every connection handshake and
//! every protected request. Refresh tokens deliberately do NOT pass
//! through here — they are random values validated against the refresh
//! store, and the two paths must stay separate.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AuthError;

const TOKEN_TYPE_ACCESS: &str = "access";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    pub typ: String,
}

#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub fn access_claims(user_id: Uuid, ttl: Duration) -> Claims {
    let now = Utc::now();
    Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        typ: TOKEN_TYPE_ACCESS.into(),
    }
}

pub fn sign(keys: &Keys, claims: &Claims) -> Result<String, AuthError> {
    encode(&Header::default(), claims, &keys.encoding)
        .map_err(|e| AuthError::Internal(format!("jwt sign: {e}")))
}

/// Verify an access token and resolve the subject identity.
///
/// Expiry is reported as [`AuthError::TokenExpired`]; every other
/// failure (bad signature, malformed payload, wrong token type)
/// collapses into [`AuthError::TokenInvalid`].
pub fn verify(keys: &Keys, token: &str) -> Result<Uuid, AuthError> {
    let data = decode::<Claims>(token, &keys.decoding, &Validation::default()).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        }
    })?;

    if data.claims.typ != TOKEN_TYPE_ACCESS {
        return Err(AuthError::TokenInvalid);
    }
    Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::TokenInvalid)
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
