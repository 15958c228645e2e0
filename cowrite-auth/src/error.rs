use cowrite_core::StoreError;
use thiserror::Error;

/// Credential and account failures.
///
/// `TokenExpired` and `TokenInvalid` both surface to callers as an
/// unauthenticated condition; they stay distinct so transports can hint
/// clients toward rotation on expiry. `RefreshUnknown` is what a
/// replayed (already-rotated) refresh token hits.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access token expired")]
    TokenExpired,

    #[error("invalid access token")]
    TokenInvalid,

    #[error("unknown or already rotated refresh token")]
    RefreshUnknown,

    #[error("refresh token expired")]
    RefreshExpired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email already registered")]
    EmailTaken,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}
