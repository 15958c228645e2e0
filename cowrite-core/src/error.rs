use thiserror::Error;

use crate::store::StoreError;

/// Domain-level failures surfaced by core operations.
///
/// `NotFound` and `Unauthorized` are terminal for the requesting
/// operation only; callers keep their session alive and surface the
/// reason to the requester.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
