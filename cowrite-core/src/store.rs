//! Store traits: the abstract interfaces for the persistence
//! collaborators the core consumes.
//!
//! The hub and the policy evaluator are storage-agnostic; they only see
//! these traits. The in-memory implementations in [`crate::memory`] are
//! the shipped backend and the test substrate; a database-backed
//! implementation can be swapped in without touching call sites.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Grant, Note, NotePatch, User};

/// Failures from a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure. Logged and surfaced as a generic failure;
    /// never retried automatically by the core.
    #[error("storage error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Note persistence. `update` applies a partial patch and stamps
/// `updated_at` with the server clock; the returned note is the
/// authoritative post-write state.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Note>>;

    async fn insert(&self, note: Note) -> StoreResult<()>;

    /// Apply `patch` to the note, returning the updated note, or `None`
    /// if the note does not exist.
    async fn update(&self, id: Uuid, patch: NotePatch) -> StoreResult<Option<Note>>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Attach a share token and mark the note public.
    async fn publish(&self, id: Uuid, share_token: String) -> StoreResult<Option<Note>>;

    async fn find_by_share_token(&self, token: &str) -> StoreResult<Option<Note>>;
}

/// Collaborator-grant lookup and administration.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn get(&self, note_id: Uuid, user_id: Uuid) -> StoreResult<Option<Grant>>;

    /// Insert or overwrite the grant for (note, user).
    async fn upsert(&self, grant: Grant) -> StoreResult<()>;

    async fn remove(&self, note_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    async fn list_for_note(&self, note_id: Uuid) -> StoreResult<Vec<Grant>>;
}

/// User account lookup. `insert` enforces email uniqueness.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert(&self, user: User) -> StoreResult<()>;
}
