//! In-memory implementations of the store traits.
//!
//! Same semantics as a database backend but everything lives in process
//! memory behind an `RwLock`; locks are never held across an await.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::model::{Grant, Note, NotePatch, User};
use crate::store::{GrantStore, NoteStore, StoreError, StoreResult, UserStore};

/// In-memory note store.
pub struct MemoryNoteStore {
    notes: RwLock<HashMap<Uuid, Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Note>> {
        let notes = self.notes.read().unwrap();
        Ok(notes.get(&id).cloned())
    }

    async fn insert(&self, note: Note) -> StoreResult<()> {
        let mut notes = self.notes.write().unwrap();
        notes.insert(note.id, note);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: NotePatch) -> StoreResult<Option<Note>> {
        let mut notes = self.notes.write().unwrap();
        Ok(notes.get_mut(&id).map(|note| {
            if let Some(title) = patch.title {
                note.title = title;
            }
            if let Some(content) = patch.content {
                note.content = content;
            }
            note.updated_at = Utc::now();
            note.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut notes = self.notes.write().unwrap();
        Ok(notes.remove(&id).is_some())
    }

    async fn publish(&self, id: Uuid, share_token: String) -> StoreResult<Option<Note>> {
        let mut notes = self.notes.write().unwrap();
        Ok(notes.get_mut(&id).map(|note| {
            note.share_token = Some(share_token);
            note.is_public = true;
            note.clone()
        }))
    }

    async fn find_by_share_token(&self, token: &str) -> StoreResult<Option<Note>> {
        let notes = self.notes.read().unwrap();
        Ok(notes
            .values()
            .find(|n| n.share_token.as_deref() == Some(token))
            .cloned())
    }
}

/// In-memory grant store, keyed by (note, user).
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<(Uuid, Uuid), Grant>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn get(&self, note_id: Uuid, user_id: Uuid) -> StoreResult<Option<Grant>> {
        let grants = self.grants.read().unwrap();
        Ok(grants.get(&(note_id, user_id)).cloned())
    }

    async fn upsert(&self, grant: Grant) -> StoreResult<()> {
        let mut grants = self.grants.write().unwrap();
        grants.insert((grant.note_id, grant.user_id), grant);
        Ok(())
    }

    async fn remove(&self, note_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut grants = self.grants.write().unwrap();
        Ok(grants.remove(&(note_id, user_id)).is_some())
    }

    async fn list_for_note(&self, note_id: Uuid) -> StoreResult<Vec<Grant>> {
        let grants = self.grants.read().unwrap();
        Ok(grants
            .values()
            .filter(|g| g.note_id == note_id)
            .cloned()
            .collect())
    }
}

/// In-memory user store with a unique-email constraint.
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: User) -> StoreResult<()> {
        let mut users = self.users.write().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        users.insert(user.id, user);
        Ok(())
    }
}
