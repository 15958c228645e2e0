//! Domain model: users, notes, and collaborator grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global account role. A default tier for the account as a whole,
/// distinct from the per-note [`Permission`] granted by an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Default for Role {
    fn default() -> Self {
        Role::Editor
    }
}

/// Per-note permission tier held by a collaborator. The owner never
/// carries a grant; ownership is implicit and always the highest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Viewer,
    Editor,
}

/// A registered user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Argon2 hash of the account password. Never serialized onto the
    /// wire; wire-facing types carry only id and display name.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            password_hash: password_hash.into(),
        }
    }
}

/// A collaborative note. Exactly one owner; collaborators are tracked
/// separately as [`Grant`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub owner_id: Uuid,
    /// Opaque public-share token, present once the owner has minted one.
    pub share_token: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(owner_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            owner_id,
            share_token: None,
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A collaborator grant: unique per (note, user), upsert overwrites the
/// tier. Never present for the note's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub permission: Permission,
}

impl Grant {
    pub fn new(note_id: Uuid, user_id: Uuid, permission: Permission) -> Self {
        Self {
            note_id,
            user_id,
            permission,
        }
    }
}

/// Partial update applied to a note; `None` keeps the stored field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}
