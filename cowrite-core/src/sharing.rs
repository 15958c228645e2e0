//! Owner-only note administration: collaborator grants, deletion, and
//! public share links. Everything here is gated through the `Manage`
//! capability, which the policy evaluator reserves for the owner.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{Grant, Note, Permission, User};
use crate::policy::{AccessPolicy, Capability};
use crate::store::{GrantStore, NoteStore, UserStore};

/// Length of a minted share token.
const SHARE_TOKEN_LEN: usize = 32;

pub struct Sharing {
    notes: Arc<dyn NoteStore>,
    grants: Arc<dyn GrantStore>,
    users: Arc<dyn UserStore>,
    policy: AccessPolicy,
}

impl Sharing {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        grants: Arc<dyn GrantStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let policy = AccessPolicy::new(grants.clone());
        Self {
            notes,
            grants,
            users,
            policy,
        }
    }

    async fn managed_note(&self, actor_id: Uuid, note_id: Uuid) -> Result<Note, CoreError> {
        let note = self
            .notes
            .get(note_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let decision = self
            .policy
            .evaluate(&note, actor_id, Capability::Manage)
            .await?;
        if !decision.allowed {
            return Err(CoreError::Unauthorized);
        }
        Ok(note)
    }

    /// Grant (or re-grant, overwriting the tier) a collaborator found by
    /// email. The owner cannot grant themselves.
    pub async fn add_collaborator(
        &self,
        actor_id: Uuid,
        note_id: Uuid,
        email: &str,
        permission: Permission,
    ) -> Result<User, CoreError> {
        self.managed_note(actor_id, note_id).await?;

        let target = self
            .users
            .find_by_email(&email.to_lowercase())
            .await?
            .ok_or(CoreError::NotFound)?;
        if target.id == actor_id {
            return Err(CoreError::Validation("cannot add yourself".into()));
        }

        self.grants
            .upsert(Grant::new(note_id, target.id, permission))
            .await?;
        Ok(target)
    }

    pub async fn remove_collaborator(
        &self,
        actor_id: Uuid,
        note_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CoreError> {
        self.managed_note(actor_id, note_id).await?;
        self.grants.remove(note_id, user_id).await?;
        Ok(())
    }

    /// Mint a fresh share token and mark the note public. Re-minting
    /// replaces the previous token.
    pub async fn mint_share_link(
        &self,
        actor_id: Uuid,
        note_id: Uuid,
    ) -> Result<String, CoreError> {
        self.managed_note(actor_id, note_id).await?;

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SHARE_TOKEN_LEN)
            .map(char::from)
            .collect();

        self.notes
            .publish(note_id, token.clone())
            .await?
            .ok_or(CoreError::NotFound)?;
        Ok(token)
    }

    /// Resolve a public note by share token. Tokens on notes that are
    /// not public resolve to nothing.
    pub async fn public_note(&self, token: &str) -> Result<Note, CoreError> {
        let note = self
            .notes
            .find_by_share_token(token)
            .await?
            .filter(|n| n.is_public)
            .ok_or(CoreError::NotFound)?;
        Ok(note)
    }

    pub async fn delete_note(&self, actor_id: Uuid, note_id: Uuid) -> Result<(), CoreError> {
        self.managed_note(actor_id, note_id).await?;
        self.notes.delete(note_id).await?;
        Ok(())
    }
}
