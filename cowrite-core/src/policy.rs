//! Access policy evaluation for note capabilities.
//!
//! Every protected operation names a [`Capability`]; the evaluator
//! answers allow/deny together with the effective [`Tier`], since
//! callers (presence labeling, sharing administration) need both.
//!
//! Rules:
//! - the owner is granted every capability at tier `Owner`;
//! - `View` requires any grant;
//! - `Edit` requires an `Editor` grant;
//! - `Manage` (collaborator administration, deletion, share links) is
//!   owner-only regardless of grants.

use std::sync::Arc;

use uuid::Uuid;

use crate::model::{Note, Permission};
use crate::store::{GrantStore, StoreResult};

/// The operation class being authorized against a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    Edit,
    Manage,
}

/// Effective permission tier of a subject on a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Viewer,
    Editor,
    Owner,
}

impl From<Permission> for Tier {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::Viewer => Tier::Viewer,
            Permission::Editor => Tier::Editor,
        }
    }
}

/// Outcome of a policy check. `tier` is populated whenever the subject
/// has any relationship to the note, even when `allowed` is false
/// (a viewer denied `Edit` still reports tier `Viewer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub tier: Option<Tier>,
}

impl Decision {
    fn deny(tier: Option<Tier>) -> Self {
        Self {
            allowed: false,
            tier,
        }
    }

    fn allow(tier: Tier) -> Self {
        Self {
            allowed: true,
            tier: Some(tier),
        }
    }
}

/// Pure evaluation over an already-fetched grant.
pub fn evaluate(
    note: &Note,
    user_id: Uuid,
    grant: Option<Permission>,
    capability: Capability,
) -> Decision {
    if note.owner_id == user_id {
        return Decision::allow(Tier::Owner);
    }

    // Manage never falls through to grants.
    if capability == Capability::Manage {
        return Decision::deny(grant.map(Tier::from));
    }

    match grant {
        None => Decision::deny(None),
        Some(permission) => {
            let tier = Tier::from(permission);
            match capability {
                Capability::View => Decision::allow(tier),
                Capability::Edit if permission == Permission::Editor => Decision::allow(tier),
                _ => Decision::deny(Some(tier)),
            }
        }
    }
}

/// Policy evaluator bound to a grant store, for callers that start from
/// identifiers rather than an in-hand grant.
pub struct AccessPolicy {
    grants: Arc<dyn GrantStore>,
}

impl AccessPolicy {
    pub fn new(grants: Arc<dyn GrantStore>) -> Self {
        Self { grants }
    }

    pub async fn evaluate(
        &self,
        note: &Note,
        user_id: Uuid,
        capability: Capability,
    ) -> StoreResult<Decision> {
        // Owner short-circuits without a grant lookup.
        if note.owner_id == user_id {
            return Ok(Decision::allow(Tier::Owner));
        }
        let grant = self.grants.get(note.id, user_id).await?;
        Ok(evaluate(note, user_id, grant.map(|g| g.permission), capability))
    }
}
