//! Account operations behind the `/auth` surface: register, login,
//! refresh, logout. Transport glue (HTTP routing, cookies) lives
//! outside this crate; the semantics live here.

use std::sync::Arc;

use cowrite_core::{Role, StoreError, User, UserStore};
use uuid::Uuid;

use crate::authority::{CredentialAuthority, TokenPair};
use crate::error::AuthError;
use crate::password::{hash_password, verify_password};

const MIN_PASSWORD_LEN: usize = 6;

/// Result of a successful register/login/refresh: the account plus a
/// fresh token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    authority: Arc<CredentialAuthority>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, authority: Arc<CredentialAuthority>) -> Self {
        Self { users, authority }
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<Session, AuthError> {
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "email, password and name are required".into(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let user = User::new(
            name,
            email.to_lowercase(),
            role.unwrap_or_default(),
            hash_password(password)?,
        );

        self.users.insert(user.clone()).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;

        let tokens = self.authority.issue(user.id).await?;
        Ok(Session { user, tokens })
    }

    /// Uniform failure for unknown email and wrong password: callers
    /// cannot probe which of the two was wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = self
            .users
            .find_by_email(&email.to_lowercase())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.authority.issue(user.id).await?;
        Ok(Session { user, tokens })
    }

    /// Rotate the refresh token and re-resolve the account.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let (user_id, tokens) = self.authority.rotate(refresh_token).await?;
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(Session { user, tokens })
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.authority.revoke(refresh_token).await
    }

    /// Resolve an access token to its account, the way protected
    /// request/response endpoints do.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let user_id: Uuid = self.authority.verify_access(access_token)?;
        self.users
            .get(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)
    }
}
