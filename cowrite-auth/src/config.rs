/// Credential authority configuration.
///
/// The signing secret is owned by the authority instance; there is no
/// process-global key state, so tests construct isolated authorities
/// with their own secrets.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub token_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl AuthConfig {
    pub fn new(token_secret: impl Into<String>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            token_secret: token_secret.into(),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Read configuration from the environment. `JWT_SECRET` is
    /// required; TTLs default to 15 minutes for access tokens and
    /// 7 days for refresh tokens.
    pub fn from_env() -> Self {
        let token_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET is required");

        let access_ttl_secs = std::env::var("ACCESS_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15 * 60);

        let refresh_ttl_secs = std::env::var("REFRESH_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 60 * 60);

        Self {
            token_secret,
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }
}
