//! Refresh-token records and their persistence contract.
//!
//! Refresh tokens are stateful by design: a token whose record is
//! absent from this store is invalid no matter how well-formed the
//! value is. Records are keyed by the SHA-256 hash of the token value,
//! so the raw credential never rests in storage.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cowrite_core::StoreResult;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Persistence collaborator for refresh-token records.
///
/// `remove` returns the removed record and is the single atomic gate
/// for rotation: whichever caller removes the record first wins, so a
/// token can never be valid for rotation twice.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> StoreResult<()>;

    async fn remove(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>>;

    async fn get(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>>;
}

/// In-memory refresh-token store.
pub struct MemoryRefreshTokenStore {
    records: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRefreshTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> StoreResult<()> {
        let mut records = self.records.write().unwrap();
        records.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn remove(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        let mut records = self.records.write().unwrap();
        Ok(records.remove(token_hash))
    }

    async fn get(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(token_hash).cloned())
    }
}
