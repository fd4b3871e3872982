//! Account and project repositories.
//!
//! The pipeline treats stores as black boxes exposing lookup and persist
//! operations. Production deployments back these traits with a real
//! database; the in-memory implementations here serve development, tests,
//! and the built-in demo tenant. Stores keep hashed keys; the raw key
//! exists only in the caller's request.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::config::ModelMode;
use super::keys::verify_key;
use crate::error::Result;

/// A project: one set of database credentials under an account.
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    /// Project identifier.
    pub id:             String,
    /// Owning account identifier.
    pub account_id:     String,
    /// Display name.
    pub name:           String,
    /// Legacy plaintext key; empty for hash-only records.
    pub key:            String,
    /// SHA-256 hex of the project key.
    pub key_hash:       String,
    /// Relational database URL (encrypted at rest).
    pub relational_url: Option<String>,
    /// Document database URL (encrypted at rest).
    pub document_url:   Option<String>,
}

/// An account: billing/tenancy entity owning projects.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    /// Account identifier.
    pub id:         String,
    /// Display name.
    pub name:       String,
    /// SHA-256 hex of the account-level key, when one exists.
    pub key_hash:   Option<String>,
    /// Model billing mode.
    pub model_mode: ModelMode,
    /// Account-supplied model key for `byo` mode.
    pub model_key:  Option<String>,
}

/// Lookup/persist operations over project records.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Find a project by its key: direct match first, then hashed
    /// constant-time match.
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn get_by_key(&self, key: &str) -> Result<Option<ProjectRecord>>;

    /// Find a project by id.
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn get_by_id(&self, id: &str) -> Result<Option<ProjectRecord>>;

    /// Insert or replace a project record (idempotent on id).
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn persist(&self, record: ProjectRecord) -> Result<()>;
}

/// Lookup/persist operations over account records.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find an account by its key (hashed constant-time match).
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn get_by_key(&self, key: &str) -> Result<Option<AccountRecord>>;

    /// Find an account by id.
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn get_by_id(&self, id: &str) -> Result<Option<AccountRecord>>;

    /// Insert or replace an account record (idempotent on id).
    ///
    /// # Errors
    ///
    /// Returns `Repository` when the store is unavailable.
    async fn persist(&self, record: AccountRecord) -> Result<()>;
}

/// In-memory project store.
#[derive(Default)]
pub struct InMemoryProjectStore {
    records: RwLock<Vec<ProjectRecord>>,
}

impl InMemoryProjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectStore {
    async fn get_by_key(&self, key: &str) -> Result<Option<ProjectRecord>> {
        let records = self.records.read().await;
        // Direct match covers records seeded with plaintext keys.
        if let Some(found) = records.iter().find(|p| !p.key.is_empty() && p.key == key) {
            return Ok(Some(found.clone()));
        }
        Ok(records.iter().find(|p| verify_key(key, &p.key_hash)).cloned())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|p| p.id == id).cloned())
    }

    async fn persist(&self, record: ProjectRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|p| p.id != record.id);
        records.push(record);
        Ok(())
    }
}

/// In-memory account store.
#[derive(Default)]
pub struct InMemoryAccountStore {
    records: RwLock<Vec<AccountRecord>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountStore {
    async fn get_by_key(&self, key: &str) -> Result<Option<AccountRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|a| a.key_hash.as_deref().is_some_and(|h| verify_key(key, h)))
            .cloned())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AccountRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|a| a.id == id).cloned())
    }

    async fn persist(&self, record: AccountRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|a| a.id != record.id);
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::keys::{generate_key, hash_key, KEY_PREFIX};
    use super::*;

    fn project(id: &str, key: &str) -> ProjectRecord {
        ProjectRecord {
            id:             id.to_string(),
            account_id:     "acct-1".to_string(),
            name:           "Test Project".to_string(),
            key:            String::new(),
            key_hash:       hash_key(key),
            relational_url: Some("postgresql://localhost/app".to_string()),
            document_url:   None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_hashed_key() {
        let store = InMemoryProjectStore::new();
        let key = generate_key(KEY_PREFIX);
        store.persist(project("p-1", &key)).await.unwrap();

        let found = store.get_by_key(&key).await.unwrap();
        assert_eq!(found.unwrap().id, "p-1");
        assert!(store.get_by_key("braidql_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_direct_key_match_for_legacy_records() {
        let store = InMemoryProjectStore::new();
        let mut record = project("p-2", "unused");
        record.key = "braidql_legacy_plaintext".to_string();
        record.key_hash = String::new();
        store.persist(record).await.unwrap();

        let found = store.get_by_key("braidql_legacy_plaintext").await.unwrap();
        assert_eq!(found.unwrap().id, "p-2");
    }

    #[tokio::test]
    async fn test_persist_is_idempotent_on_id() {
        let store = InMemoryProjectStore::new();
        let key = generate_key(KEY_PREFIX);
        store.persist(project("p-3", &key)).await.unwrap();
        store.persist(project("p-3", &key)).await.unwrap();

        assert!(store.get_by_id("p-3").await.unwrap().is_some());
        assert_eq!(store.records.read().await.len(), 1);
    }
}
