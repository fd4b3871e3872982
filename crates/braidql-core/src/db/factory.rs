//! Per-account adapter factory.
//!
//! Adapters are created lazily on an account's first request and cached
//! for the process lifetime. Initialization is single-flight per account:
//! concurrent requests for a cold account await one initialization future
//! and share its result. One unreachable database does not fail the other
//! — the account runs degraded until shutdown or recovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::traits::{AdapterBuilder, DatabaseAdapter, PoolSettings};
use super::types::DatabaseSchema;
use crate::account::{AccountConfig, UrlCipher};
use crate::error::{BraidQLError, Result};

/// Per-adapter disconnect deadline during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// The adapter map for one account, keyed by the fixed names
/// `"postgres"` and `"mongodb"`.
pub type AccountAdapters = Arc<HashMap<String, Arc<dyn DatabaseAdapter>>>;

/// Production [`AdapterBuilder`] creating real pools.
pub struct LiveAdapterBuilder {
    settings: PoolSettings,
}

impl LiveAdapterBuilder {
    /// Builder with the given pool settings.
    #[must_use]
    pub const fn new(settings: PoolSettings) -> Self {
        Self { settings }
    }
}

impl Default for LiveAdapterBuilder {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

#[async_trait::async_trait]
impl AdapterBuilder for LiveAdapterBuilder {
    async fn build_relational(&self, url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        let adapter = super::postgres::PostgresAdapter::connect(url, self.settings.clone()).await?;
        Ok(Arc::new(adapter))
    }

    async fn build_document(&self, url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        let adapter = super::mongodb::MongoAdapter::connect(url, self.settings.clone()).await?;
        Ok(Arc::new(adapter))
    }
}

/// Factory owning every adapter (and therefore every pool) in the process.
pub struct AdapterFactory {
    builder:  Arc<dyn AdapterBuilder>,
    cipher:   Arc<UrlCipher>,
    accounts: DashMap<String, Arc<OnceCell<AccountAdapters>>>,
}

impl AdapterFactory {
    /// Create a factory over the given builder and URL cipher.
    pub fn new(builder: Arc<dyn AdapterBuilder>, cipher: Arc<UrlCipher>) -> Self {
        Self {
            builder,
            cipher,
            accounts: DashMap::new(),
        }
    }

    /// Get (and lazily initialize) the adapters for an account.
    ///
    /// # Errors
    ///
    /// Returns `NoAdapters` when every configured database failed to
    /// initialize. Partial failure returns the working subset.
    pub async fn get_adapters(&self, account: &AccountConfig) -> Result<AccountAdapters> {
        let cell = self
            .accounts
            .entry(account.id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // OnceCell serializes concurrent initializers for the same cold
        // account; a failed attempt leaves the cell empty so the next
        // request can try again.
        cell.get_or_try_init(|| self.create_for_account(account)).await.cloned()
    }

    /// Get one adapter by its fixed database key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDatabase` when the account has no adapter under
    /// `name` — including databases that failed to initialize.
    pub async fn get(&self, account: &AccountConfig, name: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        let adapters = self.get_adapters(account).await?;
        adapters.get(name).cloned().ok_or_else(|| BraidQLError::UnknownDatabase {
            name: name.to_string(),
        })
    }

    /// Introspect every reachable database for an account.
    ///
    /// Cheap after the first call: schemas are memoized inside each
    /// adapter.
    ///
    /// # Errors
    ///
    /// Propagates `NoAdapters` and unrecoverable introspection failures.
    pub async fn get_all_schemas(
        &self,
        account: &AccountConfig,
    ) -> Result<HashMap<String, DatabaseSchema>> {
        let adapters = self.get_adapters(account).await?;
        let mut schemas = HashMap::with_capacity(adapters.len());
        for (name, adapter) in adapters.iter() {
            schemas.insert(name.clone(), adapter.introspect_schema().await?);
        }
        Ok(schemas)
    }

    /// Disconnect every adapter for every account, in parallel, each with
    /// a bounded deadline. Failures are logged and skipped.
    pub async fn shutdown(&self) {
        let mut tasks = JoinSet::new();
        for entry in self.accounts.iter() {
            let Some(adapters) = entry.value().get() else {
                continue;
            };
            for (name, adapter) in adapters.iter() {
                let name = name.clone();
                let account_id = entry.key().clone();
                let adapter = Arc::clone(adapter);
                tasks.spawn(async move {
                    if tokio::time::timeout(SHUTDOWN_TIMEOUT, adapter.disconnect()).await.is_err() {
                        warn!(%account_id, database = %name, "adapter disconnect timed out");
                    }
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "adapter disconnect task failed");
            }
        }
        self.accounts.clear();
    }

    async fn create_for_account(&self, account: &AccountConfig) -> Result<AccountAdapters> {
        let mut adapters: HashMap<String, Arc<dyn DatabaseAdapter>> = HashMap::new();
        let mut errors: Vec<(String, String)> = Vec::new();

        if let Some(stored) = account.relational_url.as_deref() {
            info!(account_id = %account.id, "initializing postgres adapter");
            match self.build_one(stored, true).await {
                Ok(adapter) => {
                    adapters.insert("postgres".to_string(), adapter);
                },
                Err(e) => {
                    error!(account_id = %account.id, error = %e, "postgres adapter failed");
                    errors.push(("postgres".to_string(), e.to_string()));
                },
            }
        }

        if let Some(stored) = account.document_url.as_deref() {
            info!(account_id = %account.id, "initializing mongodb adapter");
            match self.build_one(stored, false).await {
                Ok(adapter) => {
                    adapters.insert("mongodb".to_string(), adapter);
                },
                Err(e) => {
                    error!(account_id = %account.id, error = %e, "mongodb adapter failed");
                    errors.push(("mongodb".to_string(), e.to_string()));
                },
            }
        }

        if adapters.is_empty() {
            let details = if errors.is_empty() {
                "no databases configured".to_string()
            } else {
                errors
                    .iter()
                    .map(|(db, msg)| format!("{db}: {msg}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(BraidQLError::NoAdapters {
                account_id: account.id.clone(),
                details,
            });
        }

        if !errors.is_empty() {
            warn!(
                account_id = %account.id,
                failed = ?errors.iter().map(|(db, _)| db.as_str()).collect::<Vec<_>>(),
                available = ?adapters.keys().collect::<Vec<_>>(),
                "account has partial database connectivity"
            );
        } else {
            debug!(account_id = %account.id, count = adapters.len(), "adapters ready");
        }

        Ok(Arc::new(adapters))
    }

    async fn build_one(&self, stored_url: &str, relational: bool) -> Result<Arc<dyn DatabaseAdapter>> {
        let url = self.cipher.decrypt(stored_url)?;
        if relational {
            self.builder.build_relational(&url).await
        } else {
            self.builder.build_document(&url).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::account::ModelMode;
    use crate::db::types::{DatabaseType, JsonRow};
    use crate::plan::DatabaseQuery;

    struct StubAdapter(DatabaseType);

    #[async_trait]
    impl DatabaseAdapter for StubAdapter {
        async fn execute(&self, _query: &DatabaseQuery, _max_rows: usize) -> Result<Vec<JsonRow>> {
            Ok(vec![])
        }

        async fn introspect_schema(&self) -> Result<DatabaseSchema> {
            Ok(DatabaseSchema::Document {
                name:        "stub".to_string(),
                collections: std::collections::BTreeMap::new(),
            })
        }

        async fn disconnect(&self) {}

        async fn health_check(&self) -> bool {
            true
        }

        fn database_type(&self) -> DatabaseType {
            self.0
        }
    }

    /// Builder scripted per database kind; counts invocations.
    struct StubBuilder {
        relational_ok: bool,
        document_ok:   bool,
        builds:        AtomicU32,
        delay:         Duration,
    }

    impl StubBuilder {
        fn new(relational_ok: bool, document_ok: bool) -> Self {
            Self {
                relational_ok,
                document_ok,
                builds: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl AdapterBuilder for StubBuilder {
        async fn build_relational(&self, _url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.relational_ok {
                Ok(Arc::new(StubAdapter(DatabaseType::PostgreSQL)))
            } else {
                Err(BraidQLError::pool("connection refused"))
            }
        }

        async fn build_document(&self, _url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.document_ok {
                Ok(Arc::new(StubAdapter(DatabaseType::MongoDB)))
            } else {
                Err(BraidQLError::pool("server selection timed out"))
            }
        }
    }

    fn account() -> AccountConfig {
        AccountConfig {
            id:             "acct-1".to_string(),
            name:           "Test".to_string(),
            key:            "braidql_key".to_string(),
            relational_url: Some("postgresql://localhost/app".to_string()),
            document_url:   Some("mongodb://localhost/app".to_string()),
            model_mode:     ModelMode::Platform,
            model_key:      None,
        }
    }

    fn factory(builder: StubBuilder) -> (AdapterFactory, Arc<StubBuilder>) {
        let builder = Arc::new(builder);
        let factory = AdapterFactory::new(
            Arc::clone(&builder) as Arc<dyn AdapterBuilder>,
            Arc::new(UrlCipher::new("test-secret")),
        );
        (factory, builder)
    }

    #[tokio::test]
    async fn test_both_adapters_created_and_cached() {
        let (factory, builder) = factory(StubBuilder::new(true, true));
        let account = account();

        let first = factory.get_adapters(&account).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.contains_key("postgres"));
        assert!(first.contains_key("mongodb"));

        let second = factory.get_adapters(&account).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_partial_connectivity_returns_working_subset() {
        let (factory, _) = factory(StubBuilder::new(true, false));
        let adapters = factory.get_adapters(&account()).await.unwrap();

        assert_eq!(adapters.len(), 1);
        assert!(adapters.contains_key("postgres"));

        // A query targeting the failed database fails fast.
        let err = factory.get(&account(), "mongodb").await.unwrap_err();
        assert!(matches!(err, BraidQLError::UnknownDatabase { .. }));
    }

    #[tokio::test]
    async fn test_all_failures_is_no_adapters() {
        let (factory, _) = factory(StubBuilder::new(false, false));
        let err = factory.get_adapters(&account()).await.unwrap_err();

        match err {
            BraidQLError::NoAdapters { account_id, details } => {
                assert_eq!(account_id, "acct-1");
                assert!(details.contains("postgres"));
                assert!(details.contains("mongodb"));
            },
            other => panic!("expected NoAdapters, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_init_is_retried_on_next_request() {
        let (factory, builder) = factory(StubBuilder::new(false, false));
        assert!(factory.get_adapters(&account()).await.is_err());
        assert!(factory.get_adapters(&account()).await.is_err());
        // Nothing was cached; both databases were attempted twice.
        assert_eq!(builder.builds.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cold_account_init_is_single_flight() {
        let mut stub = StubBuilder::new(true, true);
        stub.delay = Duration::from_millis(20);
        let (factory, builder) = factory(stub);
        let factory = Arc::new(factory);
        let account = account();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                let account = account.clone();
                tokio::spawn(async move { factory.get_adapters(&account).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        // One initialization for the whole stampede: two builds total.
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_clears_cache() {
        let (factory, _) = factory(StubBuilder::new(true, true));
        factory.get_adapters(&account()).await.unwrap();
        factory.shutdown().await;
        assert!(factory.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_schemas_keyed_by_database() {
        let (factory, _) = factory(StubBuilder::new(true, true));
        let schemas = factory.get_all_schemas(&account()).await.unwrap();
        assert_eq!(schemas.len(), 2);
        assert!(schemas.contains_key("postgres"));
        assert!(schemas.contains_key("mongodb"));
    }
}
