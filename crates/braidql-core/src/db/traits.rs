//! Database adapter trait definitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{DatabaseSchema, DatabaseType, JsonRow};
use crate::error::Result;
use crate::plan::DatabaseQuery;

/// Default cap on rows/documents returned by a single sub-query.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Pool sizing and timeout configuration shared by both adapters.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Minimum pooled connections (advisory; not every pool enforces a floor).
    pub min_conns:       usize,
    /// Maximum pooled connections.
    pub max_conns:       usize,
    /// Per-statement execution deadline.
    pub command_timeout: Duration,
    /// Deadline for establishing a new connection.
    pub connect_timeout: Duration,
    /// Close idle connections after this long.
    pub idle_close:      Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_conns:       1,
            max_conns:       10,
            command_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            idle_close:      Duration::from_secs(45),
        }
    }
}

/// Database adapter for executing planned sub-queries.
///
/// Abstracts over the relational and document engines so the factory and
/// executor operate on `Arc<dyn DatabaseAdapter>`. Implementations own
/// their connection pool exclusively and memoize their introspected schema
/// for the adapter's lifetime.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Execute one sub-query, capping the result at `max_rows`.
    ///
    /// Dispatches on `query.kind`; an adapter handed a kind it does not
    /// serve fails with `UnsupportedQuery`.
    ///
    /// # Errors
    ///
    /// Returns `Database`/`ConnectionPool` on driver failures,
    /// `MissingCollection`/`InvalidCollectionName` for malformed document
    /// queries, and `Timeout` when the command deadline is exceeded.
    async fn execute(&self, query: &DatabaseQuery, max_rows: usize) -> Result<Vec<JsonRow>>;

    /// Introspect the database schema.
    ///
    /// The first call hits the catalog (or samples collections); every
    /// subsequent call returns the memoized value for this adapter
    /// instance. Rebuilding the pool does not invalidate the cache.
    ///
    /// # Errors
    ///
    /// Returns `SchemaIntrospection` when the catalog itself is
    /// unreadable; individual table/collection failures degrade to empty
    /// descriptors instead of erroring.
    async fn introspect_schema(&self) -> Result<DatabaseSchema>;

    /// Close the pool. Bounded; never hangs.
    async fn disconnect(&self);

    /// Ping with a bounded timeout; implementations may retry.
    async fn health_check(&self) -> bool;

    /// Which engine this adapter fronts (for logging/metrics).
    fn database_type(&self) -> DatabaseType;
}

impl std::fmt::Debug for dyn DatabaseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseAdapter")
            .field("database_type", &self.database_type())
            .finish()
    }
}

/// Capability for constructing connected adapters.
///
/// The factory is generic over this seam: the production implementation
/// builds real pools, tests substitute scripted adapters.
#[async_trait]
pub trait AdapterBuilder: Send + Sync {
    /// Build and connect a relational adapter for a plaintext URL.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionPool` when no connection can be established
    /// within the connect timeout.
    async fn build_relational(&self, url: &str) -> Result<Arc<dyn DatabaseAdapter>>;

    /// Build and connect a document adapter for a plaintext URL.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionPool` on client construction failure; an
    /// unreachable server is logged and tolerated until first use.
    async fn build_document(&self, url: &str) -> Result<Arc<dyn DatabaseAdapter>>;
}
