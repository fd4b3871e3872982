//! Error types for `BraidQL` core.
//!
//! One taxonomy for the whole pipeline: transport-shaped errors are
//! retryable, semantic errors are not, and every kind carries enough
//! context for the HTTP layer to map it to a status code.
//!
//! # Error Hierarchy
//!
//! ```text
//! BraidQLError
//! ├── InvalidIntent          - Intent empty or matches the injection blacklist
//! ├── Unauthenticated        - Project key unresolved
//! ├── NoAdapters             - Every database init failed for an account
//! ├── UnknownDatabase        - Plan names a database the account lacks
//! ├── SchemaIntrospection    - Catalog/sampling failure
//! ├── ConnectionLost         - Pool dropped mid-operation
//! ├── ConnectionPool         - Pool creation/acquire errors
//! ├── Database               - Driver-level query errors
//! ├── Timeout                - Deadline exceeded on an external call
//! ├── ModelTransport         - Connection/timeout/overload from the model API
//! ├── InvalidJson            - Model output not coercible to JSON
//! ├── InvalidPlan            - JSON parsed but not a usable plan
//! ├── QueryValidation        - Validator flagged a sub-query unsafe
//! ├── MissingCollection      - Document sub-query without a collection
//! ├── UnsupportedQuery       - Query kind the target adapter cannot run
//! ├── InvalidCollectionName  - Collection fails the allow-list
//! ├── Configuration          - Bad account/server configuration
//! ├── Repository             - Account/project store unavailable
//! └── Internal               - Unexpected internal errors
//! ```

use thiserror::Error;

/// Result type alias for `BraidQL` operations.
pub type Result<T> = std::result::Result<T, BraidQLError>;

/// Transport failure categories for model API calls.
///
/// Only these categories are eligible for retry; anything else from the
/// model is either a semantic failure or a caller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Connection refused / reset / DNS failure.
    Connection,
    /// Deadline exceeded while waiting on the remote.
    Timeout,
    /// Lower-level I/O failure mid-exchange.
    Io,
    /// Remote reported overload (429/503 or an overload body).
    Overloaded,
    /// Any other non-success HTTP status.
    Status,
}

/// Main error type for `BraidQL` operations.
#[derive(Error, Debug)]
pub enum BraidQLError {
    // ========================================================================
    // Request errors
    // ========================================================================
    /// Intent rejected before any model call.
    #[error("Invalid intent: {message}")]
    InvalidIntent {
        /// Why the intent was rejected.
        message: String,
    },

    /// Project key did not resolve to an account.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Lookup failure description.
        message: String,
    },

    // ========================================================================
    // Database errors
    // ========================================================================
    /// No database adapter could be created for the account.
    #[error("No database adapters available for account '{account_id}': {details}")]
    NoAdapters {
        /// Account whose databases all failed to initialize.
        account_id: String,
        /// Collected per-database failure summary.
        details:    String,
    },

    /// Plan referenced a database the account has no adapter for.
    #[error("No adapter found for database '{name}'")]
    UnknownDatabase {
        /// Database key the plan asked for.
        name: String,
    },

    /// Schema introspection failed beyond the tolerated per-table level.
    #[error("Schema introspection failed: {message}")]
    SchemaIntrospection {
        /// Introspection failure description.
        message: String,
    },

    /// The pool reported a dropped connection mid-operation.
    #[error("Connection lost: {message}")]
    ConnectionLost {
        /// Driver message.
        message: String,
    },

    /// Connection pool creation or acquisition error.
    #[error("Connection pool error: {message}")]
    ConnectionPool {
        /// Pool error description.
        message: String,
    },

    /// Database operation error.
    #[error("Database error: {message}")]
    Database {
        /// Error message from the driver.
        message:   String,
        /// SQL state code if available (e.g., "57P01" for admin shutdown).
        sql_state: Option<String>,
    },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What was being waited on.
        operation:  String,
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    // ========================================================================
    // Model errors
    // ========================================================================
    /// Transport-level failure talking to the model API.
    #[error("Model transport error ({kind:?}): {message}")]
    ModelTransport {
        /// Error description.
        message: String,
        /// Transport category; drives retry eligibility.
        kind:    TransportKind,
    },

    /// Model output could not be coerced into JSON.
    #[error("Invalid JSON in model response: {message}")]
    InvalidJson {
        /// Parse failure with a bounded excerpt of the response.
        message: String,
    },

    /// Model output parsed but is not a usable query plan.
    #[error("Invalid query plan: {message}")]
    InvalidPlan {
        /// Structural failure description.
        message: String,
    },

    /// The safety validator flagged a sub-query.
    #[error("Unsafe query detected: {issues:?}")]
    QueryValidation {
        /// Issues reported by the validator.
        issues:   Vec<String>,
        /// Reported severity ("low", "medium", "high").
        severity: String,
    },

    // ========================================================================
    // Plan shape errors
    // ========================================================================
    /// Document sub-query without a collection name.
    #[error("Collection name required for document query on database '{database}'")]
    MissingCollection {
        /// Database key of the offending sub-query.
        database: String,
    },

    /// Query kind the target adapter does not serve.
    #[error("Unsupported query kind: {message}")]
    UnsupportedQuery {
        /// What was attempted and where.
        message: String,
    },

    /// Collection name failed the allow-list.
    #[error(
        "Invalid collection name: '{name}'. Collection names must start with a letter or \
         underscore and contain only alphanumeric characters and underscores."
    )]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
    },

    // ========================================================================
    // Environment errors
    // ========================================================================
    /// Configuration error (account or process level).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// The account/project repository is unavailable.
    #[error("Repository unavailable: {message}")]
    Repository {
        /// Store failure description.
        message: String,
    },

    /// Unexpected internal error. Should be rare.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional source error for debugging.
        #[source]
        source:  Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BraidQLError {
    // ========================================================================
    // Constructor helpers
    // ========================================================================

    /// Create an invalid-intent error.
    #[must_use]
    pub fn invalid_intent(message: impl Into<String>) -> Self {
        Self::InvalidIntent {
            message: message.into(),
        }
    }

    /// Create an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create a database error without a SQL state.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message:   message.into(),
            sql_state: None,
        }
    }

    /// Create a connection pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::ConnectionPool {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a model transport error.
    #[must_use]
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        Self::ModelTransport {
            message: message.into(),
            kind,
        }
    }

    /// Create an invalid-plan error.
    #[must_use]
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source:  None,
        }
    }

    // ========================================================================
    // Error classification
    // ========================================================================

    /// Check if this is a client error (4xx equivalent).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIntent { .. }
                | Self::Unauthenticated { .. }
                | Self::UnknownDatabase { .. }
                | Self::QueryValidation { .. }
                | Self::MissingCollection { .. }
                | Self::UnsupportedQuery { .. }
                | Self::InvalidCollectionName { .. }
        )
    }

    /// Check if this is a server error (5xx equivalent).
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Check if this is a retryable model-transport error.
    ///
    /// Connection, timeout, I/O, and remote-overload failures retry;
    /// everything else (including non-overload HTTP statuses) does not —
    /// semantic failures must surface immediately.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ModelTransport {
                kind: TransportKind::Connection
                    | TransportKind::Timeout
                    | TransportKind::Io
                    | TransportKind::Overloaded,
                ..
            }
        )
    }

    /// Check if this error indicates a dropped database connection.
    ///
    /// Drives the one-shot pool rebuild during introspection.
    #[must_use]
    pub const fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. } | Self::ConnectionPool { .. })
    }

    /// Get HTTP status code equivalent.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIntent { .. } | Self::QueryValidation { .. } => 422,
            Self::Unauthenticated { .. } => 401,
            Self::UnknownDatabase { .. }
            | Self::MissingCollection { .. }
            | Self::UnsupportedQuery { .. }
            | Self::InvalidCollectionName { .. } => 400,
            Self::NoAdapters { .. } | Self::Repository { .. } => 503,
            Self::ModelTransport { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::SchemaIntrospection { .. }
            | Self::ConnectionLost { .. }
            | Self::ConnectionPool { .. }
            | Self::Database { .. }
            | Self::InvalidJson { .. }
            | Self::InvalidPlan { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// Get a stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIntent { .. } => "INVALID_INTENT",
            Self::Unauthenticated { .. } => "UNAUTHENTICATED",
            Self::NoAdapters { .. } => "NO_ADAPTERS",
            Self::UnknownDatabase { .. } => "UNKNOWN_DATABASE",
            Self::SchemaIntrospection { .. } => "SCHEMA_INTROSPECTION_ERROR",
            Self::ConnectionLost { .. } => "CONNECTION_LOST",
            Self::ConnectionPool { .. } => "CONNECTION_POOL_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ModelTransport { .. } => "MODEL_TRANSPORT_ERROR",
            Self::InvalidJson { .. } => "INVALID_JSON",
            Self::InvalidPlan { .. } => "INVALID_PLAN",
            Self::QueryValidation { .. } => "QUERY_VALIDATION_FAILED",
            Self::MissingCollection { .. } => "MISSING_COLLECTION",
            Self::UnsupportedQuery { .. } => "UNSUPPORTED_QUERY",
            Self::InvalidCollectionName { .. } => "INVALID_COLLECTION_NAME",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Repository { .. } => "REPOSITORY_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for BraidQLError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: format!("{e} (line {}, column {})", e.line(), e.column()),
        }
    }
}

impl From<std::io::Error> for BraidQLError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {e}"),
            source:  Some(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_server_split() {
        let err = BraidQLError::invalid_intent("blacklisted");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.status_code(), 422);

        let err = BraidQLError::database("connection refused");
        assert!(err.is_server_error());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_transport_classification() {
        assert!(BraidQLError::transport(TransportKind::Overloaded, "503").is_transport());
        assert!(BraidQLError::transport(TransportKind::Timeout, "deadline").is_transport());
        // A plain bad status is not retryable.
        assert!(!BraidQLError::transport(TransportKind::Status, "400").is_transport());
        // Semantic failures are never transports.
        assert!(!BraidQLError::invalid_plan("top level is not an object").is_transport());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BraidQLError::unauthenticated("no key").status_code(), 401);
        assert_eq!(
            BraidQLError::NoAdapters {
                account_id: "acct-1".to_string(),
                details:    "postgres: refused".to_string(),
            }
            .status_code(),
            503
        );
        assert_eq!(
            BraidQLError::MissingCollection {
                database: "mongodb".to_string(),
            }
            .status_code(),
            400
        );
        assert_eq!(BraidQLError::transport(TransportKind::Connection, "x").status_code(), 502);
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BraidQLError = json_err.into();
        assert!(matches!(err, BraidQLError::InvalidJson { .. }));
    }

    #[test]
    fn test_connection_loss_detection() {
        assert!(BraidQLError::pool("acquire failed").is_connection_loss());
        assert!(
            BraidQLError::ConnectionLost {
                message: "terminated".to_string(),
            }
            .is_connection_loss()
        );
        assert!(!BraidQLError::database("syntax error").is_connection_loss());
    }
}
