//! # BraidQL Core
//!
//! Query orchestration engine for BraidQL — natural-language intent in,
//! unified tabular results out, across a relational and a document store.
//!
//! ## Architecture
//!
//! Each tenant (account) owns its own database connections and model
//! credentials. A request flows through one pipeline:
//!
//! ```text
//!      Project key
//!          ↓
//!   Account Resolver
//!          ↓
//!    Adapter Factory ──── lazy, single-flight per account
//!     ↙          ↘
//! Postgres     MongoDB          (pooled, schema memoized)
//!     ↘          ↙
//!   Schema snapshot
//!          ↓
//!   Plan Synthesizer ──── model call + JSON extraction + fallback chain
//!          ↓
//!    Plan Validator  ──── optional safety review, fail-closed
//!          ↓
//!       Executor     ──── single dispatch or parallel fan-out
//!          ↓
//!     Field Masking
//!          ↓
//!      QueryResult
//! ```
//!
//! ### Key Components
//!
//! - **account**: tenancy, project keys, URL encryption, resolution
//! - **db**: adapters, factory, schema introspection
//! - **llm**: model transport, JSON extraction, synthesis, validation
//! - **exec**: executor, masking, the orchestration service
//! - **retry**: bounded exponential backoff for external calls
//! - **cache**: advisory TTL cache that never fails a caller
//!
//! ## Example
//!
//! ```ignore
//! use braidql_core::exec::QueryService;
//! use braidql_core::plan::{QueryRequest, SecurityContext};
//!
//! # async fn example(service: QueryService, account: braidql_core::account::AccountConfig)
//! # -> braidql_core::Result<()> {
//! let request = QueryRequest {
//!     intent: "Get all users in Lagos".to_string(),
//!     context: None,
//!     dry_run: false,
//!     skip_validation: false,
//! };
//! let ctx = SecurityContext::default();
//!
//! let result = service.execute(&request, &ctx, &account).await?;
//! println!("{} rows", result.metadata.rows_returned);
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod cache;
pub mod db;
pub mod error;
pub mod exec;
pub mod llm;
pub mod plan;
pub mod retry;

pub use error::{BraidQLError, Result, TransportKind};
pub use plan::{
    DatabaseQuery, QueryBody, QueryKind, QueryMetadata, QueryPlan, QueryRequest, QueryResult,
    SecurityContext,
};
