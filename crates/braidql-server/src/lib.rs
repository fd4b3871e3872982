//! # BraidQL Server
//!
//! Thin HTTP shell over `braidql-core`: three endpoints, env-driven
//! configuration, tracing bootstrap, and process lifecycle. All query
//! behavior lives in the core crate.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/query` — natural-language query execution
//! - `GET /api/v1/schema` — introspected schemas for the tenant
//! - `GET /health` — liveness
//!
//! Tenants authenticate with the `X-Project-Key` header; a missing key
//! selects the built-in demo tenant.

pub mod config;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use state::AppContext;
