//! Accounts, project keys, and tenant resolution.
//!
//! An account is the tenancy unit: it owns database connection URLs
//! (encrypted at rest) and model-API credentials. Requests carry an opaque
//! project key; the resolver maps it through the repositories to an
//! [`AccountConfig`] the rest of the pipeline treats as read-only.

mod config;
mod encryption;
mod keys;
mod repository;
mod resolver;

pub use config::{AccountConfig, ModelMode};
pub use encryption::{mask_url, UrlCipher};
pub use keys::{generate_key, hash_key, verify_key, KEY_PREFIX};
pub use repository::{
    AccountRecord, AccountRepository, InMemoryAccountStore, InMemoryProjectStore, ProjectRecord,
    ProjectRepository,
};
pub use resolver::{AccountResolver, DemoSettings, DEMO_PROJECT_KEY};
