//! Project-key to account resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use super::config::{AccountConfig, ModelMode};
use super::keys::hash_key;
use super::repository::{
    AccountRecord, AccountRepository, ProjectRecord, ProjectRepository,
};
use crate::error::{BraidQLError, Result};

/// Reserved key resolving to the built-in demo tenant.
pub const DEMO_PROJECT_KEY: &str = "braidql_demo_project_key";

/// Demo account identifiers.
const DEMO_ACCOUNT_ID: &str = "demo";
const DEMO_PROJECT_ID: &str = "demo-project";

/// Configuration for the built-in demo tenant.
#[derive(Debug, Clone, Default)]
pub struct DemoSettings {
    /// Whether the demo tenant is available at all.
    pub enabled:        bool,
    /// Relational URL for the demo databases.
    pub relational_url: Option<String>,
    /// Document URL for the demo databases.
    pub document_url:   Option<String>,
}

/// Maps opaque project keys to [`AccountConfig`]s.
///
/// Requests without a key fall back to the demo tenant; the demo records
/// are (re-)created idempotently on first use so a wiped store heals
/// itself.
pub struct AccountResolver {
    projects: Arc<dyn ProjectRepository>,
    accounts: Arc<dyn AccountRepository>,
    demo:     DemoSettings,
}

impl AccountResolver {
    /// Create a resolver over the given repositories.
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        accounts: Arc<dyn AccountRepository>,
        demo: DemoSettings,
    ) -> Self {
        Self {
            projects,
            accounts,
            demo,
        }
    }

    /// Resolve a request's project key to an account configuration.
    ///
    /// `None` selects the demo tenant.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when the key does not resolve, and
    /// `Repository` when the store itself is down.
    pub async fn resolve(&self, key: Option<&str>) -> Result<AccountConfig> {
        let key = key.unwrap_or(DEMO_PROJECT_KEY);

        if key == DEMO_PROJECT_KEY {
            self.ensure_demo_account().await?;
        }

        let project = self
            .projects
            .get_by_key(key)
            .await?
            .ok_or_else(|| {
                BraidQLError::unauthenticated(
                    "Invalid project key. Create a project in your dashboard to get an API key.",
                )
            })?;

        // The parent account carries the model configuration; a missing
        // parent degrades to platform mode.
        let parent = self.accounts.get_by_id(&project.account_id).await?;
        if parent.is_none() {
            warn!(
                account_id = %project.account_id,
                project_id = %project.id,
                "project has no parent account; defaulting to platform model mode"
            );
        }

        let config = AccountConfig {
            id:             project.account_id.clone(),
            name:           format!(
                "{} - {}",
                parent.as_ref().map_or("Unknown", |a| a.name.as_str()),
                project.name
            ),
            key:            key.to_string(),
            relational_url: project.relational_url,
            document_url:   project.document_url,
            model_mode:     parent.as_ref().map_or(ModelMode::Platform, |a| a.model_mode),
            model_key:      parent.and_then(|a| a.model_key),
        };
        config.validate()?;
        Ok(config)
    }

    /// Make sure the demo account and project exist (idempotent).
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when the demo tenant is disabled or
    /// cannot be created.
    async fn ensure_demo_account(&self) -> Result<()> {
        if !self.demo.enabled {
            return Err(BraidQLError::unauthenticated("Demo account is disabled"));
        }
        if self.projects.get_by_id(DEMO_PROJECT_ID).await?.is_some() {
            return Ok(());
        }

        debug!("seeding demo account and project");
        self.accounts
            .persist(AccountRecord {
                id:         DEMO_ACCOUNT_ID.to_string(),
                name:       "Demo".to_string(),
                key_hash:   None,
                model_mode: ModelMode::Platform,
                model_key:  None,
            })
            .await
            .map_err(|e| {
                BraidQLError::unauthenticated(format!("Demo account unavailable: {e}"))
            })?;
        self.projects
            .persist(ProjectRecord {
                id:             DEMO_PROJECT_ID.to_string(),
                account_id:     DEMO_ACCOUNT_ID.to_string(),
                name:           "Demo Project".to_string(),
                key:            String::new(),
                key_hash:       hash_key(DEMO_PROJECT_KEY),
                relational_url: self.demo.relational_url.clone(),
                document_url:   self.demo.document_url.clone(),
            })
            .await
            .map_err(|e| {
                BraidQLError::unauthenticated(format!("Demo account unavailable: {e}"))
            })?;
        Ok(())
    }
}
