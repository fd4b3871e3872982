//! Per-account configuration.

use serde::{Deserialize, Serialize};

use crate::error::{BraidQLError, Result};

/// How an account pays for model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    /// Use the platform's model key.
    #[default]
    Platform,
    /// Bring-your-own key stored on the account.
    Byo,
}

/// Per-account configuration for databases and model usage.
///
/// Created by the resolver layer; never mutated by the pipeline. Database
/// URLs are opaque ciphertext until the adapter factory decrypts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account identifier.
    pub id: String,

    /// Display name ("account - project").
    pub name: String,

    /// The project key this config was resolved from.
    pub key: String,

    /// Relational database URL (encrypted at rest).
    #[serde(default)]
    pub relational_url: Option<String>,

    /// Document database URL (encrypted at rest).
    #[serde(default)]
    pub document_url: Option<String>,

    /// Model billing mode.
    #[serde(default)]
    pub model_mode: ModelMode,

    /// Account-supplied model key; required when `model_mode` is `byo`.
    #[serde(default)]
    pub model_key: Option<String>,
}

impl AccountConfig {
    /// Check the config's internal invariants.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when `model_mode` is `byo` but no model key
    /// is present.
    pub fn validate(&self) -> Result<()> {
        if self.model_mode == ModelMode::Byo
            && self.model_key.as_deref().unwrap_or_default().is_empty()
        {
            return Err(BraidQLError::config(format!(
                "Account '{}' is configured for BYO model usage but no model key is set",
                self.id
            )));
        }
        Ok(())
    }
}
