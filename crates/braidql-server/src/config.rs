//! Environment-driven server configuration.
//!
//! Every knob is a `BRAIDQL_*` variable with a development-friendly
//! default where one is safe; startup fails fast on anything required but
//! missing.

use std::env;

use braidql_core::error::{BraidQLError, Result};

/// Process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Platform model API key; accounts in platform mode use this.
    pub model_key: Option<String>,

    /// Preferred model name.
    pub model: String,

    /// Fallback model name; empty disables fallback.
    pub model_fallback: String,

    /// Secret the URL cipher derives its key from.
    pub encryption_key: String,

    /// Whether the demo tenant is available.
    pub demo_enabled: bool,

    /// Relational URL for the demo tenant.
    pub demo_relational_url: Option<String>,

    /// Document URL for the demo tenant.
    pub demo_document_url: Option<String>,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let port = match env::var("BRAIDQL_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                BraidQLError::config(format!("BRAIDQL_PORT is not a valid port: '{raw}'"))
            })?,
            Err(_) => 8000,
        };

        let config = Self {
            host: env_or("BRAIDQL_HOST", "0.0.0.0"),
            port,
            model_key: env::var("BRAIDQL_MODEL_KEY").ok().filter(|v| !v.is_empty()),
            model: env_or("BRAIDQL_MODEL", "gemini-2.0-flash"),
            model_fallback: env_or("BRAIDQL_MODEL_FALLBACK", "gemini-2.0-flash-lite"),
            encryption_key: env::var("BRAIDQL_ENCRYPTION_KEY").map_err(|_| {
                BraidQLError::config("BRAIDQL_ENCRYPTION_KEY must be set")
            })?,
            demo_enabled: env_or("BRAIDQL_DEMO_ENABLED", "true") == "true",
            demo_relational_url: env::var("BRAIDQL_DEMO_POSTGRES_URL").ok().filter(|v| !v.is_empty()),
            demo_document_url: env::var("BRAIDQL_DEMO_MONGODB_URL").ok().filter(|v| !v.is_empty()),
            log_filter: env_or("BRAIDQL_LOG", "braidql=info,braidql_server=info"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Ordered model chain for the synthesizer and validator.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        let mut models = vec![self.model.clone()];
        if !self.model_fallback.is_empty() {
            models.push(self.model_fallback.clone());
        }
        models
    }

    fn validate(&self) -> Result<()> {
        if self.encryption_key.trim().is_empty() {
            return Err(BraidQLError::config("BRAIDQL_ENCRYPTION_KEY must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(BraidQLError::config("BRAIDQL_MODEL must not be empty"));
        }
        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
