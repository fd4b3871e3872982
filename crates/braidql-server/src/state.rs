//! Process-wide context: every long-lived collaborator, constructed once
//! at bootstrap and torn down in reverse order on shutdown.

use std::sync::Arc;
use std::time::Duration;

use braidql_core::account::{
    AccountResolver, DemoSettings, InMemoryAccountStore, InMemoryProjectStore, UrlCipher,
};
use braidql_core::db::{AdapterFactory, LiveAdapterBuilder, PoolSettings};
use braidql_core::error::Result;
use braidql_core::exec::QueryService;
use braidql_core::llm::GeminiTransportFactory;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Deadline for warming the demo tenant's pools at startup.
const PREWARM_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything a request handler needs, behind one `Arc`.
pub struct AppContext {
    /// Loaded configuration.
    pub config:   ServerConfig,
    /// Key → account resolution.
    pub resolver: AccountResolver,
    /// The orchestration pipeline.
    pub service:  QueryService,
    /// Adapter ownership; used directly for the schema endpoint and
    /// shutdown.
    pub factory:  Arc<AdapterFactory>,
}

impl AppContext {
    /// Wire up the process context from configuration.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond configuration validation; kept fallible
    /// for persistent-store construction.
    pub fn build(config: ServerConfig) -> Result<Arc<Self>> {
        let cipher = Arc::new(UrlCipher::new(&config.encryption_key));
        let factory = Arc::new(AdapterFactory::new(
            Arc::new(LiveAdapterBuilder::new(PoolSettings::default())),
            cipher,
        ));

        let resolver = AccountResolver::new(
            Arc::new(InMemoryProjectStore::new()),
            Arc::new(InMemoryAccountStore::new()),
            DemoSettings {
                enabled:        config.demo_enabled,
                relational_url: config.demo_relational_url.clone(),
                document_url:   config.demo_document_url.clone(),
            },
        );

        let service = QueryService::new(
            Arc::clone(&factory),
            Arc::new(GeminiTransportFactory::new()),
            config.models(),
            config.model_key.clone(),
        );

        Ok(Arc::new(Self {
            config,
            resolver,
            service,
            factory,
        }))
    }

    /// Warm the demo tenant's pools so the first request doesn't pay for
    /// connection setup. Best-effort with a hard deadline.
    pub async fn prewarm(&self) {
        if !self.config.demo_enabled {
            return;
        }
        let warm = async {
            let account = self.resolver.resolve(None).await?;
            self.factory.get_adapters(&account).await
        };
        match tokio::time::timeout(PREWARM_TIMEOUT, warm).await {
            Ok(Ok(adapters)) => info!(count = adapters.len(), "demo adapters pre-warmed"),
            Ok(Err(e)) => warn!(error = %e, "demo pre-warm failed; continuing degraded"),
            Err(_) => warn!(
                timeout_s = PREWARM_TIMEOUT.as_secs(),
                "demo pre-warm timed out; continuing degraded"
            ),
        }
    }

    /// Tear down in reverse construction order.
    pub async fn shutdown(&self) {
        info!("shutting down adapter factory");
        self.factory.shutdown().await;
    }
}
