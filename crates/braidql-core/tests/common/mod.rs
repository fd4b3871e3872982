//! Shared mocks for the pipeline scenario tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use braidql_core::account::{AccountConfig, ModelMode, UrlCipher};
use braidql_core::db::{
    AdapterBuilder, AdapterFactory, DatabaseAdapter, DatabaseSchema, DatabaseType, JsonRow,
};
use braidql_core::error::{BraidQLError, Result, TransportKind};
use braidql_core::exec::QueryService;
use braidql_core::llm::{
    Candidate, GenerateResponse, GenerationParams, ModelTransport, Part, TransportFactory,
};
use braidql_core::plan::DatabaseQuery;

/// Adapter returning scripted rows and recording every executed query.
pub struct MockAdapter {
    db_type:      DatabaseType,
    rows:         Vec<JsonRow>,
    fail_message: Option<String>,
    delay:        Duration,
    executed:     Mutex<Vec<DatabaseQuery>>,
}

impl MockAdapter {
    fn build(
        db_type: DatabaseType,
        rows: Vec<serde_json::Value>,
        fail_message: Option<String>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            db_type,
            rows: rows
                .into_iter()
                .map(|v| v.as_object().expect("mock rows are objects").clone())
                .collect(),
            fail_message,
            delay,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn returning(db_type: DatabaseType, rows: Vec<serde_json::Value>) -> Arc<Self> {
        Self::build(db_type, rows, None, Duration::ZERO)
    }

    pub fn failing(db_type: DatabaseType, message: &str) -> Arc<Self> {
        Self::build(db_type, Vec::new(), Some(message.to_string()), Duration::ZERO)
    }

    pub fn with_delay(
        db_type: DatabaseType,
        rows: Vec<serde_json::Value>,
        delay: Duration,
    ) -> Arc<Self> {
        Self::build(db_type, rows, None, delay)
    }

    pub fn executed(&self) -> Vec<DatabaseQuery> {
        self.executed.lock().expect("mock lock").clone()
    }

    pub fn execute_count(&self) -> usize {
        self.executed.lock().expect("mock lock").len()
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    async fn execute(&self, query: &DatabaseQuery, _max_rows: usize) -> Result<Vec<JsonRow>> {
        self.executed.lock().expect("mock lock").push(query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.fail_message {
            return Err(BraidQLError::ConnectionLost {
                message: message.clone(),
            });
        }
        Ok(self.rows.clone())
    }

    async fn introspect_schema(&self) -> Result<DatabaseSchema> {
        Ok(match self.db_type {
            DatabaseType::PostgreSQL => DatabaseSchema::Relational {
                name:          "mock_pg".to_string(),
                tables:        BTreeMap::new(),
                relationships: Vec::new(),
            },
            DatabaseType::MongoDB => DatabaseSchema::Document {
                name:        "mock_mongo".to_string(),
                collections: BTreeMap::new(),
            },
        })
    }

    async fn disconnect(&self) {}

    async fn health_check(&self) -> bool {
        true
    }

    fn database_type(&self) -> DatabaseType {
        self.db_type
    }
}

/// Builder handing out fixed mock adapters.
pub struct MockBuilder {
    relational: Arc<MockAdapter>,
    document:   Arc<MockAdapter>,
}

impl MockBuilder {
    pub fn new(relational: Arc<MockAdapter>, document: Arc<MockAdapter>) -> Self {
        Self {
            relational,
            document,
        }
    }
}

#[async_trait]
impl AdapterBuilder for MockBuilder {
    async fn build_relational(&self, _url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        Ok(Arc::clone(&self.relational) as Arc<dyn DatabaseAdapter>)
    }

    async fn build_document(&self, _url: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        Ok(Arc::clone(&self.document) as Arc<dyn DatabaseAdapter>)
    }
}

/// Per-model scripted behavior.
#[derive(Clone)]
pub enum ModelBehavior {
    Text(String),
    Fail(TransportKind),
}

/// Transport replaying scripted behaviors per model name.
///
/// Validation prompts (recognized by their fixed preamble) answer with a
/// separate scripted verdict so generation call counts stay clean.
pub struct ScriptedTransport {
    behaviors:       HashMap<String, ModelBehavior>,
    validation_text: String,
    calls:           Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(behaviors: HashMap<String, ModelBehavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            validation_text: r#"{"safe":true,"issues":[],"severity":"low"}"#.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn single(model: &str, text: &str) -> Arc<Self> {
        Self::new([(model.to_string(), ModelBehavior::Text(text.to_string()))].into())
    }

    pub fn with_validation_text(
        behaviors: HashMap<String, ModelBehavior>,
        validation_text: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            validation_text: validation_text.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.calls.lock().expect("mock lock").iter().filter(|m| m.as_str() == model).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("mock lock").len()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<GenerateResponse> {
        let is_validation = prompt.starts_with("You are a database security expert");
        if !is_validation {
            self.calls.lock().expect("mock lock").push(model.to_string());
        }

        let text = if is_validation {
            self.validation_text.clone()
        } else {
            match self.behaviors.get(model) {
                Some(ModelBehavior::Text(text)) => text.clone(),
                Some(ModelBehavior::Fail(kind)) => {
                    return Err(BraidQLError::transport(*kind, "scripted failure"));
                },
                None => {
                    return Err(BraidQLError::transport(
                        TransportKind::Connection,
                        format!("no script for model {model}"),
                    ));
                },
            }
        };

        Ok(GenerateResponse {
            candidates: vec![Candidate {
                parts: vec![Part { text: Some(text) }],
            }],
        })
    }
}

pub struct ScriptedTransportFactory(pub Arc<ScriptedTransport>);

impl TransportFactory for ScriptedTransportFactory {
    fn for_key(&self, _api_key: &str) -> Arc<dyn ModelTransport> {
        Arc::clone(&self.0) as Arc<dyn ModelTransport>
    }
}

/// Fully wired pipeline over mocks.
pub struct Harness {
    pub service:   QueryService,
    pub transport: Arc<ScriptedTransport>,
    pub postgres:  Arc<MockAdapter>,
    pub mongodb:   Arc<MockAdapter>,
}

pub fn account() -> AccountConfig {
    AccountConfig {
        id:             "acct-test".to_string(),
        name:           "Test - Scenarios".to_string(),
        key:            "braidql_scenarios".to_string(),
        relational_url: Some("postgresql://localhost/app".to_string()),
        document_url:   Some("mongodb://localhost/app".to_string()),
        model_mode:     ModelMode::Platform,
        model_key:      None,
    }
}

pub fn harness(
    transport: Arc<ScriptedTransport>,
    postgres: Arc<MockAdapter>,
    mongodb: Arc<MockAdapter>,
) -> Harness {
    let builder = MockBuilder::new(Arc::clone(&postgres), Arc::clone(&mongodb));
    let factory = Arc::new(AdapterFactory::new(
        Arc::new(builder),
        Arc::new(UrlCipher::new("scenario-secret")),
    ));
    let service = QueryService::new(
        factory,
        Arc::new(ScriptedTransportFactory(Arc::clone(&transport))),
        vec!["model-pro".to_string(), "model-flash".to_string()],
        Some("platform-key".to_string()),
    );
    Harness {
        service,
        transport,
        postgres,
        mongodb,
    }
}
