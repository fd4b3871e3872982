//! The request pipeline: schemas → plan → validation → execution →
//! masking → response.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::executor::QueryExecutor;
use super::masking::apply_field_masks;
use crate::account::{AccountConfig, ModelMode};
use crate::db::factory::AdapterFactory;
use crate::error::{BraidQLError, Result};
use crate::llm::transport::TransportFactory;
use crate::llm::{PlanSynthesizer, PlanValidator};
use crate::plan::{QueryMetadata, QueryPlan, QueryRequest, QueryResult, SecurityContext};

/// Main query orchestration service.
///
/// One instance per process; everything request-scoped flows through the
/// method arguments.
pub struct QueryService {
    factory:            Arc<AdapterFactory>,
    transports:         Arc<dyn TransportFactory>,
    executor:           QueryExecutor,
    models:             Vec<String>,
    platform_model_key: Option<String>,
}

impl QueryService {
    /// Build the service over its collaborators.
    ///
    /// `models` is the ordered `[preferred, fallback, ...]` chain;
    /// `platform_model_key` backs accounts in platform mode.
    pub fn new(
        factory: Arc<AdapterFactory>,
        transports: Arc<dyn TransportFactory>,
        models: Vec<String>,
        platform_model_key: Option<String>,
    ) -> Self {
        Self {
            executor: QueryExecutor::new(Arc::clone(&factory)),
            factory,
            transports,
            models,
            platform_model_key,
        }
    }

    /// Execute a natural-language query with full orchestration.
    ///
    /// # Errors
    ///
    /// Every kind in the crate taxonomy can surface here; see the error
    /// module for the status mapping.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        security_ctx: &SecurityContext,
        account: &AccountConfig,
    ) -> Result<QueryResult> {
        let intent = request.validate_intent()?;
        let trace_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let schemas = self.factory.get_all_schemas(account).await?;

        let transport = self.transports.for_key(&self.resolve_model_key(account)?);
        let synthesizer = PlanSynthesizer::new(Arc::clone(&transport), self.models.clone());
        let plan = synthesizer.generate(intent, &schemas, security_ctx).await?;

        // Dry run: hand back the plan without touching the validator or
        // any adapter.
        if request.dry_run {
            return Ok(dry_run_result(plan, trace_id));
        }

        if request.skip_validation {
            let excerpt: String = intent.chars().take(100).collect();
            warn!(trace_id = %trace_id, intent = %excerpt, "validation skipped by request");
        } else {
            let validator = PlanValidator::new(transport, self.models.clone());
            for query in &plan.queries {
                let schema = schemas.get(&query.database).ok_or_else(|| {
                    BraidQLError::UnknownDatabase {
                        name: query.database.clone(),
                    }
                })?;
                let verdict = validator.validate(query, schema).await?;
                if !verdict.safe {
                    return Err(BraidQLError::QueryValidation {
                        issues:   verdict.issues,
                        severity: verdict.severity.as_str().to_string(),
                    });
                }
            }
        }

        let rows = self.executor.execute(&plan, account).await?;
        let secured = apply_field_masks(rows, &security_ctx.field_masks);

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let rows_returned = secured.len();

        // Lightweight per-account usage record.
        info!(
            target: "braidql::usage",
            account_id = %account.id,
            trace_id = %trace_id,
            execution_time_ms,
            rows_returned,
            "query executed"
        );

        Ok(QueryResult {
            data:     secured,
            metadata: QueryMetadata {
                plan,
                execution_time_ms,
                rows_returned,
                trace_id,
                timestamp: Utc::now(),
            },
        })
    }

    fn resolve_model_key(&self, account: &AccountConfig) -> Result<String> {
        match account.model_mode {
            ModelMode::Byo => {
                account.validate()?;
                account.model_key.clone().ok_or_else(|| {
                    BraidQLError::config("BYO account is missing its model key")
                })
            },
            ModelMode::Platform => self.platform_model_key.clone().ok_or_else(|| {
                BraidQLError::config("platform model key is not configured")
            }),
        }
    }
}

fn dry_run_result(plan: QueryPlan, trace_id: String) -> QueryResult {
    QueryResult {
        data:     Vec::new(),
        metadata: QueryMetadata {
            plan,
            execution_time_ms: 0.0,
            rows_returned: 0,
            trace_id,
            timestamp: Utc::now(),
        },
    }
}
