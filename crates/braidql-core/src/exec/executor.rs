//! Plan execution: single-database dispatch and parallel fan-out.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::account::AccountConfig;
use crate::db::factory::AdapterFactory;
use crate::db::traits::DEFAULT_MAX_ROWS;
use crate::db::types::JsonRow;
use crate::error::{BraidQLError, Result};
use crate::plan::QueryPlan;

/// Executes plans against the adapters resolved through the factory.
pub struct QueryExecutor {
    factory:  Arc<AdapterFactory>,
    max_rows: usize,
}

impl QueryExecutor {
    /// Executor with the default row cap.
    #[must_use]
    pub fn new(factory: Arc<AdapterFactory>) -> Self {
        Self {
            factory,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Override the per-query row cap.
    #[must_use]
    pub const fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Execute a plan and return its merged rows.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDatabase` for sub-queries targeting a database the
    /// account lacks, plus whatever the adapters surface.
    pub async fn execute(&self, plan: &QueryPlan, account: &AccountConfig) -> Result<Vec<JsonRow>> {
        match plan.queries.len() {
            0 => Err(BraidQLError::invalid_plan("plan contains no queries")),
            1 => self.execute_single(plan, account).await,
            _ => self.execute_fan_out(plan, account).await,
        }
    }

    async fn execute_single(&self, plan: &QueryPlan, account: &AccountConfig) -> Result<Vec<JsonRow>> {
        let query = &plan.queries[0];
        let adapter = self.factory.get(account, &query.database).await?;
        adapter.execute(query, self.max_rows).await
    }

    /// Run every sub-query concurrently and concatenate the outputs in
    /// plan order.
    ///
    /// Merge is ordered concatenation only — cross-kind joins must be
    /// planned by the model into post-filter stages. The first sub-query
    /// error cancels all outstanding siblings and surfaces alone; partial
    /// results are discarded.
    async fn execute_fan_out(&self, plan: &QueryPlan, account: &AccountConfig) -> Result<Vec<JsonRow>> {
        // Resolve adapters up front so an unknown database fails before
        // any work starts.
        let mut resolved = Vec::with_capacity(plan.queries.len());
        for query in &plan.queries {
            resolved.push(self.factory.get(account, &query.database).await?);
        }

        let mut tasks = JoinSet::new();
        for (index, (query, adapter)) in plan.queries.iter().zip(resolved).enumerate() {
            let query = query.clone();
            let max_rows = self.max_rows;
            tasks.spawn(async move { (index, adapter.execute(&query, max_rows).await) });
        }

        let mut outputs: Vec<Option<Vec<JsonRow>>> = vec![None; plan.queries.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(rows))) => {
                    debug!(index, rows = rows.len(), "sub-query completed");
                    outputs[index] = Some(rows);
                },
                Ok((index, Err(e))) => {
                    warn!(index, error = %e, "sub-query failed; cancelling siblings");
                    tasks.abort_all();
                    // Drain so no task outlives this call.
                    while tasks.join_next().await.is_some() {}
                    return Err(e);
                },
                Err(join_err) if join_err.is_cancelled() => {},
                Err(join_err) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(BraidQLError::internal(format!("sub-query task panicked: {join_err}")));
                },
            }
        }

        // Plan-order concatenation regardless of completion order.
        let mut merged = Vec::new();
        for output in outputs {
            if let Some(rows) = output {
                merged.extend(rows);
            }
        }
        Ok(merged)
    }
}
