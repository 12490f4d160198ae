//! Execution gateway
//!
//! The only place analytical functions are invoked. Every call is checked
//! against the registry, bounded by a timeout and timed. Failures come back
//! as data, never as a panic or a propagated error.

pub mod postgres;

pub use postgres::PgFunctionExecutor;

use crate::error::OrchestrationError;
use crate::models::{ExecutionOutcome, Parameters, Row};
use crate::registry::FunctionRegistry;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Alternatives offered when a requested function is unknown.
const MAX_ALTERNATIVES: usize = 5;

/// Backend that actually runs a named analytical function.
#[async_trait::async_trait]
pub trait FunctionExecutor: Send + Sync {
    async fn execute(&self, function_name: &str, parameters: &Parameters) -> Result<Vec<Row>>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Release pooled resources. Safe to call more than once.
    async fn close(&self) {}
}

/// Executes registered functions with timing and a per-call timeout
pub struct ExecutionGateway {
    registry: Arc<FunctionRegistry>,
    executor: Arc<dyn FunctionExecutor>,
    timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        executor: Arc<dyn FunctionExecutor>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            timeout,
        }
    }

    /// Run `function_name` with `parameters`.
    pub async fn execute(&self, function_name: &str, parameters: Parameters) -> ExecutionOutcome {
        let start = Instant::now();

        if !self.registry.contains(function_name) {
            let err = OrchestrationError::FunctionNotFound {
                name: function_name.to_string(),
                alternatives: self
                    .registry
                    .names()
                    .into_iter()
                    .take(MAX_ALTERNATIVES)
                    .collect(),
            };
            warn!(function = %function_name, "Requested function is not registered");
            return failed_outcome(function_name, err, elapsed_ms(start));
        }

        debug!(function = %function_name, params = ?parameters, "Executing analytical function");

        let result = tokio::time::timeout(
            self.timeout,
            self.executor.execute(function_name, &parameters),
        )
        .await
        .unwrap_or_else(|_| {
            Err(OrchestrationError::Timeout {
                function: function_name.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })
        });

        let execution_time_ms = elapsed_ms(start);

        match result {
            Ok(rows) => {
                debug!(
                    function = %function_name,
                    row_count = rows.len(),
                    execution_time_ms,
                    "Function execution completed"
                );
                ExecutionOutcome::Completed {
                    function_name: function_name.to_string(),
                    parameters,
                    rows,
                    execution_time_ms,
                }
            }
            Err(e) => {
                warn!(
                    function = %function_name,
                    error = %e,
                    execution_time_ms,
                    "Function execution failed"
                );
                failed_outcome(function_name, e, execution_time_ms)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn failed_outcome(
    function_name: &str,
    error: OrchestrationError,
    execution_time_ms: u64,
) -> ExecutionOutcome {
    let message = error.public_message();
    let alternatives = match error {
        OrchestrationError::FunctionNotFound { alternatives, .. } => alternatives,
        _ => Vec::new(),
    };

    ExecutionOutcome::Failed {
        function_name: function_name.to_string(),
        error: message,
        alternatives,
        execution_time_ms,
    }
}

/// In-process executor backed by canned rows per function.
#[derive(Default)]
pub struct InMemoryExecutor {
    rows: HashMap<String, Vec<Row>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, function_name: &str, rows: Vec<Row>) -> Self {
        self.rows.insert(function_name.to_string(), rows);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with a database error carrying `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

#[async_trait::async_trait]
impl FunctionExecutor for InMemoryExecutor {
    async fn execute(&self, function_name: &str, _parameters: &Parameters) -> Result<Vec<Row>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(OrchestrationError::DatabaseError(message.clone()));
        }

        Ok(self.rows.get(function_name).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(OrchestrationError::DatabaseError(message.clone())),
            None => Ok(()),
        }
    }
}

/// `n` rows with every field populated.
#[cfg(test)]
pub(crate) fn sample_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let mut row = Row::new();
            row.insert("trade_id".to_string(), serde_json::json!(i));
            row.insert("respect_rate".to_string(), serde_json::json!(0.7));
            row.insert("session".to_string(), serde_json::json!("London"));
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway(executor: InMemoryExecutor, timeout: Duration) -> ExecutionGateway {
        ExecutionGateway::new(
            Arc::new(FunctionRegistry::demo()),
            Arc::new(executor),
            timeout,
        )
    }

    fn params() -> Parameters {
        let mut p = Parameters::new();
        p.insert("timeframe".to_string(), json!("4h"));
        p
    }

    #[tokio::test]
    async fn test_successful_execution_returns_rows() {
        let executor = InMemoryExecutor::new()
            .with_rows("detect_fair_value_gaps", sample_rows(12));
        let outcome = gateway(executor, Duration::from_secs(5))
            .execute("detect_fair_value_gaps", params())
            .await;

        match outcome {
            ExecutionOutcome::Completed {
                function_name,
                parameters,
                rows,
                ..
            } => {
                assert_eq!(function_name, "detect_fair_value_gaps");
                assert_eq!(parameters["timeframe"], "4h");
                assert_eq!(rows.len(), 12);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_in_memory_ping() {
        tokio_test::assert_ok!(InMemoryExecutor::new().ping().await);
        tokio_test::assert_err!(InMemoryExecutor::new().failing("down").ping().await);
    }

    #[tokio::test]
    async fn test_empty_rows_is_still_success() {
        let outcome = gateway(InMemoryExecutor::new(), Duration::from_secs(5))
            .execute("analyze_session_performance", params())
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_unknown_function_lists_alternatives() {
        let outcome = gateway(InMemoryExecutor::new(), Duration::from_secs(5))
            .execute("drop_everything", params())
            .await;

        match outcome {
            ExecutionOutcome::Failed {
                function_name,
                error,
                alternatives,
                ..
            } => {
                assert_eq!(function_name, "drop_everything");
                assert_eq!(error, "Function drop_everything not found");
                assert_eq!(
                    alternatives,
                    vec![
                        "update_order_block_performance",
                        "detect_fair_value_gaps",
                        "analyze_session_performance",
                    ]
                );
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_function_times_out() {
        let executor = InMemoryExecutor::new().with_delay(Duration::from_millis(200));
        let outcome = gateway(executor, Duration::from_millis(20))
            .execute("detect_fair_value_gaps", params())
            .await;

        match outcome {
            ExecutionOutcome::Failed { error, .. } => {
                assert!(error.contains("timed out"), "{}", error);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_sanitized() {
        let executor = InMemoryExecutor::new()
            .failing("connection refused to postgresql://supabase_admin:postgres@db");
        let outcome = gateway(executor, Duration::from_secs(5))
            .execute("update_order_block_performance", params())
            .await;

        match outcome {
            ExecutionOutcome::Failed {
                error,
                alternatives,
                ..
            } => {
                assert_eq!(error, "Database error: function execution failed");
                assert!(alternatives.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
