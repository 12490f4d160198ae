//! Coordinator - routes a question to knowledge, execution, or both
//!
//! INPUT → CLASSIFY → PLAN → ROUTE → (KNOWLEDGE | BACKTEST | BOTH) → AUDIT

pub mod backtesting;

pub use backtesting::{BacktestingPipeline, PipelineRun};

use crate::audit::{AuditLog, AuditRecord};
use crate::classifier::RequestClassifier;
use crate::knowledge::{KnowledgeAnswer, KnowledgeSource};
use crate::models::{ExecutionPlan, QueryClassification, RoutingDecision, StructuredResponse};
use crate::planner::Planner;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything one coordinator run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorOutcome {
    pub audit_id: Uuid,
    pub classification: QueryClassification,
    pub plan: ExecutionPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<StructuredResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<KnowledgeAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_error: Option<String>,
    pub reasoning_trace: Vec<String>,
    pub execution_time_ms: u64,
}

/// Top-level coordinator
pub struct Coordinator {
    planner: Box<dyn Planner>,
    pipeline: BacktestingPipeline,
    knowledge: Arc<dyn KnowledgeSource>,
    audit_log: Arc<AuditLog>,
}

impl Coordinator {
    pub fn new(
        planner: Box<dyn Planner>,
        pipeline: BacktestingPipeline,
        knowledge: Arc<dyn KnowledgeSource>,
        audit_log: Arc<AuditLog>,
    ) -> Self {
        Self {
            planner,
            pipeline,
            knowledge,
            audit_log,
        }
    }

    pub fn pipeline(&self) -> &BacktestingPipeline {
        &self.pipeline
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    pub async fn run(&self, query: &str) -> Result<CoordinatorOutcome> {
        self.run_value(&Value::String(query.to_string())).await
    }

    /// Run from loosely typed input. Non-string input is classified and
    /// planned with the degraded defaults.
    pub async fn run_value(&self, input: &Value) -> Result<CoordinatorOutcome> {
        let start_time = Instant::now();
        let mut reasoning_trace = Vec::new();

        let query = match input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        info!(query = %query, "Coordinator: request received");
        reasoning_trace.push("INPUT: Query received".to_string());

        // === CLASSIFY ===
        let classification = RequestClassifier::classify_value(input);
        reasoning_trace.push(format!(
            "CLASSIFY: {} ({:.0}% confidence) - {}",
            classification.routing_decision, classification.confidence, classification.reasoning
        ));

        // === PLAN ===
        let plan = self.planner.formulate_value(input, &classification);
        reasoning_trace.push(format!(
            "PLAN: {} / {} / {}",
            plan.analysis_strategy, plan.trading_context, plan.quality_requirements
        ));

        // === ROUTE ===
        let routing = classification.routing_decision;
        reasoning_trace.push(format!("ROUTE: {}", routing));

        let mut knowledge = None;
        let mut knowledge_error = None;
        if matches!(routing, RoutingDecision::KnowledgeFirst | RoutingDecision::Hybrid) {
            match self.knowledge.answer(&query, Some(&plan)).await {
                Ok(answer) => {
                    reasoning_trace.push(format!("KNOWLEDGE: answered by {}", answer.source));
                    knowledge = Some(answer);
                }
                Err(e) => {
                    warn!(error = %e, "Knowledge service failed");
                    let message = e.public_message();
                    reasoning_trace.push(format!("KNOWLEDGE: unavailable - {}", message));
                    knowledge_error = Some(message);
                }
            }
        }

        let mut response = None;
        if matches!(routing, RoutingDecision::ExecutionFirst | RoutingDecision::Hybrid) {
            let run = self.pipeline.run(&plan).await;
            reasoning_trace.extend(run.trace);
            response = Some(run.response);
        }

        // === AUDIT ===
        let record = AuditRecord::new(
            query,
            classification.clone(),
            plan.clone(),
            response.clone(),
            knowledge.is_some() || knowledge_error.is_some(),
        );
        let audit_id = self.audit_log.record(record).await?;
        reasoning_trace.push("COMPLETE: Outcome recorded".to_string());

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            audit_id = %audit_id,
            routing = %routing,
            execution_time_ms,
            "Coordinator: request completed"
        );

        Ok(CoordinatorOutcome {
            audit_id,
            classification,
            plan,
            response,
            knowledge,
            knowledge_error,
            reasoning_trace,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{sample_rows, ExecutionGateway, InMemoryExecutor};
    use crate::config::Settings;
    use crate::knowledge::{MockKnowledgeSource, OllamaClient};
    use crate::models::ExecutionStatus;
    use crate::planner::KeywordPlanner;
    use crate::registry::FunctionRegistry;
    use crate::selection::FunctionSelector;
    use serde_json::json;
    use std::time::Duration;

    fn coordinator(knowledge: MockKnowledgeSource) -> Coordinator {
        coordinator_with(Arc::new(knowledge))
    }

    fn coordinator_with(knowledge: Arc<dyn KnowledgeSource>) -> Coordinator {
        let registry = Arc::new(FunctionRegistry::demo());
        let executor = InMemoryExecutor::new()
            .with_rows("update_order_block_performance", sample_rows(25))
            .with_rows("detect_fair_value_gaps", sample_rows(8));
        let pipeline = BacktestingPipeline::new(
            FunctionSelector::new(registry.clone()),
            ExecutionGateway::new(registry, Arc::new(executor), Duration::from_secs(5)),
        );

        Coordinator::new(
            Box::new(KeywordPlanner),
            pipeline,
            knowledge,
            Arc::new(AuditLog::new()),
        )
    }

    #[tokio::test]
    async fn test_execution_first_runs_pipeline_only() {
        let c = coordinator(MockKnowledgeSource::new("unused"));
        let outcome = c
            .run("Show me performance statistics and results")
            .await
            .unwrap();

        assert_eq!(
            outcome.classification.routing_decision,
            RoutingDecision::ExecutionFirst
        );
        assert!(outcome.knowledge.is_none());
        let response = outcome.response.unwrap();
        assert_eq!(response.execution_status, ExecutionStatus::Partial);
        assert!(c.audit_log().verify_integrity(outcome.audit_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_knowledge_first_skips_pipeline() {
        let c = coordinator(MockKnowledgeSource::new("An order block is the last opposing candle."));
        let outcome = c.run("Explain what is ICT methodology").await.unwrap();

        assert_eq!(
            outcome.classification.routing_decision,
            RoutingDecision::KnowledgeFirst
        );
        assert!(outcome.response.is_none());
        assert_eq!(
            outcome.knowledge.unwrap().answer,
            "An order block is the last opposing candle."
        );
    }

    #[tokio::test]
    async fn test_hybrid_runs_both() {
        let c = coordinator(MockKnowledgeSource::new("context"));
        let outcome = c.run("strategy performance").await.unwrap();

        assert_eq!(outcome.classification.routing_decision, RoutingDecision::Hybrid);
        assert!(outcome.knowledge.is_some());
        assert!(outcome.response.is_some());

        let knowledge_at = outcome
            .reasoning_trace
            .iter()
            .position(|t| t.starts_with("KNOWLEDGE"))
            .unwrap();
        let select_at = outcome
            .reasoning_trace
            .iter()
            .position(|t| t.starts_with("SELECT"))
            .unwrap();
        assert!(knowledge_at < select_at);
    }

    #[tokio::test]
    async fn test_knowledge_failure_is_recorded_not_raised() {
        let c = coordinator(MockKnowledgeSource::new("").failing());
        let outcome = c.run("explain the concept").await.unwrap();

        assert!(outcome.knowledge.is_none());
        assert_eq!(
            outcome.knowledge_error.as_deref(),
            Some("Knowledge service error: knowledge service unavailable")
        );
        assert!(c.audit_log().get(outcome.audit_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_knowledge_service_details_stay_out_of_outcome() {
        let settings = Settings {
            ollama_host: "http://127.0.0.1:1".to_string(),
            ollama_timeout: Duration::from_secs(2),
            ..Settings::default()
        };
        let c = coordinator_with(Arc::new(OllamaClient::new(&settings).unwrap()));

        let outcome = c.run("explain the concept").await.unwrap();
        let message = outcome.knowledge_error.unwrap();
        assert!(!message.contains("127.0.0.1"), "leaked: {}", message);
        assert!(!message.contains("/api/generate"), "leaked: {}", message);
        assert!(outcome
            .reasoning_trace
            .iter()
            .all(|t| !t.contains("127.0.0.1")));
    }

    #[tokio::test]
    async fn test_non_string_input_degrades() {
        let c = coordinator(MockKnowledgeSource::new("fallback"));
        let outcome = c.run_value(&json!({"query": 3})).await.unwrap();

        assert_eq!(outcome.classification.routing_decision, RoutingDecision::Hybrid);
        assert_eq!(outcome.classification.confidence, 50.0);
        assert_eq!(outcome.plan, ExecutionPlan::default());
        assert!(outcome.response.is_some());
        assert_eq!(c.audit_log().count().await, 1);
    }
}
