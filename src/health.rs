//! Service health probes
//!
//! Checks the knowledge service and the database concurrently and joins
//! both before reporting. The knowledge probe covers the chat and embedding
//! models and a test embedding checked against the configured dimensions.

use crate::execution::FunctionExecutor;
use crate::knowledge::KnowledgeSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TEST_EMBEDDING_TEXT: &str = "test embedding";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Optimal,
    /// Both services answer but the knowledge service is not fully usable.
    Degraded,
    DatabaseOnly,
    LlmOnly,
    ServicesUnavailable,
}

impl OverallStatus {
    pub fn from_probes(llm_healthy: bool, llm_ready: bool, database_healthy: bool) -> Self {
        match (llm_healthy, database_healthy) {
            (true, true) if llm_ready => OverallStatus::Optimal,
            (true, true) => OverallStatus::Degraded,
            (false, true) => OverallStatus::DatabaseOnly,
            (true, false) => OverallStatus::LlmOnly,
            (false, false) => OverallStatus::ServicesUnavailable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingProbe {
    #[serde(flatten)]
    pub probe: ProbeResult,
    pub model: String,
    pub dimensions: usize,
    pub expected_dimensions: usize,
    pub dimensions_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmProbe {
    #[serde(flatten)]
    pub probe: ProbeResult,
    pub model: String,
    pub models_available: usize,
    /// Required model name → present on the service.
    pub required_models: BTreeMap<String, bool>,
    pub embedding: EmbeddingProbe,
}

impl LlmProbe {
    pub fn missing_models(&self) -> Vec<&str> {
        self.required_models
            .iter()
            .filter(|(_, present)| !**present)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Reachable, every required model present, and embeddings usable.
    pub fn is_ready(&self) -> bool {
        self.probe.healthy
            && self.missing_models().is_empty()
            && self.embedding.probe.healthy
            && self.embedding.dimensions_match
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub overall_status: OverallStatus,
    pub llm: LlmProbe,
    pub database: ProbeResult,
    pub recommendations: Vec<String>,
}

pub struct HealthChecker {
    knowledge: Arc<dyn KnowledgeSource>,
    executor: Arc<dyn FunctionExecutor>,
    probe_timeout: Duration,
    expected_dimensions: usize,
}

impl HealthChecker {
    pub fn new(
        knowledge: Arc<dyn KnowledgeSource>,
        executor: Arc<dyn FunctionExecutor>,
        probe_timeout: Duration,
        expected_dimensions: usize,
    ) -> Self {
        Self {
            knowledge,
            executor,
            probe_timeout,
            expected_dimensions,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let (llm, database) = tokio::join!(self.probe_llm(), self.probe_database());

        let overall_status =
            OverallStatus::from_probes(llm.probe.healthy, llm.is_ready(), database.healthy);
        let recommendations = recommendations(overall_status, &llm, &database);

        info!(
            status = ?overall_status,
            llm_ms = llm.probe.response_time_ms,
            database_ms = database.response_time_ms,
            "Health check completed"
        );

        HealthReport {
            overall_status,
            llm,
            database,
            recommendations,
        }
    }

    async fn probe_llm(&self) -> LlmProbe {
        let model = self.knowledge.model().to_string();
        let embedding_model = self.knowledge.embedding_model().to_string();

        let ((probe, models), embedding) = tokio::join!(
            timed(self.probe_timeout, self.knowledge.available_models()),
            self.probe_embedding(&embedding_model)
        );
        let models = models.unwrap_or_default();

        let required_models = if probe.healthy {
            [&model, &embedding_model]
                .into_iter()
                .map(|name| (name.clone(), is_model_present(name, &models)))
                .collect()
        } else {
            BTreeMap::new()
        };

        LlmProbe {
            probe,
            model,
            models_available: models.len(),
            required_models,
            embedding,
        }
    }

    async fn probe_embedding(&self, model: &str) -> EmbeddingProbe {
        let (probe, embedding) =
            timed(self.probe_timeout, self.knowledge.embed(TEST_EMBEDDING_TEXT)).await;
        let dimensions = embedding.map(|v| v.len()).unwrap_or(0);

        EmbeddingProbe {
            probe,
            model: model.to_string(),
            dimensions,
            expected_dimensions: self.expected_dimensions,
            dimensions_match: dimensions == self.expected_dimensions,
        }
    }

    async fn probe_database(&self) -> ProbeResult {
        timed(self.probe_timeout, self.executor.ping()).await.0
    }
}

/// Exact name or a tagged variant of it (`llama3.1` matches `llama3.1:latest`).
fn is_model_present(required: &str, available: &[String]) -> bool {
    available
        .iter()
        .any(|name| name == required || name.starts_with(&format!("{}:", required)))
}

async fn timed<T, F>(limit: Duration, probe: F) -> (ProbeResult, Option<T>)
where
    F: Future<Output = crate::Result<T>>,
{
    let start = Instant::now();
    let outcome = tokio::time::timeout(limit, probe).await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(value)) => (
            ProbeResult {
                healthy: true,
                response_time_ms,
                error: None,
            },
            Some(value),
        ),
        Ok(Err(e)) => {
            warn!(error = %e, "Health probe failed");
            (
                ProbeResult {
                    healthy: false,
                    response_time_ms,
                    error: Some(e.public_message()),
                },
                None,
            )
        }
        Err(_) => (
            ProbeResult {
                healthy: false,
                response_time_ms,
                error: Some(format!("probe timed out after {} ms", limit.as_millis())),
            },
            None,
        ),
    }
}

fn recommendations(status: OverallStatus, llm: &LlmProbe, database: &ProbeResult) -> Vec<String> {
    let mut out = Vec::new();

    if !llm.probe.healthy {
        out.push("Knowledge service is not responding - check that Ollama is running".to_string());
    } else {
        for model in llm.missing_models() {
            out.push(format!("Pull missing model: ollama pull {}", model));
        }

        let embedding = &llm.embedding;
        if !embedding.probe.healthy {
            out.push(format!(
                "Embedding generation failed with model {}",
                embedding.model
            ));
        } else if !embedding.dimensions_match {
            out.push(format!(
                "Embedding dimensions mismatch: got {}, expected {}",
                embedding.dimensions, embedding.expected_dimensions
            ));
        }
    }

    if !database.healthy {
        out.push(
            "Database is not reachable - verify DATABASE_URL and that PostgreSQL is running"
                .to_string(),
        );
    }

    if status == OverallStatus::Optimal {
        out.push("All services operating normally".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::InMemoryExecutor;
    use crate::knowledge::MockKnowledgeSource;

    fn checker(knowledge: MockKnowledgeSource, executor: InMemoryExecutor) -> HealthChecker {
        HealthChecker::new(
            Arc::new(knowledge),
            Arc::new(executor),
            Duration::from_secs(2),
            768,
        )
    }

    #[test]
    fn test_status_from_probes() {
        assert_eq!(OverallStatus::from_probes(true, true, true), OverallStatus::Optimal);
        assert_eq!(OverallStatus::from_probes(true, false, true), OverallStatus::Degraded);
        assert_eq!(
            OverallStatus::from_probes(false, false, true),
            OverallStatus::DatabaseOnly
        );
        assert_eq!(OverallStatus::from_probes(true, true, false), OverallStatus::LlmOnly);
        assert_eq!(
            OverallStatus::from_probes(false, false, false),
            OverallStatus::ServicesUnavailable
        );
    }

    #[test]
    fn test_model_matching() {
        let available = vec![
            "llama3.1:latest".to_string(),
            "nomic-embed-text:v1.5".to_string(),
        ];
        assert!(is_model_present("llama3.1", &available));
        assert!(is_model_present("nomic-embed-text", &available));
        assert!(!is_model_present("llama3", &available));
    }

    #[tokio::test]
    async fn test_all_services_up() {
        let report = checker(MockKnowledgeSource::new("ok"), InMemoryExecutor::new())
            .check()
            .await;

        assert_eq!(report.overall_status, OverallStatus::Optimal);
        assert!(report.llm.missing_models().is_empty());
        assert_eq!(report.llm.embedding.dimensions, 768);
        assert!(report.llm.embedding.dimensions_match);
        assert_eq!(report.recommendations, vec!["All services operating normally"]);
    }

    #[tokio::test]
    async fn test_missing_models_degrade_status() {
        let knowledge = MockKnowledgeSource::new("ok").with_models(vec!["mistral:7b".to_string()]);
        let report = checker(knowledge, InMemoryExecutor::new()).check().await;

        assert_eq!(report.overall_status, OverallStatus::Degraded);
        assert_eq!(report.llm.required_models.get("llama3.1"), Some(&false));
        assert_eq!(
            report.recommendations,
            vec![
                "Pull missing model: ollama pull llama3.1",
                "Pull missing model: ollama pull nomic-embed-text",
            ]
        );
    }

    #[tokio::test]
    async fn test_embedding_dimension_mismatch_degrades_status() {
        let knowledge = MockKnowledgeSource::new("ok").with_embedding_dimensions(384);
        let report = checker(knowledge, InMemoryExecutor::new()).check().await;

        assert_eq!(report.overall_status, OverallStatus::Degraded);
        assert!(!report.llm.embedding.dimensions_match);
        assert_eq!(
            report.recommendations,
            vec!["Embedding dimensions mismatch: got 384, expected 768"]
        );
    }

    #[tokio::test]
    async fn test_database_down() {
        let report = checker(
            MockKnowledgeSource::new("ok"),
            InMemoryExecutor::new().failing("connection refused"),
        )
        .check()
        .await;

        assert_eq!(report.overall_status, OverallStatus::LlmOnly);
        assert_eq!(
            report.database.error.as_deref(),
            Some("Database error: function execution failed")
        );
    }

    #[tokio::test]
    async fn test_everything_down() {
        let report = checker(
            MockKnowledgeSource::new("ok").failing(),
            InMemoryExecutor::new().failing("offline"),
        )
        .check()
        .await;

        assert_eq!(report.overall_status, OverallStatus::ServicesUnavailable);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.llm.required_models.is_empty());

        let wire = serde_json::to_value(&report).unwrap();
        assert_eq!(wire["overall_status"], "services_unavailable");
        assert_eq!(wire["llm"]["healthy"], false);
        assert_eq!(wire["llm"]["embedding"]["expected_dimensions"], 768);
    }
}
