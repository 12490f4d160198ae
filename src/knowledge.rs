//! Knowledge service client
//!
//! Methodology questions are answered by a local Ollama model. The
//! coordinator only sees the [`KnowledgeSource`] trait, so tests swap in
//! [`MockKnowledgeSource`].
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::ExecutionPlan;
use crate::Result;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Reason reported when the service cannot be reached.
pub const SERVICE_UNAVAILABLE: &str = "knowledge service unavailable";

/// Answer from the knowledge service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub source: String,
    pub confidence: f64,
}

/// Knowledge/LLM collaborator
///
/// Errors carry a fixed reason only. Transport and parse details are logged
/// at the call site.
#[async_trait::async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Model the source answers with.
    fn model(&self) -> &str;

    /// Model used for embeddings.
    fn embedding_model(&self) -> &str;

    async fn answer(&self, query: &str, plan: Option<&ExecutionPlan>) -> Result<KnowledgeAnswer>;

    /// Embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeddings for several texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Models the service currently has loaded.
    async fn available_models(&self) -> Result<Vec<String>>;
}

/// Reusable Ollama client (connection-pooled)
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
    embedding_model: String,
}

impl OllamaClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(settings.ollama_timeout)
            .build()?;

        Ok(Self {
            client,
            host: settings.ollama_host.trim_end_matches('/').to_string(),
            model: settings.ollama_model.clone(),
            embedding_model: settings.embedding_model.clone(),
        })
    }

    async fn generate(&self, prompt: String) -> Result<GenerateResponse> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                top_p: 0.9,
                num_predict: 1024,
            },
        };

        info!(model = %self.model, "Calling Ollama generate");

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed("generate", e))?;

        decode(check_status("generate", response).await?, "generate").await
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    async fn answer(&self, query: &str, plan: Option<&ExecutionPlan>) -> Result<KnowledgeAnswer> {
        let response = self.generate(build_prompt(query, plan)?).await?;

        if response.response.trim().is_empty() {
            return Err(OrchestrationError::KnowledgeError(
                "empty response from model".to_string(),
            ));
        }

        let confidence = calculate_confidence(&response);
        info!(confidence, "Ollama response received");

        Ok(KnowledgeAnswer {
            answer: response.response,
            source: format!("ollama:{}", self.model),
            confidence,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        request_embedding(
            self.client.clone(),
            format!("{}/api/embeddings", self.host),
            self.embedding_model.clone(),
            text.to_string(),
        )
        .await
    }

    /// Requests run concurrently on the pooled client.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embeddings", self.host);
        let mut tasks = JoinSet::new();

        for (index, text) in texts.iter().enumerate() {
            let fut = request_embedding(
                self.client.clone(),
                url.clone(),
                self.embedding_model.clone(),
                text.clone(),
            );
            tasks.spawn(async move { (index, fut.await) });
        }

        let mut out = vec![Vec::new(); texts.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, embedding) = joined.map_err(|e| request_failed("embeddings", e))?;
            out[index] = embedding?;
        }

        Ok(out)
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| request_failed("tags", e))?;

        let tags: TagsResponse = decode(check_status("tags", response).await?, "tags").await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

async fn request_embedding(
    client: Client,
    url: String,
    model: String,
    text: String,
) -> Result<Vec<f32>> {
    let response = client
        .post(url)
        .json(&EmbeddingRequest {
            model: &model,
            prompt: &text,
        })
        .send()
        .await
        .map_err(|e| request_failed("embeddings", e))?;

    let parsed: EmbeddingResponse =
        decode(check_status("embeddings", response).await?, "embeddings").await?;

    if parsed.embedding.is_empty() {
        error!(model = %model, "No embeddings returned from Ollama");
        return Err(OrchestrationError::KnowledgeError(
            "no embedding returned".to_string(),
        ));
    }

    debug!(model = %model, dimensions = parsed.embedding.len(), "Embedding generated");
    Ok(parsed.embedding)
}

fn request_failed(endpoint: &str, e: impl Display) -> OrchestrationError {
    error!(endpoint, error = %e, "Ollama request failed");
    OrchestrationError::KnowledgeError(SERVICE_UNAVAILABLE.to_string())
}

async fn check_status(endpoint: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    error!(endpoint, %status, "Ollama error response: {}", error_text);
    Err(OrchestrationError::KnowledgeError(format!(
        "service returned HTTP {}",
        status.as_u16()
    )))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, endpoint: &str) -> Result<T> {
    response.json().await.map_err(|e| {
        error!(endpoint, error = %e, "Failed to parse Ollama response");
        OrchestrationError::KnowledgeError("invalid response from knowledge service".to_string())
    })
}

const SYSTEM_PROMPT: &str = r#"You are an expert in ICT (Inner Circle Trader) methodology.

Guidelines:
- Explain order blocks, fair value gaps, liquidity sweeps and market structure precisely
- Separate methodology from statistical evidence
- Reference the structured plan when one is supplied
- Be structured and concise

Format: Provide structured answers suitable for strategy research."#;

fn build_prompt(query: &str, plan: Option<&ExecutionPlan>) -> Result<String> {
    match plan {
        Some(plan) => Ok(format!(
            "{}\n\nStructured plan:\n{}",
            query,
            serde_json::to_string_pretty(plan)?
        )),
        None => Ok(query.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Heuristic answer confidence in percent
fn calculate_confidence(response: &GenerateResponse) -> f64 {
    let base_confidence = 85.0_f64;

    let finish_confidence = match response.done_reason.as_deref() {
        Some("stop") => 1.0,
        Some("length") => 0.8,
        _ => 0.7,
    };

    let length = response.response.len();
    let length_confidence = if length < 50 {
        0.6
    } else if length > 2000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(50.0, 98.0)
}

/// Canned knowledge source for tests and offline runs
pub struct MockKnowledgeSource {
    answer: String,
    models: Vec<String>,
    embedding_dimensions: usize,
    failing: bool,
}

impl MockKnowledgeSource {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            models: vec![
                "llama3.1:latest".to_string(),
                "nomic-embed-text:latest".to_string(),
            ],
            embedding_dimensions: 768,
            failing: false,
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Every call fails as an unreachable service would.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(OrchestrationError::KnowledgeError(
                SERVICE_UNAVAILABLE.to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for MockKnowledgeSource {
    fn model(&self) -> &str {
        "llama3.1"
    }

    fn embedding_model(&self) -> &str {
        "nomic-embed-text"
    }

    async fn answer(&self, _query: &str, _plan: Option<&ExecutionPlan>) -> Result<KnowledgeAnswer> {
        self.check()?;

        Ok(KnowledgeAnswer {
            answer: self.answer.clone(),
            source: "mock".to_string(),
            confidence: 80.0,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check()?;
        let seed = text.len() as f32;
        Ok((0..self.embedding_dimensions)
            .map(|i| (seed + i as f32).sin())
            .collect())
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.models.clone())
    }
}
