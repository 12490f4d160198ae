//! REST API Server for the ICT backtesting orchestrator
//!
//! Exposes the coordinator, the backtesting pipeline, health probes and the
//! audit trail over HTTP.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Coordinator;
use crate::health::HealthChecker;
use crate::registry::FunctionRegistry;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    /// Expected to be a string; anything else is answered with degraded defaults.
    #[serde(default)]
    pub query: Value,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditListParams {
    pub limit: Option<usize>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub health: Arc<HealthChecker>,
    pub registry: Arc<FunctionRegistry>,
}

/// =============================
/// Health Endpoints
/// =============================

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn service_health(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let report = state.health.check().await;
    (StatusCode::OK, Json(ApiResponse::success(report)))
}

/// =============================
/// Registry Endpoint
/// =============================

async fn list_functions(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let source = match state.registry.source() {
        crate::registry::RegistrySource::Declarations(path) => path.display().to_string(),
        crate::registry::RegistrySource::Demo => "demo".to_string(),
        crate::registry::RegistrySource::Inline => "inline".to_string(),
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "source": source,
            "count": state.registry.len(),
            "functions": state.registry.functions(),
        }))),
    )
}

/// =============================
/// Coordinator Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received query request");

    match state.coordinator.run_value(&req.query).await {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => {
            warn!(error = %e, "Coordinator run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!(
                    "Query processing failed: {}",
                    e.public_message()
                ))),
            )
        }
    }
}

/// =============================
/// Backtest Endpoint
/// =============================

/// Body is taken raw so malformed plans come back as a failed response.
async fn run_backtest(State(state): State<ApiState>, body: String) -> (StatusCode, Json<ApiResponse>) {
    let response = state
        .coordinator
        .pipeline()
        .process_request_json(&body)
        .await;
    (StatusCode::OK, Json(ApiResponse::success(response)))
}

/// =============================
/// Audit Endpoints
/// =============================

const DEFAULT_AUDIT_PAGE: usize = 20;

async fn list_audit(
    State(state): State<ApiState>,
    Query(params): Query<AuditListParams>,
) -> (StatusCode, Json<ApiResponse>) {
    let audit_log = state.coordinator.audit_log();
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_PAGE);

    match audit_log.list_recent(limit).await {
        Ok(records) => {
            let entries: Vec<Value> = records
                .iter()
                .map(|record| {
                    serde_json::json!({
                        "audit_id": record.audit_id,
                        "query": record.query,
                        "routing_decision": record.classification.routing_decision,
                        "execution_status": record.response.as_ref().map(|r| r.execution_status),
                        "knowledge_consulted": record.knowledge_consulted,
                        "created_at": record.created_at,
                    })
                })
                .collect();

            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "total": audit_log.count().await,
                    "capacity": audit_log.capacity(),
                    "records": entries,
                }))),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.public_message())),
        ),
    }
}

async fn get_audit(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(audit_id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid audit id: {}", id))),
        );
    };

    let audit_log = state.coordinator.audit_log();
    let lookup = async {
        let record = audit_log.get(audit_id).await?;
        let verified = audit_log.verify_integrity(audit_id).await?;
        Ok::<_, crate::error::OrchestrationError>((record, verified))
    };

    match lookup.await {
        Ok((Some(record), verified)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "record": record,
                "integrity_verified": verified,
            }))),
        ),
        Ok((None, _)) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Audit record {} not found", audit_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.public_message())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health/services", get(service_health))
        .route("/api/functions", get(list_functions))
        .route("/api/query", post(run_query))
        .route("/api/backtest", post(run_backtest))
        .route("/api/audit", get(list_audit))
        .route("/api/audit/:id", get(get_audit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server<F>(
    state: ApiState,
    port: u16,
    shutdown: F,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
