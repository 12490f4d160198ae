//! Error types for the ICT backtesting orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Selection error: {0}")]
    SelectionError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Function {name} not found")]
    FunctionNotFound {
        name: String,
        alternatives: Vec<String>,
    },

    #[error("Execution of {function} timed out after {timeout_ms} ms")]
    Timeout { function: String, timeout_ms: u64 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid {axis}: {value}")]
    InvalidParameter { axis: &'static str, value: String },

    // =============================
    // Collaborators & Setup
    // =============================

    /// Fixed reason only; transport details are logged where they occur.
    #[error("Knowledge service error: {0}")]
    KnowledgeError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Message safe to hand back to callers. Lower-layer details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            OrchestrationError::SqlError(_) | OrchestrationError::DatabaseError(_) => {
                "Database error: function execution failed".to_string()
            }
            OrchestrationError::HttpError(_) => "Upstream service request failed".to_string(),
            OrchestrationError::IoError(_) => "I/O failure during execution".to_string(),
            other => other.to_string(),
        }
    }
}
