//! PostgreSQL executor
//!
//! Analytical functions live in the database as set-returning functions that
//! take a single `jsonb` argument. Each result row is converted to a JSON
//! object in column order.

use super::FunctionExecutor;
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::{Parameters, Row};
use crate::Result;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

pub struct PgFunctionExecutor {
    pool: PgPool,
}

impl PgFunctionExecutor {
    /// Build a lazily connecting pool. Connection problems surface on first use.
    pub fn connect_lazy(settings: &Settings) -> Result<Self> {
        info!(
            url = %mask_database_url(&settings.database_url),
            min = settings.database_pool_min_size,
            max = settings.database_pool_max_size,
            "Creating database pool"
        );

        let pool = PgPoolOptions::new()
            .min_connections(settings.database_pool_min_size)
            .max_connections(settings.database_pool_max_size)
            .acquire_timeout(settings.database_command_timeout)
            .connect_lazy(&settings.database_url)?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl FunctionExecutor for PgFunctionExecutor {
    async fn execute(&self, function_name: &str, parameters: &Parameters) -> Result<Vec<Row>> {
        let sql = function_call_sql(function_name)?;
        debug!(sql = %sql, "Calling database function");

        let values: Vec<Value> = sqlx::query_scalar::<_, Value>(&sql)
            .bind(Value::Object(parameters.clone()))
            .fetch_all(&self.pool)
            .await?;

        Ok(values.into_iter().map(into_row).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Database pool closed");
        }
    }
}

/// SQL for calling `function_name`. The name is interpolated, so it must be
/// a plain identifier.
fn function_call_sql(function_name: &str) -> Result<String> {
    let valid = !function_name.is_empty()
        && function_name.len() <= 63
        && function_name
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c == '_')
        && function_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid {
        return Err(OrchestrationError::ExecutionError(format!(
            "'{}' is not a valid function identifier",
            function_name
        )));
    }

    Ok(format!(
        "SELECT to_jsonb(t) FROM {}($1::jsonb) AS t",
        function_name
    ))
}

fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

/// Hide the password part of a connection URL for logging.
fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let Some(at) = url.rfind('@') else {
        return url.to_string();
    };

    let credentials = &url[scheme_end + 3..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &credentials[..colon],
            &url[at..]
        ),
        None => url.to_string(),
    }
}
