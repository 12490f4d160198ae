use ict_backtesting_orchestrator::{
    agent::{BacktestingPipeline, Coordinator},
    api::{start_server, ApiState},
    audit::AuditLog,
    config::Settings,
    execution::{ExecutionGateway, FunctionExecutor, PgFunctionExecutor},
    health::HealthChecker,
    knowledge::{KnowledgeSource, OllamaClient},
    planner::KeywordPlanner,
    registry::FunctionRegistry,
    selection::FunctionSelector,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load settings (.env first)
    let settings = Settings::from_env()?;

    // Initialize tracing
    let default_level = if settings.debug_mode {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("ICT Backtesting Orchestrator - API Server");
    info!("Port: {}", settings.api_port);

    // Create components
    let registry = Arc::new(FunctionRegistry::load(&settings.function_signatures_path));
    let executor: Arc<dyn FunctionExecutor> = Arc::new(PgFunctionExecutor::connect_lazy(&settings)?);
    let knowledge: Arc<dyn KnowledgeSource> = Arc::new(OllamaClient::new(&settings)?);

    let pipeline = BacktestingPipeline::new(
        FunctionSelector::new(registry.clone()),
        ExecutionGateway::new(
            registry.clone(),
            executor.clone(),
            settings.database_command_timeout,
        ),
    );

    let coordinator = Arc::new(Coordinator::new(
        Box::new(KeywordPlanner),
        pipeline,
        knowledge.clone(),
        Arc::new(AuditLog::with_capacity(settings.audit_max_records)),
    ));

    let health = Arc::new(HealthChecker::new(
        knowledge,
        executor.clone(),
        Duration::from_secs(5),
        settings.vector_dimensions,
    ));

    info!(
        function_count = registry.len(),
        "Coordinator initialized, starting API server"
    );

    let state = ApiState {
        coordinator,
        health,
        registry,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    start_server(state, settings.api_port, shutdown).await?;

    executor.close().await;

    Ok(())
}
