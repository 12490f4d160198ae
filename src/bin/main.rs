use ict_backtesting_orchestrator::{
    agent::{BacktestingPipeline, Coordinator},
    audit::AuditLog,
    config::Settings,
    execution::{ExecutionGateway, FunctionExecutor, PgFunctionExecutor},
    knowledge::{KnowledgeSource, OllamaClient},
    planner::KeywordPlanner,
    registry::FunctionRegistry,
    selection::FunctionSelector,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SAMPLE_QUERY: &str = "What is the success rate of London order blocks on EURUSD?";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let query = if args.is_empty() {
        SAMPLE_QUERY.to_string()
    } else {
        args.join(" ")
    };

    info!("ICT Backtesting Orchestrator starting");

    // Create components
    let registry = Arc::new(FunctionRegistry::load(&settings.function_signatures_path));
    let executor: Arc<dyn FunctionExecutor> = Arc::new(PgFunctionExecutor::connect_lazy(&settings)?);
    let knowledge: Arc<dyn KnowledgeSource> = Arc::new(OllamaClient::new(&settings)?);

    let pipeline = BacktestingPipeline::new(
        FunctionSelector::new(registry.clone()),
        ExecutionGateway::new(registry, executor.clone(), settings.database_command_timeout),
    );

    let coordinator = Coordinator::new(
        Box::new(KeywordPlanner),
        pipeline,
        knowledge,
        Arc::new(AuditLog::with_capacity(settings.audit_max_records)),
    );

    info!(query = %query, "Running coordinator");

    let result = coordinator.run(&query).await;
    executor.close().await;

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            eprintln!("\nReasoning Trace:");
            for (i, trace) in outcome.reasoning_trace.iter().enumerate() {
                eprintln!("  {}: {}", i + 1, trace);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Coordinator run failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
