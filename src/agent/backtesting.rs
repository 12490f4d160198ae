//! Backtesting pipeline
//!
//! PLAN → SELECT → PREPARE → EXECUTE → VALIDATE → SYNTHESIZE
//!
//! Strictly sequential per request. Each stage degrades on its own, so the
//! pipeline always ends in a [`StructuredResponse`].

use crate::execution::ExecutionGateway;
use crate::models::{
    ExecutionOutcome, ExecutionPlan, FunctionSelection, Parameters, StructuredResponse, Timeframe,
};
use crate::selection::FunctionSelector;
use crate::synthesis::ResponseSynthesizer;
use crate::validation::ResultValidator;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

/// Function name reported when a request never reached selection.
const NO_FUNCTION: &str = "none";

/// Result of one pipeline pass, with its trace
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub selection: FunctionSelection,
    pub response: StructuredResponse,
    pub trace: Vec<String>,
}

pub struct BacktestingPipeline {
    selector: FunctionSelector,
    gateway: ExecutionGateway,
}

impl BacktestingPipeline {
    pub fn new(selector: FunctionSelector, gateway: ExecutionGateway) -> Self {
        Self { selector, gateway }
    }

    /// Plan in, structured response out.
    pub async fn process_plan(&self, plan: &ExecutionPlan) -> StructuredResponse {
        self.run(plan).await.response
    }

    /// Plan as raw JSON. Unparsable input yields a failed response.
    pub async fn process_request_json(&self, raw: &str) -> StructuredResponse {
        match serde_json::from_str::<ExecutionPlan>(raw) {
            Ok(plan) => self.process_plan(&plan).await,
            Err(e) => {
                warn!(error = %e, "Rejected malformed plan");
                StructuredResponse::failed(NO_FUNCTION, format!("Processing error: {}", e))
            }
        }
    }

    pub async fn run(&self, plan: &ExecutionPlan) -> PipelineRun {
        let start = Instant::now();
        let mut trace = Vec::new();

        // === SELECT ===
        let selection = self.selector.select(
            plan.analysis_strategy,
            plan.trading_context,
            plan.quality_requirements,
        );
        trace.push(format!(
            "SELECT: {} ({:.0}% confidence)",
            selection.recommended_function, selection.confidence
        ));

        // === PREPARE ===
        let parameters = prepare_parameters(&selection, plan, &mut trace);

        // === EXECUTE ===
        let outcome = self
            .gateway
            .execute(&selection.recommended_function, parameters)
            .await;

        // === VALIDATE ===
        let validation = match &outcome {
            ExecutionOutcome::Completed {
                rows,
                execution_time_ms,
                ..
            } => {
                trace.push(format!(
                    "EXECUTE: {} - {} rows in {} ms",
                    outcome.function_name(),
                    rows.len(),
                    execution_time_ms
                ));
                let validation = ResultValidator::validate(rows, plan.quality_requirements);
                trace.push(format!(
                    "VALIDATE: valid={} confidence={:.1} coverage={:.1}",
                    validation.is_valid, validation.confidence_level, validation.data_coverage
                ));
                Some(validation)
            }
            ExecutionOutcome::Failed { error, .. } => {
                trace.push(format!("EXECUTE: {} failed - {}", outcome.function_name(), error));
                None
            }
        };

        // === SYNTHESIZE ===
        let response =
            ResponseSynthesizer::synthesize(&selection, &outcome, validation.as_ref(), plan);
        trace.push(format!("SYNTHESIZE: {:?}", response.execution_status));

        info!(
            function = %selection.recommended_function,
            status = ?response.execution_status,
            sample_size = response.metadata.sample_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Backtesting pipeline completed"
        );

        PipelineRun {
            selection,
            response,
            trace,
        }
    }
}

/// Merge selection parameters with the plan's explicit overrides.
fn prepare_parameters(
    selection: &FunctionSelection,
    plan: &ExecutionPlan,
    trace: &mut Vec<String>,
) -> Parameters {
    let mut parameters = selection.parameters.clone();

    if let Some(symbol) = plan.symbol {
        parameters.insert("symbol".to_string(), json!(symbol.as_str().to_lowercase()));
    }

    if let Some(timeframe) = plan.timeframe {
        parameters.insert("timeframe".to_string(), json!(timeframe.as_str()));
    }

    if let Some(session) = plan.session {
        let timeframe = parameters
            .get("timeframe")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Timeframe>().ok());

        match timeframe {
            Some(tf) if tf.is_intraday() => {
                parameters.insert("session".to_string(), json!(session.as_str()));
            }
            _ => {
                warn!(
                    session = %session,
                    timeframe = ?timeframe,
                    "Session filter needs an intraday timeframe, dropping it"
                );
                trace.push(format!(
                    "PREPARE: dropped {} session filter for non-intraday timeframe",
                    session
                ));
            }
        }
    }

    parameters
}
