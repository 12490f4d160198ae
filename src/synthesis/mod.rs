//! Response synthesizer
//!
//! Folds the selection, the execution outcome and the validation result
//! into the terminal [`StructuredResponse`]. Always produces a well-formed
//! response, whatever happened upstream.

use crate::models::{
    ExecutionOutcome, ExecutionPlan, ExecutionStatus, FunctionSelection, ResponseMetadata,
    StructuredResponse, ValidationResult,
};
use serde_json::{json, Map, Value};
use tracing::debug;

const SUCCESS_CONFIDENCE: f64 = 75.0;
const HIGH_CONFIDENCE: f64 = 90.0;
const SMALL_SAMPLE: usize = 20;

pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    pub fn synthesize(
        selection: &FunctionSelection,
        outcome: &ExecutionOutcome,
        validation: Option<&ValidationResult>,
        plan: &ExecutionPlan,
    ) -> StructuredResponse {
        let (parameters, rows, execution_time_ms) = match outcome {
            ExecutionOutcome::Failed {
                error,
                alternatives,
                ..
            } => {
                let mut response =
                    StructuredResponse::failed(selection.recommended_function.clone(), error.clone());
                if !alternatives.is_empty() {
                    response.recommendations.push(format!(
                        "Try one of the available functions: {}",
                        alternatives.join(", ")
                    ));
                }
                debug!(function = %selection.recommended_function, "Synthesized failed response");
                return response;
            }
            ExecutionOutcome::Completed {
                parameters,
                rows,
                execution_time_ms,
                ..
            } => (parameters, rows, *execution_time_ms),
        };

        let missing;
        let validation = match validation {
            Some(v) => v,
            None => {
                missing = ValidationResult::degraded(
                    "Validation error: no validation result available".to_string(),
                );
                &missing
            }
        };

        let status = derive_status(validation);

        let mut summary = Map::new();
        summary.insert("total_records".to_string(), json!(rows.len()));
        summary.insert("analysis_type".to_string(), json!(plan.analysis_strategy));
        summary.insert("parameters_used".to_string(), Value::Object(parameters.clone()));

        let mut analysis_results = Map::new();
        analysis_results.insert(
            "function_output".to_string(),
            Value::Array(rows.iter().cloned().map(Value::Object).collect()),
        );
        analysis_results.insert("summary_stats".to_string(), Value::Object(summary));

        debug!(
            status = ?status,
            sample_size = validation.sample_size,
            confidence = validation.confidence_level,
            "Synthesized response"
        );

        StructuredResponse {
            execution_status: status,
            analysis_results,
            metadata: ResponseMetadata {
                sample_size: validation.sample_size,
                data_coverage: validation.data_coverage,
                confidence_level: validation.confidence_level,
                execution_time_ms,
                sql_function_used: selection.recommended_function.clone(),
                data_quality_score: validation.quality_score,
            },
            recommendations: recommendations(validation),
            warnings: validation.warnings.clone(),
            error_details: None,
        }
    }
}

/// Status for an execution that completed. Failed executions never get here.
fn derive_status(validation: &ValidationResult) -> ExecutionStatus {
    if validation.is_valid && validation.confidence_level > SUCCESS_CONFIDENCE {
        ExecutionStatus::Success
    } else if validation.sample_size > 0 {
        ExecutionStatus::Partial
    } else {
        ExecutionStatus::Failed
    }
}

fn recommendations(validation: &ValidationResult) -> Vec<String> {
    let mut out = Vec::new();

    let confidence = validation.confidence_level;
    if confidence > HIGH_CONFIDENCE {
        out.push("High confidence results - suitable for strategy validation".to_string());
    } else if confidence > SUCCESS_CONFIDENCE {
        out.push("Good confidence results - consider additional validation".to_string());
    } else {
        out.push("Low confidence - recommend broader analysis or different approach".to_string());
    }

    if validation.sample_size < SMALL_SAMPLE {
        out.push("Consider extending time range or using broader criteria for more data".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::sample_rows;
    use crate::models::{Parameters, QualityTier};
    use crate::validation::ResultValidator;

    fn selection(name: &str) -> FunctionSelection {
        FunctionSelection {
            recommended_function: name.to_string(),
            parameters: Parameters::new(),
            confidence: 85.0,
            alternative_functions: vec![],
            reasoning: "test".to_string(),
        }
    }

    fn completed(name: &str, n: usize) -> ExecutionOutcome {
        let mut parameters = Parameters::new();
        parameters.insert("timeframe".to_string(), json!("4h"));
        ExecutionOutcome::Completed {
            function_name: name.to_string(),
            parameters,
            rows: sample_rows(n),
            execution_time_ms: 37,
        }
    }

    #[test]
    fn test_gateway_failure_is_failed() {
        let outcome = ExecutionOutcome::Failed {
            function_name: "detect_fair_value_gaps".to_string(),
            error: "Database error: function execution failed".to_string(),
            alternatives: vec![],
            execution_time_ms: 12,
        };

        let response = ResponseSynthesizer::synthesize(
            &selection("detect_fair_value_gaps"),
            &outcome,
            None,
            &ExecutionPlan::default(),
        );

        assert_eq!(response.execution_status, ExecutionStatus::Failed);
        assert!(response.analysis_results.is_empty());
        assert_eq!(response.metadata.sample_size, 0);
        assert_eq!(response.metadata.execution_time_ms, 0);
        assert_eq!(response.metadata.sql_function_used, "detect_fair_value_gaps");
        assert!(!response.error_details.unwrap().is_empty());
        assert!(response.recommendations.is_empty());
    }

    #[test]
    fn test_unknown_function_recommends_alternatives() {
        let outcome = ExecutionOutcome::Failed {
            function_name: "nope".to_string(),
            error: "Function nope not found".to_string(),
            alternatives: vec!["a".to_string(), "b".to_string()],
            execution_time_ms: 0,
        };

        let response = ResponseSynthesizer::synthesize(
            &selection("nope"),
            &outcome,
            None,
            &ExecutionPlan::default(),
        );
        assert_eq!(response.recommendations, vec!["Try one of the available functions: a, b"]);
    }

    #[test]
    fn test_balanced_25_rows_is_partial() {
        let rows = sample_rows(25);
        let validation = ResultValidator::validate(&rows, QualityTier::Balanced);
        let response = ResponseSynthesizer::synthesize(
            &selection("update_order_block_performance"),
            &completed("update_order_block_performance", 25),
            Some(&validation),
            &ExecutionPlan::default(),
        );

        assert_eq!(response.execution_status, ExecutionStatus::Partial);
        assert_eq!(response.metadata.confidence_level, 75.0);
        assert_eq!(response.metadata.data_coverage, 100.0);
        assert_eq!(response.metadata.execution_time_ms, 37);
        assert_eq!(
            response.recommendations,
            vec!["Low confidence - recommend broader analysis or different approach"]
        );
        assert_eq!(response.analysis_results["summary_stats"]["total_records"], 25);
        assert_eq!(
            response.analysis_results["summary_stats"]["analysis_type"],
            "performance_analysis"
        );
        assert_eq!(
            response.analysis_results["function_output"].as_array().unwrap().len(),
            25
        );
    }

    #[test]
    fn test_high_confidence_tier_is_success() {
        let validation = ResultValidator::validate(&sample_rows(30), QualityTier::HighConfidence);
        let response = ResponseSynthesizer::synthesize(
            &selection("update_order_block_performance"),
            &completed("update_order_block_performance", 30),
            Some(&validation),
            &ExecutionPlan::default(),
        );

        assert_eq!(response.execution_status, ExecutionStatus::Success);
        assert_eq!(
            response.recommendations,
            vec!["Good confidence results - consider additional validation"]
        );
        assert!(response.warnings.is_empty());
    }

    #[test]
    fn test_empty_completion_is_failed_without_error_details() {
        let validation = ResultValidator::validate(&[], QualityTier::BroadCoverage);
        let response = ResponseSynthesizer::synthesize(
            &selection("analyze_session_performance"),
            &completed("analyze_session_performance", 0),
            Some(&validation),
            &ExecutionPlan::default(),
        );

        assert_eq!(response.execution_status, ExecutionStatus::Failed);
        assert!(response.error_details.is_none());
        assert_eq!(response.warnings, validation.warnings);
        assert_eq!(response.recommendations.len(), 2);
    }

    #[test]
    fn test_small_sample_recommends_broader_criteria() {
        let validation = ResultValidator::validate(&sample_rows(6), QualityTier::BroadCoverage);
        let response = ResponseSynthesizer::synthesize(
            &selection("detect_fair_value_gaps"),
            &completed("detect_fair_value_gaps", 6),
            Some(&validation),
            &ExecutionPlan::default(),
        );

        // 6 >= 5 gives full coverage but confidence stays at 60.
        assert_eq!(response.execution_status, ExecutionStatus::Partial);
        assert_eq!(
            response.recommendations.last().unwrap(),
            "Consider extending time range or using broader criteria for more data"
        );
    }

    #[test]
    fn test_wire_round_trip() {
        let validation = ResultValidator::validate(&sample_rows(12), QualityTier::Balanced);
        let response = ResponseSynthesizer::synthesize(
            &selection("update_order_block_performance"),
            &completed("update_order_block_performance", 12),
            Some(&validation),
            &ExecutionPlan::default(),
        );

        let wire = serde_json::to_string(&response).unwrap();
        let parsed: StructuredResponse = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, response);
    }
}
