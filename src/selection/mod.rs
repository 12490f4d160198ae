//! Function selector
//!
//! Picks one registered analytical function for a plan and derives its
//! concrete parameters. Selection never fails outward: any fault yields a
//! degraded selection pointing at the default function.

use crate::error::OrchestrationError;
use crate::models::{
    AnalysisStrategy, FunctionSelection, Parameters, QualityTier, Timeframe, TradingContext,
};
use crate::registry::FunctionRegistry;
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Function used when nothing else can be chosen.
pub const DEFAULT_FUNCTION: &str = "update_order_block_performance";

const SELECTION_CONFIDENCE: f64 = 85.0;
const DEGRADED_CONFIDENCE: f64 = 50.0;
const MAX_ALTERNATIVES: usize = 3;

pub struct FunctionSelector {
    registry: Arc<FunctionRegistry>,
}

impl FunctionSelector {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// Select a function for typed planning fields
    pub fn select(
        &self,
        strategy: AnalysisStrategy,
        context: TradingContext,
        quality: QualityTier,
    ) -> FunctionSelection {
        self.try_select(strategy, context, quality)
            .unwrap_or_else(|e| degraded_selection(&e))
    }

    /// Select from wire strings. Unknown values produce a degraded selection.
    pub fn select_raw(&self, strategy: &str, context: &str, quality: &str) -> FunctionSelection {
        let parsed = strategy
            .parse::<AnalysisStrategy>()
            .and_then(|s| Ok((s, context.parse::<TradingContext>()?)))
            .and_then(|(s, c)| Ok((s, c, quality.parse::<QualityTier>()?)));

        match parsed {
            Ok((s, c, q)) => self.select(s, c, q),
            Err(e) => degraded_selection(&e),
        }
    }

    fn try_select(
        &self,
        strategy: AnalysisStrategy,
        context: TradingContext,
        quality: QualityTier,
    ) -> Result<FunctionSelection> {
        let mut suggested = self.registry.suggest(strategy, context);
        if suggested.is_empty() {
            suggested = self.registry.names();
        }

        let recommended = preferred_functions(strategy)
            .iter()
            .find(|name| suggested.iter().any(|s| s == *name))
            .map(|name| name.to_string())
            .or_else(|| suggested.first().cloned())
            .unwrap_or_else(|| DEFAULT_FUNCTION.to_string());

        if recommended.trim().is_empty() {
            return Err(OrchestrationError::SelectionError(
                "registry produced an empty function name".to_string(),
            ));
        }

        let mut parameters = Parameters::new();
        parameters.insert("timeframe".to_string(), json!(timeframe_for(context).as_str()));
        parameters.insert(
            "min_sample_size".to_string(),
            json!(quality.thresholds().min_sample),
        );

        debug!(
            function = %recommended,
            strategy = %strategy,
            context = %context,
            candidates = suggested.len(),
            "Function selected"
        );

        Ok(FunctionSelection {
            reasoning: format!(
                "Selected {} for {} with {} context",
                recommended, strategy, context
            ),
            recommended_function: recommended,
            parameters,
            confidence: SELECTION_CONFIDENCE,
            alternative_functions: suggested.into_iter().take(MAX_ALTERNATIVES).collect(),
        })
    }
}

/// Two preferred functions per strategy, in priority order.
fn preferred_functions(strategy: AnalysisStrategy) -> [&'static str; 2] {
    match strategy {
        AnalysisStrategy::PerformanceAnalysis => {
            ["update_order_block_performance", "analyze_session_performance"]
        }
        AnalysisStrategy::CorrelationStudy => {
            ["detect_fair_value_gaps", "analyze_session_performance"]
        }
        AnalysisStrategy::StructureDetection => {
            ["detect_fair_value_gaps", "update_order_block_performance"]
        }
    }
}

pub fn timeframe_for(context: TradingContext) -> Timeframe {
    match context {
        TradingContext::Scalping => Timeframe::M15,
        TradingContext::SwingTrading => Timeframe::H4,
        TradingContext::PositionAnalysis => Timeframe::D1,
    }
}

fn degraded_selection(error: &OrchestrationError) -> FunctionSelection {
    warn!(error = %error, "Function selection failed, using fallback");

    let mut parameters = Parameters::new();
    parameters.insert("timeframe".to_string(), json!(Timeframe::H4.as_str()));
    parameters.insert(
        "min_sample_size".to_string(),
        json!(QualityTier::Balanced.thresholds().min_sample),
    );

    FunctionSelection {
        recommended_function: DEFAULT_FUNCTION.to_string(),
        parameters,
        confidence: DEGRADED_CONFIDENCE,
        alternative_functions: Vec::new(),
        reasoning: format!("Fallback selection due to error: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_function;

    fn demo_selector() -> FunctionSelector {
        FunctionSelector::new(Arc::new(FunctionRegistry::demo()))
    }

    #[test]
    fn test_performance_prefers_order_blocks() {
        let selection = demo_selector().select(
            AnalysisStrategy::PerformanceAnalysis,
            TradingContext::Scalping,
            QualityTier::HighConfidence,
        );

        assert_eq!(selection.recommended_function, "update_order_block_performance");
        assert_eq!(selection.parameters["timeframe"], "15m");
        assert_eq!(selection.parameters["min_sample_size"], 20);
        assert_eq!(selection.confidence, 85.0);
        assert_eq!(
            selection.alternative_functions,
            vec!["update_order_block_performance", "analyze_session_performance"]
        );
        assert_eq!(
            selection.reasoning,
            "Selected update_order_block_performance for performance_analysis with scalping context"
        );
    }

    #[test]
    fn test_structure_detection_uses_all_functions_then_preference() {
        let selection = demo_selector().select(
            AnalysisStrategy::StructureDetection,
            TradingContext::PositionAnalysis,
            QualityTier::BroadCoverage,
        );

        assert_eq!(selection.recommended_function, "detect_fair_value_gaps");
        assert_eq!(selection.parameters["timeframe"], "1d");
        assert_eq!(selection.parameters["min_sample_size"], 5);
        assert_eq!(selection.alternative_functions.len(), 3);
    }

    #[test]
    fn test_first_suggestion_when_no_preferred_match() {
        let registry = FunctionRegistry::from_declarations(vec![
            test_function("measure_pair_correlation", "correlation"),
            test_function("rolling_beta", "correlation"),
        ]);
        let selector = FunctionSelector::new(Arc::new(registry));

        let selection = selector.select(
            AnalysisStrategy::CorrelationStudy,
            TradingContext::SwingTrading,
            QualityTier::Balanced,
        );
        assert_eq!(selection.recommended_function, "measure_pair_correlation");
        assert_eq!(selection.parameters["timeframe"], "4h");
        assert_eq!(selection.parameters["min_sample_size"], 10);
    }

    #[test]
    fn test_empty_registry_uses_default_function() {
        let selector = FunctionSelector::new(Arc::new(FunctionRegistry::from_declarations(
            Vec::new(),
        )));

        let selection = selector.select(
            AnalysisStrategy::CorrelationStudy,
            TradingContext::Scalping,
            QualityTier::Balanced,
        );
        assert_eq!(selection.recommended_function, DEFAULT_FUNCTION);
        assert!(!selection.recommended_function.is_empty());
        assert!(selection.alternative_functions.is_empty());
        assert_eq!(selection.confidence, 85.0);
    }

    #[test]
    fn test_empty_function_name_degrades() {
        let registry = FunctionRegistry::from_declarations(vec![test_function("", "order_blocks")]);
        let selector = FunctionSelector::new(Arc::new(registry));

        let selection = selector.select(
            AnalysisStrategy::PerformanceAnalysis,
            TradingContext::Scalping,
            QualityTier::HighConfidence,
        );
        assert_eq!(selection.recommended_function, DEFAULT_FUNCTION);
        assert_eq!(selection.confidence, 50.0);
        assert_eq!(selection.parameters["timeframe"], "4h");
        assert_eq!(selection.parameters["min_sample_size"], 10);
        assert!(selection.reasoning.starts_with("Fallback selection due to error"));
    }

    #[test]
    fn test_select_raw_unknown_values_degrade() {
        let selector = demo_selector();

        let ok = selector.select_raw("correlation_study", "swing_trading", "balanced");
        assert_eq!(ok.recommended_function, "detect_fair_value_gaps");
        assert_eq!(ok.confidence, 85.0);

        let degraded = selector.select_raw("momentum", "swing_trading", "balanced");
        assert_eq!(degraded.recommended_function, DEFAULT_FUNCTION);
        assert_eq!(degraded.confidence, 50.0);
        assert!(degraded.alternative_functions.is_empty());
        assert!(degraded.reasoning.contains("momentum"));
    }
}
