//! Planner trait and implementations
//!
//! A planner turns a free-text question into an [`ExecutionPlan`] bounded by
//! the closed parameter sets. The shipped implementation is keyword driven
//! and fully deterministic: the same text always yields the same plan.

use crate::classifier::json_kind;
use crate::models::{
    AnalysisStrategy, AssetFocus, ExecutionPlan, QualityTier, QueryClassification, Session,
    SessionRelevance, Symbol, TemporalScope, Timeframe, TradingContext,
};
use crate::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Trait for plan formulation
pub trait Planner: Send + Sync {
    /// Formulate a plan. The classification is informational only.
    fn formulate(&self, query: &str, classification: &QueryClassification)
        -> Result<ExecutionPlan>;

    /// Formulate from loosely typed input; non-string input yields the default plan.
    fn formulate_value(
        &self,
        input: &Value,
        classification: &QueryClassification,
    ) -> ExecutionPlan {
        let Some(query) = input.as_str() else {
            warn!(input_kind = json_kind(input), "Plan input is not a string, using default plan");
            return ExecutionPlan::default();
        };

        self.formulate(query, classification).unwrap_or_else(|e| {
            warn!(error = %e, "Plan formulation failed, using default plan");
            ExecutionPlan::default()
        })
    }
}

/// Ordered trigger lists. First matching list wins.
const PERFORMANCE_TRIGGERS: &[&str] = &["performance", "success", "win rate", "profit"];
const CORRELATION_TRIGGERS: &[&str] = &["correlation", "relationship", "compare"];

const SCALPING_TRIGGERS: &[&str] = &["scalp", "minute", "quick", "fast"];
const SWING_TRIGGERS: &[&str] = &["swing", "daily", "day", "week"];

const RECENT_TRIGGERS: &[&str] = &["recent", "latest", "current", "today"];
const HISTORICAL_TRIGGERS: &[&str] = &["historical", "past", "history", "long term"];

const SPECIFIC_SESSION_TRIGGERS: &[&str] = &["london", "new york", "asian", "session"];
const LIQUIDITY_TRIGGERS: &[&str] = &["liquid", "volume", "active"];

const HIGH_CONFIDENCE_TRIGGERS: &[&str] = &["accurate", "precise", "confident", "reliable"];
const BROAD_COVERAGE_TRIGGERS: &[&str] = &["broad", "comprehensive", "all", "everything"];

const SESSION_NAMES: &[(&str, Session)] = &[
    ("london", Session::London),
    ("new york", Session::NewYork),
    ("asian", Session::Asian),
];

/// Deterministic keyword planner
pub struct KeywordPlanner;

impl Planner for KeywordPlanner {
    fn formulate(
        &self,
        query: &str,
        classification: &QueryClassification,
    ) -> Result<ExecutionPlan> {
        let text = query.to_lowercase();

        let symbol = find_symbol(&text);
        let timeframe = find_timeframe(&text);
        let mut session = find_session(&text);

        if let (Some(tf), Some(s)) = (timeframe, session) {
            if !tf.is_intraday() {
                warn!(
                    timeframe = %tf,
                    session = %s,
                    "Session requested for a non-intraday timeframe, dropping session"
                );
                session = None;
            }
        }

        let plan = ExecutionPlan {
            analysis_strategy: analysis_strategy(&text),
            trading_context: trading_context(&text),
            temporal_scope: temporal_scope(&text),
            asset_focus: asset_focus(symbol),
            session_relevance: session_relevance(&text),
            quality_requirements: quality_requirements(&text),
            symbol,
            timeframe,
            session,
        };

        debug!(
            routing = %classification.routing_decision,
            strategy = %plan.analysis_strategy,
            context = %plan.trading_context,
            quality = %plan.quality_requirements,
            symbol = ?plan.symbol,
            "Plan formulated"
        );

        Ok(plan)
    }
}

fn contains_any(text: &str, triggers: &[&str]) -> bool {
    triggers.iter().any(|t| text.contains(t))
}

fn analysis_strategy(text: &str) -> AnalysisStrategy {
    if contains_any(text, PERFORMANCE_TRIGGERS) {
        AnalysisStrategy::PerformanceAnalysis
    } else if contains_any(text, CORRELATION_TRIGGERS) {
        AnalysisStrategy::CorrelationStudy
    } else {
        AnalysisStrategy::StructureDetection
    }
}

fn trading_context(text: &str) -> TradingContext {
    if contains_any(text, SCALPING_TRIGGERS) {
        TradingContext::Scalping
    } else if contains_any(text, SWING_TRIGGERS) {
        TradingContext::SwingTrading
    } else {
        TradingContext::PositionAnalysis
    }
}

fn temporal_scope(text: &str) -> TemporalScope {
    if contains_any(text, RECENT_TRIGGERS) {
        TemporalScope::RecentPerformance
    } else if contains_any(text, HISTORICAL_TRIGGERS) {
        TemporalScope::HistoricalPattern
    } else {
        TemporalScope::RecentPerformance
    }
}

/// Major-currency mentions and the fallback both resolve to major pairs;
/// cross pairs are never inferred from text.
fn asset_focus(symbol: Option<Symbol>) -> AssetFocus {
    match symbol {
        Some(_) => AssetFocus::SpecificSymbol,
        None => AssetFocus::MajorPairs,
    }
}

fn session_relevance(text: &str) -> SessionRelevance {
    if contains_any(text, SPECIFIC_SESSION_TRIGGERS) {
        SessionRelevance::SpecificSession
    } else if contains_any(text, LIQUIDITY_TRIGGERS) {
        SessionRelevance::HighLiquidity
    } else {
        SessionRelevance::AllSessions
    }
}

fn quality_requirements(text: &str) -> QualityTier {
    if contains_any(text, HIGH_CONFIDENCE_TRIGGERS) {
        QualityTier::HighConfidence
    } else if contains_any(text, BROAD_COVERAGE_TRIGGERS) {
        QualityTier::BroadCoverage
    } else {
        QualityTier::Balanced
    }
}

/// First symbol in scan order whose code appears anywhere in the text.
fn find_symbol(text: &str) -> Option<Symbol> {
    Symbol::ALL
        .iter()
        .copied()
        .find(|s| text.contains(&s.as_str().to_lowercase()))
}

fn find_session(text: &str) -> Option<Session> {
    SESSION_NAMES
        .iter()
        .find(|(name, _)| text.contains(name))
        .map(|(_, session)| *session)
}

/// First whole token naming a timeframe ("4h", "1d", ...).
fn find_timeframe(text: &str) -> Option<Timeframe> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<Timeframe>().ok())
}
