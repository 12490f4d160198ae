//! Core data models for the ICT backtesting orchestrator
//!
//! Every request is bounded by the closed parameter sets below. The wire
//! names match the JSON contract exchanged with the coordinator and the
//! knowledge service.

use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single row returned by an analytical function, in collaborator order.
pub type Row = Map<String, Value>;

/// Concrete parameters handed to an analytical function.
pub type Parameters = Map<String, Value>;

/// Clamp a percentage or score into `[0, 100]`. NaN collapses to zero.
pub fn clamp_pct(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Wire-string plumbing shared by the closed parameter sets.
macro_rules! wire_enum {
    ($ty:ident, $axis:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = OrchestrationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| OrchestrationError::InvalidParameter {
                        axis: $axis,
                        value: s.to_string(),
                    })
            }
        }
    };
}

//
// ================= Parameter Enumerations =================
//

/// Instruments available in the OHLCV store.
///
/// `ALL` is ordered the way free text is scanned for a symbol mention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Symbol {
    EurUsd,
    GbpUsd,
    UsdJpy,
    AudUsd,
    UsdChf,
    UsdCad,
    NzdUsd,
    XauUsd,
    XagUsd,
    Us30,
    Nas100,
    Spx500,
    Uk100,
    Ger40,
    Jpn225,
}

wire_enum!(Symbol, "symbol", {
    EurUsd => "EURUSD",
    GbpUsd => "GBPUSD",
    UsdJpy => "USDJPY",
    AudUsd => "AUDUSD",
    UsdChf => "USDCHF",
    UsdCad => "USDCAD",
    NzdUsd => "NZDUSD",
    XauUsd => "XAUUSD",
    XagUsd => "XAGUSD",
    Us30 => "US30",
    Nas100 => "NAS100",
    Spx500 => "SPX500",
    Uk100 => "UK100",
    Ger40 => "GER40",
    Jpn225 => "JPN225",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

wire_enum!(Timeframe, "timeframe", {
    M15 => "15m",
    H1 => "1h",
    H4 => "4h",
    D1 => "1d",
    W1 => "1w",
});

impl Timeframe {
    /// Session data only exists for intraday bars.
    pub fn is_intraday(&self) -> bool {
        matches!(self, Timeframe::M15 | Timeframe::H1 | Timeframe::H4)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Session {
    London,
    #[serde(rename = "New York")]
    NewYork,
    Asian,
}

wire_enum!(Session, "session", {
    London => "London",
    NewYork => "New York",
    Asian => "Asian",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    PerformanceAnalysis,
    CorrelationStudy,
    StructureDetection,
}

wire_enum!(AnalysisStrategy, "analysis_strategy", {
    PerformanceAnalysis => "performance_analysis",
    CorrelationStudy => "correlation_study",
    StructureDetection => "structure_detection",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradingContext {
    Scalping,
    SwingTrading,
    PositionAnalysis,
}

wire_enum!(TradingContext, "trading_context", {
    Scalping => "scalping",
    SwingTrading => "swing_trading",
    PositionAnalysis => "position_analysis",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScope {
    RecentPerformance,
    HistoricalPattern,
    SpecificPeriod,
}

wire_enum!(TemporalScope, "temporal_scope", {
    RecentPerformance => "recent_performance",
    HistoricalPattern => "historical_pattern",
    SpecificPeriod => "specific_period",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetFocus {
    MajorPairs,
    CrossPairs,
    SpecificSymbol,
}

wire_enum!(AssetFocus, "asset_focus", {
    MajorPairs => "major_pairs",
    CrossPairs => "cross_pairs",
    SpecificSymbol => "specific_symbol",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionRelevance {
    HighLiquidity,
    AllSessions,
    SpecificSession,
}

wire_enum!(SessionRelevance, "session_relevance", {
    HighLiquidity => "high_liquidity",
    AllSessions => "all_sessions",
    SpecificSession => "specific_session",
});

/// Statistical strictness presets, strictest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    HighConfidence,
    Balanced,
    BroadCoverage,
}

wire_enum!(QualityTier, "quality_requirements", {
    HighConfidence => "high_confidence",
    Balanced => "balanced",
    BroadCoverage => "broad_coverage",
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_sample: usize,
    pub min_coverage_pct: f64,
    pub min_confidence_pct: f64,
}

impl QualityTier {
    pub fn thresholds(&self) -> QualityThresholds {
        let (min_sample, min_coverage_pct, min_confidence_pct) = match self {
            QualityTier::HighConfidence => (20, 80.0, 90.0),
            QualityTier::Balanced => (10, 70.0, 75.0),
            QualityTier::BroadCoverage => (5, 50.0, 60.0),
        };
        QualityThresholds {
            min_sample,
            min_coverage_pct,
            min_confidence_pct,
        }
    }

    /// Tier lookup for loosely typed input; unknown names fall back to `Balanced`.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or(QualityTier::Balanced)
    }
}

//
// ================= Classification =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingDecision {
    KnowledgeFirst,
    ExecutionFirst,
    Hybrid,
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingDecision::KnowledgeFirst => "knowledge-first",
            RoutingDecision::ExecutionFirst => "execution-first",
            RoutingDecision::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryClassification {
    pub routing_decision: RoutingDecision,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_approach: String,
}

//
// ================= Plan =================
//

/// Structured request handed from the coordinator to the backtesting pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub analysis_strategy: AnalysisStrategy,
    pub trading_context: TradingContext,
    pub temporal_scope: TemporalScope,
    pub asset_focus: AssetFocus,
    pub session_relevance: SessionRelevance,
    pub quality_requirements: QualityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self {
            analysis_strategy: AnalysisStrategy::PerformanceAnalysis,
            trading_context: TradingContext::SwingTrading,
            temporal_scope: TemporalScope::RecentPerformance,
            asset_focus: AssetFocus::MajorPairs,
            session_relevance: SessionRelevance::AllSessions,
            quality_requirements: QualityTier::Balanced,
            symbol: None,
            timeframe: None,
            session: None,
        }
    }
}

//
// ================= Registry =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Fast,
    Medium,
    Slow,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_return_type() -> String {
    "table".to_string()
}

/// Declaration of an analytical function exposed by the data store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredFunction {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub performance_tier: PerformanceTier,
    pub min_sample_size: u32,
}

//
// ================= Selection =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSelection {
    pub recommended_function: String,
    pub parameters: Parameters,
    pub confidence: f64,
    pub alternative_functions: Vec<String>,
    pub reasoning: String,
}

//
// ================= Execution =================
//

/// What the gateway hands back for one function call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        function_name: String,
        parameters: Parameters,
        rows: Vec<Row>,
        execution_time_ms: u64,
    },
    Failed {
        function_name: String,
        error: String,
        alternatives: Vec<String>,
        execution_time_ms: u64,
    },
}

impl ExecutionOutcome {
    pub fn function_name(&self) -> &str {
        match self {
            ExecutionOutcome::Completed { function_name, .. }
            | ExecutionOutcome::Failed { function_name, .. } => function_name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence_level: f64,
    pub sample_size: usize,
    pub data_coverage: f64,
    pub warnings: Vec<String>,
    pub quality_score: f64,
}

impl ValidationResult {
    /// All-invalid result carrying a single diagnostic.
    pub fn degraded(diagnostic: String) -> Self {
        Self {
            is_valid: false,
            confidence_level: 0.0,
            sample_size: 0,
            data_coverage: 0.0,
            warnings: vec![diagnostic],
            quality_score: 0.0,
        }
    }
}

//
// ================= Response =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMetadata {
    pub sample_size: usize,
    pub data_coverage: f64,
    pub confidence_level: f64,
    pub execution_time_ms: u64,
    pub sql_function_used: String,
    pub data_quality_score: f64,
}

impl ResponseMetadata {
    pub fn zeroed(function_used: impl Into<String>) -> Self {
        Self {
            sample_size: 0,
            data_coverage: 0.0,
            confidence_level: 0.0,
            execution_time_ms: 0,
            sql_function_used: function_used.into(),
            data_quality_score: 0.0,
        }
    }
}

/// Terminal artifact returned by the backtesting pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredResponse {
    pub execution_status: ExecutionStatus,
    pub analysis_results: Map<String, Value>,
    pub metadata: ResponseMetadata,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl StructuredResponse {
    /// Failed response with zeroed metadata.
    pub fn failed(function_used: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            execution_status: ExecutionStatus::Failed,
            analysis_results: Map::new(),
            metadata: ResponseMetadata::zeroed(function_used),
            recommendations: Vec::new(),
            warnings: Vec::new(),
            error_details: Some(error.into()),
        }
    }
}
