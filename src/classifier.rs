//! Request Classifier
//!
//! Routes a free-text question to either:
//! - Knowledge-first: methodology and concept questions ("what is an order block?")
//! - Execution-first: data questions answered from the backtest store ("EURUSD order block win rate")
//! - Hybrid: both, when neither side dominates
//!
//! Scoring is plain substring matching against fixed keyword lists. Each
//! listed term contributes at most one point.

use crate::models::{QueryClassification, RoutingDecision};
use serde_json::Value;
use tracing::{debug, warn};

/// Static keyword lists — zero allocation
const EXECUTION_KEYWORDS: &[&str] = &[
    "performance", "backtest", "statistics", "results", "data",
    "analysis", "success rate", "win rate", "profit", "loss",
    "order block", "fair value gap", "liquidity sweep", "session",
];

const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "explain", "what is", "how does", "methodology", "concept",
    "definition", "theory", "principle", "strategy", "approach",
];

const MAX_CONFIDENCE: f64 = 90.0;
const BASE_CONFIDENCE: f64 = 60.0;
const PER_HIT_CONFIDENCE: f64 = 10.0;
const HYBRID_CONFIDENCE: f64 = 70.0;
const FALLBACK_CONFIDENCE: f64 = 50.0;

/// Request classifier
pub struct RequestClassifier;

impl RequestClassifier {
    /// Classify a query into a routing decision with a confidence score
    pub fn classify(query: &str) -> QueryClassification {
        let text = query.to_lowercase();

        let execution_score = keyword_hits(&text, EXECUTION_KEYWORDS);
        let knowledge_score = keyword_hits(&text, KNOWLEDGE_KEYWORDS);

        debug!(execution_score, knowledge_score, "Query scored");

        if execution_score > knowledge_score {
            QueryClassification {
                routing_decision: RoutingDecision::ExecutionFirst,
                confidence: scaled_confidence(execution_score),
                reasoning: format!(
                    "Query contains {} execution indicators",
                    execution_score
                ),
                suggested_approach: "Execute database analysis for data-driven insights"
                    .to_string(),
            }
        } else if knowledge_score > execution_score {
            QueryClassification {
                routing_decision: RoutingDecision::KnowledgeFirst,
                confidence: scaled_confidence(knowledge_score),
                reasoning: format!(
                    "Query contains {} conceptual indicators",
                    knowledge_score
                ),
                suggested_approach: "Consult knowledge base for methodology explanation"
                    .to_string(),
            }
        } else {
            QueryClassification {
                routing_decision: RoutingDecision::Hybrid,
                confidence: HYBRID_CONFIDENCE,
                reasoning: "Query requires both conceptual and analytical components"
                    .to_string(),
                suggested_approach: "Combine knowledge consultation with database analysis"
                    .to_string(),
            }
        }
    }

    /// Classify loosely typed input. Anything but a JSON string degrades to hybrid.
    pub fn classify_value(input: &Value) -> QueryClassification {
        match input.as_str() {
            Some(query) => Self::classify(query),
            None => {
                warn!(input_kind = json_kind(input), "Query is not a string");
                Self::fallback(format!(
                    "Classification error: expected a string query, got {}",
                    json_kind(input)
                ))
            }
        }
    }

    fn fallback(reasoning: String) -> QueryClassification {
        QueryClassification {
            routing_decision: RoutingDecision::Hybrid,
            confidence: FALLBACK_CONFIDENCE,
            reasoning,
            suggested_approach: "Use hybrid approach as fallback".to_string(),
        }
    }
}

fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(**kw)).count()
}

fn scaled_confidence(hits: usize) -> f64 {
    (BASE_CONFIDENCE + PER_HIT_CONFIDENCE * hits as f64).min(MAX_CONFIDENCE)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
