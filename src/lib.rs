//! ICT Backtesting Orchestrator
//!
//! Turns free-text trading-methodology questions into bounded, validated
//! calls against a catalog of analytical database functions:
//! - Classifies each question as knowledge-first, execution-first or hybrid
//! - Formulates an enum-constrained execution plan (no free-form SQL)
//! - Selects one registered function and executes it under a timeout
//! - Scores the rows against a statistical quality tier
//! - Always answers with a well-formed structured response
//!
//! PIPELINE:
//! CLASSIFY → PLAN → SELECT → EXECUTE → VALIDATE → SYNTHESIZE

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod health;
pub mod knowledge;
pub mod models;
pub mod planner;
pub mod registry;
pub mod selection;
pub mod synthesis;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use agent::{BacktestingPipeline, Coordinator, CoordinatorOutcome};
pub use classifier::RequestClassifier;
pub use config::Settings;
pub use models::*;
pub use registry::FunctionRegistry;
