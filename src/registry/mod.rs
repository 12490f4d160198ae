//! Function registry
//!
//! Catalog of the analytical functions the data store exposes. Loaded once
//! at startup and read-only afterwards, so it is shared behind an `Arc`
//! without locking.

use crate::models::{AnalysisStrategy, PerformanceTier, RegisteredFunction, TradingContext};
use crate::Result;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Upper bound on names returned by [`FunctionRegistry::suggest`].
const MAX_SUGGESTIONS: usize = 10;

/// Where the loaded declarations came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    Declarations(PathBuf),
    Demo,
    Inline,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    functions: Vec<RegisteredFunction>,
}

/// Registry of analytical functions, in declaration order.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: Vec<RegisteredFunction>,
    by_name: HashMap<String, usize>,
    categories: HashMap<String, Vec<String>>,
    source: RegistrySource,
}

impl FunctionRegistry {
    /// Load declarations from `path`. A missing or malformed file yields the demo catalog.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = %path.display(), "Function signatures file not found, using demo catalog");
            return Self::demo();
        }

        match read_catalog(path) {
            Ok(catalog) => {
                let mut registry = Self::from_declarations(catalog.functions);
                registry.source = RegistrySource::Declarations(path.to_path_buf());
                info!(
                    function_count = registry.len(),
                    path = %path.display(),
                    "Loaded analytical functions"
                );
                registry
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load function signatures, using demo catalog"
                );
                Self::demo()
            }
        }
    }

    /// Build a registry from explicit declarations. Later duplicates are ignored.
    pub fn from_declarations(declarations: impl IntoIterator<Item = RegisteredFunction>) -> Self {
        let mut registry = Self {
            functions: Vec::new(),
            by_name: HashMap::new(),
            categories: HashMap::new(),
            source: RegistrySource::Inline,
        };

        for declaration in declarations {
            registry.register(declaration);
        }

        registry
    }

    /// Built-in catalog used when no declaration file is available.
    pub fn demo() -> Self {
        let mut registry = Self::from_declarations(demo_functions());
        registry.source = RegistrySource::Demo;
        info!(function_count = registry.len(), "Created demo function catalog");
        registry
    }

    fn register(&mut self, declaration: RegisteredFunction) {
        if self.by_name.contains_key(&declaration.name) {
            warn!(name = %declaration.name, "Duplicate function declaration ignored");
            return;
        }

        self.categories
            .entry(declaration.category.clone())
            .or_default()
            .push(declaration.name.clone());
        self.by_name
            .insert(declaration.name.clone(), self.functions.len());
        self.functions.push(declaration);
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredFunction> {
        self.by_name.get(name).map(|&i| &self.functions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All names, in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    pub fn functions(&self) -> &[RegisteredFunction] {
        &self.functions
    }

    pub fn functions_in_category(&self, category: &str) -> Vec<String> {
        self.categories.get(category).cloned().unwrap_or_default()
    }

    /// Candidate functions for a strategy.
    ///
    /// `_context` does not narrow the candidates; it is accepted so callers
    /// pass the full planning context.
    pub fn suggest(&self, strategy: AnalysisStrategy, _context: TradingContext) -> Vec<String> {
        let mut suggested: Vec<String> = strategy_categories(strategy)
            .iter()
            .flat_map(|category| self.functions_in_category(category))
            .collect();

        if suggested.is_empty() {
            suggested = self.names();
        }

        suggested.truncate(MAX_SUGGESTIONS);
        suggested
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn source(&self) -> &RegistrySource {
        &self.source
    }
}

fn read_catalog(path: &Path) -> Result<Catalog> {
    let raw = fs::read_to_string(path)?;
    let catalog = serde_json::from_str(&raw)?;
    Ok(catalog)
}

/// Fixed strategy → category lookup.
fn strategy_categories(strategy: AnalysisStrategy) -> &'static [&'static str] {
    match strategy {
        AnalysisStrategy::PerformanceAnalysis => &["order_blocks", "session_analysis"],
        AnalysisStrategy::CorrelationStudy => &["correlation", "structure_analysis"],
        AnalysisStrategy::StructureDetection => &["market_structure", "pattern_detection"],
    }
}

fn demo_functions() -> Vec<RegisteredFunction> {
    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    vec![
        RegisteredFunction {
            name: "update_order_block_performance".to_string(),
            description: "Analyze order block performance with respect rates".to_string(),
            parameters: params(&[
                ("symbol", "str"),
                ("session", "str"),
                ("min_respect_rate", "int"),
            ]),
            return_type: "table".to_string(),
            category: "order_blocks".to_string(),
            performance_tier: PerformanceTier::Fast,
            min_sample_size: 20,
        },
        RegisteredFunction {
            name: "detect_fair_value_gaps".to_string(),
            description: "Identify and analyze fair value gaps".to_string(),
            parameters: params(&[
                ("symbol", "str"),
                ("timeframe", "str"),
                ("lookback_days", "int"),
            ]),
            return_type: "table".to_string(),
            category: "fair_value_gaps".to_string(),
            performance_tier: PerformanceTier::Medium,
            min_sample_size: 10,
        },
        RegisteredFunction {
            name: "analyze_session_performance".to_string(),
            description: "Calculate session-based performance metrics".to_string(),
            parameters: params(&[
                ("symbol", "str"),
                ("session", "str"),
                ("date_range", "str"),
            ]),
            return_type: "table".to_string(),
            category: "session_analysis".to_string(),
            performance_tier: PerformanceTier::Fast,
            min_sample_size: 15,
        },
    ]
}

#[cfg(test)]
pub(crate) fn test_function(name: &str, category: &str) -> RegisteredFunction {
    RegisteredFunction {
        name: name.to_string(),
        description: format!("{} test function", name),
        parameters: BTreeMap::new(),
        return_type: "table".to_string(),
        category: category.to_string(),
        performance_tier: PerformanceTier::Fast,
        min_sample_size: 10,
    }
}
