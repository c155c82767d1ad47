use crate::error::Result;
use async_trait::async_trait;
use cardex_protocol::{SearchOptions, SearchResult, Suggestion};
use serde::{Deserialize, Serialize};

/// Ceiling on suggestion limits, regardless of caller options.
pub const SUGGEST_LIMIT_CEILING: usize = 20;

/// The polymorphic search contract. One implementation per searchable
/// domain, selected through the registry's string-keyed descriptor map.
///
/// Instances are immutable after construction and hold no per-request
/// mutable state, so one instance is safe to share across concurrent calls.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn type_id(&self) -> &str;

    /// Queries shorter than this return an empty sequence without error.
    fn min_query_length(&self) -> usize;

    fn supported_options(&self) -> SupportedOptions;

    /// Validates query shape and option bounds before any query executes.
    fn validate_input(&self, query: &str, options: &SearchOptions) -> Result<()>;

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;

    /// Search with a tightened limit, projected down to suggestions.
    async fn suggest(&self, query: &str, options: &SearchOptions) -> Result<Vec<Suggestion>>;
}

/// Capabilities advertised for one strategy, for callers composing queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedOptions {
    pub type_id: String,
    pub min_query_length: usize,
    pub text_fields: Vec<String>,
    pub filters: Vec<String>,
    pub hybrid: bool,
}

/// Construction-time tuning, deserialized from the merged descriptor/call
/// option map. Unknown keys are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTuning {
    /// Two-stage hybrid ranking (structured + fuzzy re-rank).
    pub hybrid: bool,

    /// Emit the chars-in-order pattern in the structured path.
    pub fuzzy_patterns: bool,

    /// Default limit for suggestion calls, capped at [`SUGGEST_LIMIT_CEILING`].
    pub suggest_limit: usize,
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            hybrid: true,
            fuzzy_patterns: true,
            suggest_limit: 10,
        }
    }
}

impl StrategyTuning {
    /// Parse tuning from a merged option map, ignoring unknown keys.
    pub fn from_options(options: &serde_json::Map<String, serde_json::Value>) -> Self {
        serde_json::from_value(serde_json::Value::Object(options.clone())).unwrap_or_default()
    }

    pub fn suggest_limit(&self) -> usize {
        self.suggest_limit.clamp(1, SUGGEST_LIMIT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_parses_known_keys_and_ignores_unknown() {
        let map = serde_json::json!({
            "hybrid": false,
            "suggest_limit": 5,
            "someFutureKnob": {"nested": true}
        });
        let serde_json::Value::Object(map) = map else {
            unreachable!()
        };
        let tuning = StrategyTuning::from_options(&map);
        assert!(!tuning.hybrid);
        assert!(tuning.fuzzy_patterns);
        assert_eq!(tuning.suggest_limit(), 5);
    }

    #[test]
    fn suggest_limit_is_capped() {
        let tuning = StrategyTuning {
            suggest_limit: 500,
            ..StrategyTuning::default()
        };
        assert_eq!(tuning.suggest_limit(), SUGGEST_LIMIT_CEILING);
    }
}
