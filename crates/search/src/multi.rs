use crate::error::Result;
use crate::registry::{CacheStats, StrategyRegistry};
use crate::strategy::SupportedOptions;
use cardex_protocol::{
    MultiTypeOutcome, SearchOptions, SearchResult, Suggestion, TypeOutcome,
};
use serde_json::Map;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default overall limit for multi-type suggestion fan-out.
pub const MULTI_SUGGEST_LIMIT: usize = 20;

/// The caller-facing facade: single-type search/suggest plus concurrent
/// multi-type fan-out over the registry's strategies.
///
/// Fan-out uses join-all semantics: every per-type task runs to completion
/// and reports success or failure independently. There is no per-type
/// timeout; a slow repository delays only its own entry in the outcome map.
pub struct SearchService {
    registry: Arc<StrategyRegistry>,
}

impl SearchService {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub async fn search(
        &self,
        type_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let strategy = self.registry.get_strategy(type_id, &Map::new())?;
        strategy.search(query, options).await
    }

    pub async fn suggest(
        &self,
        type_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Suggestion>> {
        let strategy = self.registry.get_strategy(type_id, &Map::new())?;
        strategy.suggest(query, options).await
    }

    pub fn supported_options(&self, type_id: &str) -> Result<SupportedOptions> {
        Ok(self
            .registry
            .get_strategy(type_id, &Map::new())?
            .supported_options())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.registry.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.registry.clear_cache()
    }

    /// Fan a query out across several types concurrently. The overall limit
    /// is divided evenly across the requested types (at least one slot per
    /// type); one type's failure never cancels or blocks the others.
    pub async fn search_multiple(
        &self,
        query: &str,
        types: &[String],
        options: &SearchOptions,
    ) -> MultiTypeOutcome<SearchResult> {
        let per_type = per_type_options(options, types.len(), options.limit);
        let tasks: Vec<(String, JoinHandle<Result<Vec<SearchResult>>>)> = types
            .iter()
            .map(|type_id| {
                let registry = Arc::clone(&self.registry);
                let type_id_owned = type_id.clone();
                let query = query.to_string();
                let options = per_type.clone();
                let handle = tokio::spawn(async move {
                    let strategy = registry.get_strategy(&type_id_owned, &Map::new())?;
                    strategy.search(&query, &options).await
                });
                (type_id.clone(), handle)
            })
            .collect();

        collect_outcomes(tasks).await
    }

    /// Suggestion fan-out; same division and join-all semantics with a
    /// lower overall limit.
    pub async fn suggest_multiple(
        &self,
        query: &str,
        types: &[String],
        options: &SearchOptions,
    ) -> MultiTypeOutcome<Suggestion> {
        let overall = options.limit.min(MULTI_SUGGEST_LIMIT);
        let per_type = per_type_options(options, types.len(), overall);
        let tasks: Vec<(String, JoinHandle<Result<Vec<Suggestion>>>)> = types
            .iter()
            .map(|type_id| {
                let registry = Arc::clone(&self.registry);
                let type_id_owned = type_id.clone();
                let query = query.to_string();
                let options = per_type.clone();
                let handle = tokio::spawn(async move {
                    let strategy = registry.get_strategy(&type_id_owned, &Map::new())?;
                    strategy.suggest(&query, &options).await
                });
                (type_id.clone(), handle)
            })
            .collect();

        collect_outcomes(tasks).await
    }
}

fn per_type_options(options: &SearchOptions, type_count: usize, overall: usize) -> SearchOptions {
    let mut per_type = options.clone();
    per_type.limit = (overall / type_count.max(1)).max(1);
    per_type
}

/// Await every task and fold the results into the outcome map. Join-all,
/// not fail-fast: a panicked or failed task is recorded inline.
async fn collect_outcomes<T>(
    tasks: Vec<(String, JoinHandle<Result<Vec<T>>>)>,
) -> MultiTypeOutcome<T> {
    let mut outcome = MultiTypeOutcome::new();
    for (type_id, handle) in tasks {
        let entry = match handle.await {
            Ok(Ok(data)) => TypeOutcome::ok(data),
            Ok(Err(error)) => {
                log::warn!("search for type '{type_id}' failed: {error}");
                TypeOutcome::failed(error.to_string())
            }
            Err(join_error) => {
                log::warn!("search task for type '{type_id}' aborted: {join_error}");
                TypeOutcome::failed(format!("search task aborted: {join_error}"))
            }
        };
        outcome.insert(type_id, entry);
    }
    outcome
}
