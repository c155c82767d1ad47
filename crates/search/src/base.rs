use crate::error::{Result, SearchError};
use crate::fuzzy::{FieldWeight, FuzzyIndex, FuzzyMatch};
use crate::score::{max_structured_score, score_record, StructuredScore};
use crate::strategy::StrategyTuning;
use cardex_protocol::{
    FieldHighlight, FilterValue, SearchOptions, Searchable, MAX_QUERY_LENGTH,
};
use async_trait::async_trait;
use cardex_store::{FilterCondition, FilterOp, QuerySpec, Repository, TextPattern};
use std::cmp::Ordering;
use std::sync::Arc;

/// Hybrid re-ranking blend. Fixed policy constants; there is no tuning
/// surface for these weights.
pub const HYBRID_FUZZY_WEIGHT: f64 = 0.4;
pub const HYBRID_STRUCTURED_WEIGHT: f64 = 0.3;
pub const HYBRID_CUSTOM_WEIGHT: f64 = 0.3;

/// Hybrid candidate widening: up to 3x the requested limit, capped at 200.
pub const HYBRID_CANDIDATE_MULTIPLIER: usize = 3;
pub const HYBRID_CANDIDATE_CAP: usize = 200;

/// Ceiling on how many structured candidates are pulled from a repository
/// for in-process ranking.
pub const CANDIDATE_CEILING: usize = 1000;

/// A scored candidate flowing through the pipeline. Internal bookkeeping;
/// strategies project it into the wire `SearchResult` at the end.
#[derive(Debug, Clone)]
pub struct RankedRecord<R: Searchable> {
    pub record: R,
    pub score: f64,
    pub matched_fields: Vec<String>,
    pub highlights: Vec<FieldHighlight>,
}

/// Relational lookup applied between candidate fetching and scoring: brings
/// joined context onto the records (and may widen the candidate set with
/// records reachable only through the joined relation).
#[async_trait]
pub trait RelationalLookup<R: Searchable>: Send + Sync {
    /// `filters` is the domain's active filter set; widened candidates must
    /// honor it just like the primary fetch does.
    async fn apply(
        &self,
        query: &str,
        filters: &[FilterCondition],
        records: Vec<R>,
    ) -> Result<Vec<R>>;
}

/// Lookup for domains without relations; passes candidates through.
pub struct NoLookup;

#[async_trait]
impl<R: Searchable> RelationalLookup<R> for NoLookup {
    async fn apply(
        &self,
        _query: &str,
        _filters: &[FilterCondition],
        records: Vec<R>,
    ) -> Result<Vec<R>> {
        Ok(records)
    }
}

/// Domain-specific parameters of the shared pipeline.
pub struct DomainSpec<R: Searchable> {
    pub type_id: &'static str,
    pub min_query_length: usize,
    /// Declared text-searchable fields with relative weights, strongest first.
    pub fields: Vec<FieldWeight>,
    /// Deterministic tie-break for equal scores (e.g. popularity desc, name asc).
    pub secondary_sort: fn(&R, &R) -> Ordering,
}

/// The reusable search/rank/paginate algorithm, parameterized by a domain
/// spec and a repository. Concrete strategies wrap one of these.
pub struct StrategyCore<R: Searchable> {
    pub repo: Arc<dyn Repository<R>>,
    pub spec: DomainSpec<R>,
    pub tuning: StrategyTuning,
    lookup: Arc<dyn RelationalLookup<R>>,
}

impl<R: Searchable> StrategyCore<R> {
    pub fn new(
        repo: Arc<dyn Repository<R>>,
        spec: DomainSpec<R>,
        tuning: StrategyTuning,
    ) -> Self {
        Self {
            repo,
            spec,
            tuning,
            lookup: Arc::new(NoLookup),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn RelationalLookup<R>>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Query/option validation shared by `search` and `suggest`.
    pub fn validate(&self, query: &str, options: &SearchOptions) -> Result<()> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SearchError::Validation("query must not be empty".into()));
        }
        if trimmed.chars().count() > MAX_QUERY_LENGTH {
            return Err(SearchError::Validation(format!(
                "query exceeds {MAX_QUERY_LENGTH} characters"
            )));
        }
        if !options.bounds_ok() {
            return Err(SearchError::Validation(format!(
                "limit must be 1..=100 and page >= 1 (limit={}, page={})",
                options.limit, options.page
            )));
        }
        Ok(())
    }

    fn below_min_length(&self, query: &str) -> bool {
        query.trim().chars().count() < self.spec.min_query_length
    }

    /// Run the full pipeline. `filters` is the domain's translation of the
    /// caller's filter map; `custom_score` is the strategy-specific 0-100
    /// term blended in hybrid mode.
    pub async fn run(
        &self,
        query: &str,
        options: &SearchOptions,
        filters: Vec<FilterCondition>,
        custom_score: &(dyn Fn(&R) -> f64 + Sync),
    ) -> Result<Vec<RankedRecord<R>>> {
        self.validate(query, options)?;
        if self.below_min_length(query) {
            return Ok(Vec::new());
        }

        let query = query.trim();
        let ranked = self.structured(query, filters).await?;

        let hybrid = options.hybrid.unwrap_or(self.tuning.hybrid);
        let ranked = if hybrid {
            let pool = (options.limit * HYBRID_CANDIDATE_MULTIPLIER).min(HYBRID_CANDIDATE_CAP);
            let candidates: Vec<RankedRecord<R>> = ranked.iter().take(pool).cloned().collect();
            let reranked = self.fuzzy_rerank(query, candidates, custom_score);
            rerank_or_fallback(self.spec.type_id, ranked, reranked)
        } else {
            ranked
        };

        Ok(paginate(ranked, options))
    }

    /// Structured path: repository candidates scored additively and sorted
    /// by score, then by the domain's secondary key.
    async fn structured(
        &self,
        query: &str,
        filters: Vec<FilterCondition>,
    ) -> Result<Vec<RankedRecord<R>>> {
        let patterns = TextPattern::generate(query, self.tuning.fuzzy_patterns)
            .map_err(SearchError::from)?;
        let spec = QuerySpec {
            fields: self.spec.fields.iter().map(|f| f.field.clone()).collect(),
            patterns: patterns.clone(),
            filters: filters.clone(),
            sort: None,
            skip: 0,
            limit: CANDIDATE_CEILING,
        };

        let candidates = self.repo.query(&spec).await?;
        let candidates = self.lookup.apply(query, &filters, candidates).await?;
        log::debug!(
            "{}: structured path matched {} candidates for '{}'",
            self.spec.type_id,
            candidates.len(),
            query
        );

        let mut ranked: Vec<RankedRecord<R>> = candidates
            .into_iter()
            .filter_map(|record| {
                let StructuredScore {
                    total,
                    matched_fields,
                    highlights,
                } = score_record(&record, &self.spec.fields, &patterns);
                (total > 0.0).then_some(RankedRecord {
                    record,
                    score: total,
                    matched_fields,
                    highlights,
                })
            })
            .collect();

        self.sort_ranked(&mut ranked);
        Ok(ranked)
    }

    /// Hybrid stage: re-rank the widened candidate set by a weighted blend
    /// of fuzzy relevance, structured score, and the strategy's custom term.
    fn fuzzy_rerank(
        &self,
        query: &str,
        candidates: Vec<RankedRecord<R>>,
        custom_score: &(dyn Fn(&R) -> f64 + Sync),
    ) -> Result<Vec<RankedRecord<R>>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let records: Vec<R> = candidates.iter().map(|c| c.record.clone()).collect();
        let index = FuzzyIndex::new(&records, &self.spec.fields);
        let fuzzy_hits = index.search(query, records.len())?;

        let mut fuzzy_by_index: Vec<Option<FuzzyMatch>> = vec![None; records.len()];
        for hit in fuzzy_hits {
            let slot = hit.index;
            fuzzy_by_index[slot] = Some(hit);
        }

        let structured_ceiling = max_structured_score(&self.spec.fields);
        let mut reranked: Vec<RankedRecord<R>> = candidates
            .into_iter()
            .enumerate()
            .map(|(idx, mut candidate)| {
                let fuzzy = fuzzy_by_index[idx].take();
                let fuzzy_score = fuzzy.as_ref().map_or(0.0, |hit| hit.score);
                let structured_norm = candidate.score / structured_ceiling * 100.0;
                let custom = custom_score(&candidate.record).clamp(0.0, 100.0);

                candidate.score = HYBRID_FUZZY_WEIGHT * fuzzy_score
                    + HYBRID_STRUCTURED_WEIGHT * structured_norm
                    + HYBRID_CUSTOM_WEIGHT * custom;

                if let Some(hit) = fuzzy {
                    merge_highlights(&mut candidate.highlights, hit.highlights);
                }
                candidate
            })
            .collect();

        self.sort_ranked(&mut reranked);
        log::debug!(
            "{}: hybrid re-ranked {} candidates",
            self.spec.type_id,
            reranked.len()
        );
        Ok(reranked)
    }

    /// Score descending, then the domain secondary key, then id. Fully
    /// deterministic for any fixed input.
    fn sort_ranked(&self, ranked: &mut [RankedRecord<R>]) {
        let secondary = self.spec.secondary_sort;
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| secondary(&a.record, &b.record))
                .then_with(|| a.record.id().cmp(b.record.id()))
        });
    }

    /// Tightened options for suggestion calls.
    pub fn suggest_options(&self, options: &SearchOptions) -> SearchOptions {
        let mut tightened = options.clone();
        tightened.limit = options.limit.clamp(1, self.tuning.suggest_limit());
        tightened.page = 1;
        tightened
    }
}

/// Typed fallback branch of the hybrid pipeline: a fuzzy failure degrades to
/// the structured ranking instead of surfacing an error.
fn rerank_or_fallback<R: Searchable>(
    type_id: &str,
    structured: Vec<RankedRecord<R>>,
    reranked: Result<Vec<RankedRecord<R>>>,
) -> Vec<RankedRecord<R>> {
    match reranked {
        Ok(reranked) => reranked,
        Err(error) => {
            log::warn!(
                "{type_id}: fuzzy re-rank failed, falling back to structured results: {error}"
            );
            structured
        }
    }
}

fn paginate<R: Searchable>(
    ranked: Vec<RankedRecord<R>>,
    options: &SearchOptions,
) -> Vec<RankedRecord<R>> {
    // Page has no upper bound; saturate so absurd pages yield an empty
    // sequence instead of overflowing.
    let skip = (options.page - 1).saturating_mul(options.limit);
    ranked.into_iter().skip(skip).take(options.limit).collect()
}

fn merge_highlights(existing: &mut Vec<FieldHighlight>, incoming: Vec<FieldHighlight>) {
    for highlight in incoming {
        if !existing.iter().any(|h| h.field == highlight.field) {
            existing.push(highlight);
        }
    }
}

/// Declarative binding from a caller-facing filter key to a record field.
pub struct FilterBinding {
    pub key: &'static str,
    pub field: &'static str,
    pub kind: FilterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Range,
    Category,
    Flag,
}

impl FilterBinding {
    pub const fn range(key: &'static str, field: &'static str) -> Self {
        Self {
            key,
            field,
            kind: FilterKind::Range,
        }
    }

    pub const fn category(key: &'static str, field: &'static str) -> Self {
        Self {
            key,
            field,
            kind: FilterKind::Category,
        }
    }

    pub const fn flag(key: &'static str, field: &'static str) -> Self {
        Self {
            key,
            field,
            kind: FilterKind::Flag,
        }
    }
}

/// Translate the caller's filter map through a domain's bindings. Unknown
/// keys and shape-mismatched values are ignored, not rejected.
pub fn bind_filters(
    bindings: &[FilterBinding],
    options: &SearchOptions,
) -> Vec<FilterCondition> {
    let mut conditions = Vec::new();
    for binding in bindings {
        let Some(value) = options.filters.get(binding.key) else {
            continue;
        };
        let op = match (binding.kind, value) {
            (FilterKind::Range, FilterValue::Range { min, max }) => {
                Some(FilterOp::range(*min, *max))
            }
            (FilterKind::Range, FilterValue::Number(n)) => {
                Some(FilterOp::range(Some(*n), Some(*n)))
            }
            (FilterKind::Category, FilterValue::Text(text)) => {
                Some(FilterOp::Equals(text.clone()))
            }
            (FilterKind::Flag, FilterValue::Flag(flag)) => Some(FilterOp::Flag(*flag)),
            _ => None,
        };
        if let Some(op) = op {
            conditions.push(FilterCondition {
                field: binding.field.to_string(),
                op,
            });
        }
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardex_protocol::Product;
    use cardex_store::MemoryRepository;

    fn product(id: &str, name: &str, price: f64, popularity: f64) -> Product {
        Product {
            id: id.into(),
            name: name.into(),
            brand: Some("Cardex".into()),
            category: Some("Booster".into()),
            price: Some(price),
            in_stock: true,
            popularity,
        }
    }

    fn core(records: Vec<Product>, tuning: StrategyTuning) -> StrategyCore<Product> {
        StrategyCore::new(
            Arc::new(MemoryRepository::new(records)),
            DomainSpec {
                type_id: "products",
                min_query_length: 2,
                fields: vec![
                    FieldWeight::new("name", 10.0),
                    FieldWeight::new("brand", 4.0),
                ],
                secondary_sort: |a, b| {
                    b.popularity
                        .partial_cmp(&a.popularity)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.name.cmp(&b.name))
                },
            },
            tuning,
        )
    }

    fn no_custom(_: &Product) -> f64 {
        0.0
    }

    #[tokio::test]
    async fn empty_query_is_a_validation_error() {
        let core = core(vec![], StrategyTuning::default());
        let result = core
            .run("   ", &SearchOptions::default(), vec![], &no_custom)
            .await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn oversized_query_is_rejected() {
        let core = core(vec![], StrategyTuning::default());
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        let result = core
            .run(&long, &SearchOptions::default(), vec![], &no_custom)
            .await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn out_of_bounds_limit_is_rejected_before_querying() {
        let core = core(vec![], StrategyTuning::default());
        let result = core
            .run("pika", &SearchOptions::with_limit(0), vec![], &no_custom)
            .await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn below_min_length_returns_empty_without_error() {
        let core = core(
            vec![product("p-1", "Booster Box", 120.0, 0.5)],
            StrategyTuning::default(),
        );
        let hits = core
            .run("b", &SearchOptions::default(), vec![], &no_custom)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn scores_are_non_increasing_and_limited() {
        let records: Vec<Product> = (0..30)
            .map(|i| product(&format!("p-{i:02}"), &format!("Booster {i}"), 10.0, 0.1))
            .collect();
        let tuning = StrategyTuning {
            hybrid: false,
            ..StrategyTuning::default()
        };
        let core = core(records, tuning);

        let hits = core
            .run("booster", &SearchOptions::with_limit(10), vec![], &no_custom)
            .await
            .unwrap();
        assert_eq!(hits.len(), 10);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn ties_break_by_secondary_key() {
        let records = vec![
            product("p-1", "Box Alpha", 10.0, 0.2),
            product("p-2", "Box Delta", 10.0, 0.9),
            product("p-3", "Box Gamma", 10.0, 0.9),
        ];
        let tuning = StrategyTuning {
            hybrid: false,
            ..StrategyTuning::default()
        };
        let core = core(records, tuning);

        // p-2 and p-3 score identically (same match kind, length, and
        // popularity), so the secondary key (popularity desc, name asc)
        // decides between them; p-1 trails on the popularity term.
        let hits = core
            .run("box", &SearchOptions::default(), vec![], &no_custom)
            .await
            .unwrap();
        assert_eq!(hits[0].record.id, "p-2");
        assert_eq!(hits[1].record.id, "p-3");
        assert_eq!(hits[2].record.id, "p-1");
    }

    #[tokio::test]
    async fn pagination_skips_prior_pages() {
        let records = vec![
            product("p-1", "Booster One", 10.0, 0.9),
            product("p-2", "Booster Two", 10.0, 0.6),
            product("p-3", "Booster Three", 10.0, 0.3),
        ];
        let tuning = StrategyTuning {
            hybrid: false,
            ..StrategyTuning::default()
        };
        let core = core(records, tuning);

        let mut options = SearchOptions::with_limit(2);
        options.page = 2;
        let hits = core.run("booster", &options, vec![], &no_custom).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn far_out_of_range_page_returns_empty() {
        let records = vec![
            product("p-1", "Booster One", 10.0, 0.9),
            product("p-2", "Booster Two", 10.0, 0.6),
        ];
        let core = core(records, StrategyTuning::default());

        let mut options = SearchOptions::with_limit(10);
        options.page = usize::MAX;
        let hits = core.run("booster", &options, vec![], &no_custom).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn hybrid_mode_reranks_with_custom_term() {
        let records = vec![
            product("p-1", "Booster Pack", 10.0, 0.0),
            product("p-2", "Booster Pack", 10.0, 0.0),
        ];
        let core = core(records, StrategyTuning::default());

        // Custom term strongly favors p-2.
        let custom = |record: &Product| if record.id == "p-2" { 100.0 } else { 0.0 };
        let hits = core
            .run("booster", &SearchOptions::default(), vec![], &custom)
            .await
            .unwrap();
        assert_eq!(hits[0].record.id, "p-2");
    }

    #[tokio::test]
    async fn per_call_hybrid_override_wins() {
        let records = vec![product("p-1", "Booster", 10.0, 0.5)];
        let tuning = StrategyTuning {
            hybrid: false,
            ..StrategyTuning::default()
        };
        let core = core(records, tuning);

        let mut options = SearchOptions::default();
        options.hybrid = Some(true);
        let hits = core.run("booster", &options, vec![], &no_custom).await.unwrap();
        // Hybrid blend of a lone exact match stays a non-empty, bounded hit.
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0 && hits[0].score <= 100.0);
    }

    #[tokio::test]
    async fn fuzzy_failure_falls_back_to_structured_results() {
        let records = vec![
            product("p-1", "Booster One", 10.0, 0.9),
            product("p-2", "Booster Two", 10.0, 0.1),
        ];
        let tuning = StrategyTuning {
            hybrid: false,
            ..StrategyTuning::default()
        };
        let core = core(records, tuning);

        let structured = core
            .run("booster", &SearchOptions::default(), vec![], &no_custom)
            .await
            .unwrap();

        let fallback = rerank_or_fallback(
            "products",
            structured.clone(),
            Err(SearchError::FuzzyEngine("index unavailable".into())),
        );
        let fallback_ids: Vec<&str> = fallback.iter().map(|h| h.record.id.as_str()).collect();
        let structured_ids: Vec<&str> =
            structured.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(fallback_ids, structured_ids);
        for (a, b) in fallback.iter().zip(structured.iter()) {
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn filter_binding_ignores_unknown_and_mismatched() {
        let bindings = [
            FilterBinding::range("price", "price"),
            FilterBinding::category("category", "category"),
            FilterBinding::flag("inStock", "in_stock"),
        ];
        let mut options = SearchOptions::default();
        options.filters.insert(
            "price".into(),
            FilterValue::Range {
                min: Some(5.0),
                max: None,
            },
        );
        options
            .filters
            .insert("category".into(), FilterValue::Flag(true)); // mismatched shape
        options
            .filters
            .insert("futureKey".into(), FilterValue::Text("?".into())); // unknown

        let conditions = bind_filters(&bindings, &options);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "price");
    }
}
