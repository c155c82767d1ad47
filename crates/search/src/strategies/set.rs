use super::{dependency, project_record};
use crate::base::{bind_filters, DomainSpec, FilterBinding, StrategyCore};
use crate::error::Result;
use crate::fuzzy::FieldWeight;
use crate::registry::{ResolvedDependencies, StrategyDescriptor};
use crate::strategy::{SearchStrategy, StrategyTuning, SupportedOptions};
use async_trait::async_trait;
use cardex_protocol::{CardSet, SearchOptions, SearchResult, Searchable, Suggestion};
use cardex_store::{GroupCount, Repository};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Recency term: sets released after this year earn a linear bonus.
const FIRST_RELEASE_YEAR: f64 = 1996.0;
const RECENCY_YEAR_SPAN: f64 = 30.0;
const RECENCY_SPAN: f64 = 60.0;
const POPULARITY_SPAN: f64 = 40.0;

const FILTER_BINDINGS: [FilterBinding; 2] = [
    FilterBinding::range("year", "year"),
    FilterBinding::category("series", "series"),
];

/// Search strategy for card sets/expansions.
pub struct SetStrategy {
    core: StrategyCore<CardSet>,
}

impl SetStrategy {
    pub const TYPE_ID: &'static str = "sets";
    pub const DEPENDENCIES: [&'static str; 1] = ["setRepository"];

    pub fn new(sets: Arc<dyn Repository<CardSet>>, tuning: StrategyTuning) -> Self {
        Self {
            core: StrategyCore::new(sets, Self::domain_spec(), tuning),
        }
    }

    fn domain_spec() -> DomainSpec<CardSet> {
        DomainSpec {
            type_id: Self::TYPE_ID,
            min_query_length: 1,
            fields: vec![
                FieldWeight::new("name", 10.0),
                FieldWeight::new("abbreviation", 6.0),
                FieldWeight::new("series", 4.0),
            ],
            secondary_sort: |a, b| {
                b.release_year
                    .cmp(&a.release_year)
                    .then_with(|| a.name.cmp(&b.name))
            },
        }
    }

    fn custom_score(set: &CardSet) -> f64 {
        let recency = set.release_year.map_or(0.0, |year| {
            let offset = (f64::from(year) - FIRST_RELEASE_YEAR).max(0.0);
            RECENCY_SPAN * (offset / RECENCY_YEAR_SPAN).min(1.0)
        });
        recency + POPULARITY_SPAN * set.popularity()
    }

    fn display_name(set: &CardSet) -> String {
        match set.release_year {
            Some(year) => format!("{} ({year})", set.name),
            None => set.name.clone(),
        }
    }

    fn project(set: &CardSet) -> Result<Value> {
        let mut map = project_record(set)?;
        map.insert("displayName".into(), json!(Self::display_name(set)));
        Ok(Value::Object(map))
    }

    /// Facet listing: release years with set counts.
    pub async fn release_years(&self) -> Result<Vec<GroupCount>> {
        Ok(self.core.repo.count_grouped("year").await?)
    }

    pub fn descriptor() -> StrategyDescriptor {
        let constructor = Arc::new(|deps: &ResolvedDependencies, options: &Map<String, Value>| {
            let sets: Arc<dyn Repository<CardSet>> = dependency(deps, Self::DEPENDENCIES[0])?;
            Ok(Arc::new(SetStrategy::new(
                sets,
                StrategyTuning::from_options(options),
            )) as Arc<dyn SearchStrategy>)
        });
        StrategyDescriptor::new(constructor)
            .with_dependencies(Self::DEPENDENCIES.iter().map(|s| s.to_string()).collect())
            .with_default_options(default_options())
    }
}

fn default_options() -> Map<String, Value> {
    let Value::Object(map) = json!({"hybrid": true, "suggest_limit": 10}) else {
        unreachable!()
    };
    map
}

#[async_trait]
impl SearchStrategy for SetStrategy {
    fn type_id(&self) -> &str {
        Self::TYPE_ID
    }

    fn min_query_length(&self) -> usize {
        self.core.spec.min_query_length
    }

    fn supported_options(&self) -> SupportedOptions {
        SupportedOptions {
            type_id: Self::TYPE_ID.into(),
            min_query_length: self.core.spec.min_query_length,
            text_fields: self
                .core
                .spec
                .fields
                .iter()
                .map(|f| f.field.clone())
                .collect(),
            filters: FILTER_BINDINGS.iter().map(|b| b.key.to_string()).collect(),
            hybrid: self.core.tuning.hybrid,
        }
    }

    fn validate_input(&self, query: &str, options: &SearchOptions) -> Result<()> {
        self.core.validate(query, options)
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let filters = bind_filters(&FILTER_BINDINGS, options);
        let ranked = self
            .core
            .run(query, options, filters, &Self::custom_score)
            .await?;

        ranked
            .into_iter()
            .map(|hit| {
                Ok(SearchResult {
                    record: Self::project(&hit.record)?,
                    score: hit.score,
                    matched_fields: hit.matched_fields,
                    highlights: hit.highlights,
                })
            })
            .collect()
    }

    async fn suggest(&self, query: &str, options: &SearchOptions) -> Result<Vec<Suggestion>> {
        let tightened = self.core.suggest_options(options);
        let filters = bind_filters(&FILTER_BINDINGS, &tightened);
        let ranked = self
            .core
            .run(query, &tightened, filters, &Self::custom_score)
            .await?;

        Ok(ranked
            .into_iter()
            .map(|hit| {
                let set = hit.record;
                let mut metadata = std::collections::BTreeMap::new();
                if let Some(year) = set.release_year {
                    metadata.insert("year".to_string(), json!(year));
                }
                if let Some(count) = set.card_count {
                    metadata.insert("cardCount".to_string(), json!(count));
                }
                Suggestion {
                    id: set.id.clone(),
                    label: set.name.clone(),
                    secondary: set.series.clone(),
                    metadata,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardex_protocol::FilterValue;
    use cardex_store::MemoryRepository;

    fn sets() -> Vec<CardSet> {
        vec![
            CardSet {
                id: "s-base".into(),
                name: "Base Set".into(),
                series: Some("Original".into()),
                abbreviation: Some("BS".into()),
                release_year: Some(1999),
                card_count: Some(102),
                popularity: 0.9,
            },
            CardSet {
                id: "s-evs".into(),
                name: "Evolving Skies".into(),
                series: Some("Sword & Shield".into()),
                abbreviation: Some("EVS".into()),
                release_year: Some(2021),
                card_count: Some(237),
                popularity: 0.8,
            },
            CardSet {
                id: "s-151".into(),
                name: "151".into(),
                series: Some("Scarlet & Violet".into()),
                abbreviation: Some("MEW".into()),
                release_year: Some(2023),
                card_count: Some(207),
                popularity: 0.7,
            },
        ]
    }

    fn strategy() -> SetStrategy {
        SetStrategy::new(
            Arc::new(MemoryRepository::new(sets())),
            StrategyTuning {
                hybrid: false,
                ..StrategyTuning::default()
            },
        )
    }

    #[tokio::test]
    async fn abbreviation_matches_find_sets() {
        let hits = strategy()
            .search("evs", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record["id"], json!("s-evs"));
    }

    #[tokio::test]
    async fn year_range_filter_narrows_results() {
        let mut options = SearchOptions::default();
        options.filters.insert(
            "year".into(),
            FilterValue::Range {
                min: Some(2020.0),
                max: Some(2024.0),
            },
        );
        let hits = strategy().search("s", &options).await.unwrap();
        assert!(hits
            .iter()
            .all(|hit| hit.record["id"] != json!("s-base")));
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn display_name_appends_year() {
        let hits = strategy()
            .search("base", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits[0].record["displayName"], json!("Base Set (1999)"));
    }

    #[tokio::test]
    async fn recency_term_is_bounded() {
        let far_future = CardSet {
            id: "s-future".into(),
            name: "Future".into(),
            series: None,
            abbreviation: None,
            release_year: Some(3000),
            card_count: None,
            popularity: 1.0,
        };
        let score = SetStrategy::custom_score(&far_future);
        assert!(score <= RECENCY_SPAN + POPULARITY_SPAN);
    }

    #[tokio::test]
    async fn release_years_facet() {
        let years = strategy().release_years().await.unwrap();
        assert_eq!(years.len(), 3);
        assert!(years.iter().any(|g| g.key == "2021" && g.count == 1));
    }
}
