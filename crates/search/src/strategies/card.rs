use super::{dependency, project_record};
use crate::base::{
    bind_filters, DomainSpec, FilterBinding, RelationalLookup, StrategyCore,
};
use crate::error::Result;
use crate::fuzzy::FieldWeight;
use crate::registry::{ResolvedDependencies, StrategyDescriptor};
use crate::strategy::{SearchStrategy, StrategyTuning, SupportedOptions};
use async_trait::async_trait;
use cardex_protocol::{
    Card, CardSet, SearchOptions, SearchResult, Searchable, Suggestion,
};
use cardex_store::{FilterCondition, FilterOp, QuerySpec, Repository, TextPattern};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// At most this many matching sets participate in the set-name join.
const SET_JOIN_CAP: usize = 5;

/// Cards fetched per joined set when widening candidates.
const CARDS_PER_SET_CAP: usize = 200;

/// Custom-score terms: availability bonus plus the popularity counter.
const AVAILABLE_BONUS: f64 = 40.0;
const POPULARITY_SPAN: f64 = 60.0;

const FILTER_BINDINGS: [FilterBinding; 5] = [
    FilterBinding::category("rarity", "rarity"),
    FilterBinding::category("set", "set_id"),
    FilterBinding::range("price", "price"),
    FilterBinding::range("population", "population"),
    FilterBinding::flag("available", "available"),
];

/// Search strategy for individual cards. Joins the parent set so queries
/// can match and display set names.
pub struct CardStrategy {
    core: StrategyCore<Card>,
}

impl CardStrategy {
    pub const TYPE_ID: &'static str = "cards";
    pub const DEPENDENCIES: [&'static str; 2] = ["cardRepository", "setRepository"];

    pub fn new(
        cards: Arc<dyn Repository<Card>>,
        sets: Arc<dyn Repository<CardSet>>,
        tuning: StrategyTuning,
    ) -> Self {
        let lookup = Arc::new(SetLookup {
            cards: Arc::clone(&cards),
            sets,
        });
        let core = StrategyCore::new(cards, Self::domain_spec(), tuning).with_lookup(lookup);
        Self { core }
    }

    fn domain_spec() -> DomainSpec<Card> {
        DomainSpec {
            type_id: Self::TYPE_ID,
            min_query_length: 1,
            fields: vec![
                FieldWeight::new("name", 10.0),
                FieldWeight::new("number", 6.0),
                FieldWeight::new("setName", 5.0),
                FieldWeight::new("variety", 3.0),
            ],
            secondary_sort: |a, b| {
                b.popularity
                    .partial_cmp(&a.popularity)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            },
        }
    }

    fn custom_score(card: &Card) -> f64 {
        let available = if card.available { AVAILABLE_BONUS } else { 0.0 };
        available + POPULARITY_SPAN * card.popularity()
    }

    /// "#number name (variety) — setName", omitting missing segments.
    fn display_name(card: &Card) -> String {
        let mut name = format!("#{} {}", card.number, card.name);
        if let Some(variety) = &card.variety {
            name.push_str(&format!(" ({variety})"));
        }
        if let Some(set_name) = &card.set_name {
            name.push_str(&format!(" — {set_name}"));
        }
        name
    }

    fn project(card: &Card) -> Result<Value> {
        let mut map = project_record(card)?;
        map.insert("displayName".into(), json!(Self::display_name(card)));
        Ok(Value::Object(map))
    }

    pub fn descriptor() -> StrategyDescriptor {
        let constructor = Arc::new(|deps: &ResolvedDependencies, options: &Map<String, Value>| {
            let cards: Arc<dyn Repository<Card>> = dependency(deps, Self::DEPENDENCIES[0])?;
            let sets: Arc<dyn Repository<CardSet>> = dependency(deps, Self::DEPENDENCIES[1])?;
            Ok(Arc::new(CardStrategy::new(
                cards,
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
impl SearchStrategy for CardStrategy {
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
                let card = hit.record;
                let mut metadata = std::collections::BTreeMap::new();
                metadata.insert("number".to_string(), json!(card.number));
                if let Some(rarity) = &card.rarity {
                    metadata.insert("rarity".to_string(), json!(rarity));
                }
                if let Some(price) = card.price {
                    metadata.insert("price".to_string(), json!(price));
                }
                Suggestion {
                    id: card.id.clone(),
                    label: card.name.clone(),
                    secondary: card.set_name.clone(),
                    metadata,
                }
            })
            .collect())
    }
}

/// Card→Set join: widens candidates with cards from sets whose name matches
/// the query, then resolves `set_name` on every candidate.
struct SetLookup {
    cards: Arc<dyn Repository<Card>>,
    sets: Arc<dyn Repository<CardSet>>,
}

#[async_trait]
impl RelationalLookup<Card> for SetLookup {
    async fn apply(
        &self,
        query: &str,
        filters: &[FilterCondition],
        records: Vec<Card>,
    ) -> Result<Vec<Card>> {
        let mut candidates = records;

        // Cards reachable only through their set's name.
        let set_spec = QuerySpec {
            fields: vec!["name".into(), "abbreviation".into()],
            patterns: TextPattern::generate(query, true)?,
            filters: Vec::new(),
            sort: None,
            skip: 0,
            limit: SET_JOIN_CAP,
        };
        let matching_sets = self.sets.query(&set_spec).await?;
        let known: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
        for set in &matching_sets {
            let mut member_filters = filters.to_vec();
            member_filters.push(FilterCondition {
                field: "set_id".into(),
                op: FilterOp::Equals(set.id.clone()),
            });
            let member_spec = QuerySpec {
                fields: Vec::new(),
                patterns: Vec::new(),
                filters: member_filters,
                sort: None,
                skip: 0,
                limit: CARDS_PER_SET_CAP,
            };
            for card in self.cards.query(&member_spec).await? {
                if !known.contains(&card.id) {
                    candidates.push(card);
                }
            }
        }

        // Resolve parent set names for display and scoring.
        let set_ids: Vec<String> = candidates
            .iter()
            .filter_map(|card| card.set_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if set_ids.is_empty() {
            return Ok(candidates);
        }
        let sets = self.sets.fetch_by_ids(&set_ids).await?;
        for card in &mut candidates {
            if let Some(set_id) = &card.set_id {
                card.set_name = sets
                    .iter()
                    .find(|set| &set.id == set_id)
                    .map(|set| set.name.clone());
            }
        }
        Ok(candidates)
    }
}
