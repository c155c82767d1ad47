use super::{dependency, project_record};
use crate::base::{bind_filters, DomainSpec, FilterBinding, StrategyCore};
use crate::error::Result;
use crate::fuzzy::FieldWeight;
use crate::registry::{ResolvedDependencies, StrategyDescriptor};
use crate::strategy::{SearchStrategy, StrategyTuning, SupportedOptions};
use async_trait::async_trait;
use cardex_protocol::{Product, SearchOptions, SearchResult, Searchable, Suggestion};
use cardex_store::{GroupCount, Repository};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

const IN_STOCK_BONUS: f64 = 50.0;
const POPULARITY_SPAN: f64 = 50.0;

const FILTER_BINDINGS: [FilterBinding; 3] = [
    FilterBinding::range("price", "price"),
    FilterBinding::category("category", "category"),
    FilterBinding::flag("inStock", "in_stock"),
];

/// Search strategy for sealed products. Requires two characters of query so
/// bare initials do not sweep the whole catalog.
pub struct ProductStrategy {
    core: StrategyCore<Product>,
}

impl ProductStrategy {
    pub const TYPE_ID: &'static str = "products";
    pub const DEPENDENCIES: [&'static str; 1] = ["productRepository"];

    pub fn new(products: Arc<dyn Repository<Product>>, tuning: StrategyTuning) -> Self {
        Self {
            core: StrategyCore::new(products, Self::domain_spec(), tuning),
        }
    }

    fn domain_spec() -> DomainSpec<Product> {
        DomainSpec {
            type_id: Self::TYPE_ID,
            min_query_length: 2,
            fields: vec![
                FieldWeight::new("name", 10.0),
                FieldWeight::new("brand", 5.0),
                FieldWeight::new("category", 3.0),
            ],
            secondary_sort: |a, b| {
                b.popularity
                    .partial_cmp(&a.popularity)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            },
        }
    }

    fn custom_score(product: &Product) -> f64 {
        let stocked = if product.in_stock { IN_STOCK_BONUS } else { 0.0 };
        stocked + POPULARITY_SPAN * product.popularity()
    }

    fn display_name(product: &Product) -> String {
        match &product.category {
            Some(category) => format!("{} ({category})", product.name),
            None => product.name.clone(),
        }
    }

    fn project(product: &Product) -> Result<Value> {
        let mut map = project_record(product)?;
        map.insert("displayName".into(), json!(Self::display_name(product)));
        Ok(Value::Object(map))
    }

    /// Facet listing: distinct categories with product counts.
    pub async fn categories(&self) -> Result<Vec<GroupCount>> {
        Ok(self.core.repo.count_grouped("category").await?)
    }

    pub fn descriptor() -> StrategyDescriptor {
        let constructor = Arc::new(|deps: &ResolvedDependencies, options: &Map<String, Value>| {
            let products: Arc<dyn Repository<Product>> =
                dependency(deps, Self::DEPENDENCIES[0])?;
            Ok(Arc::new(ProductStrategy::new(
                products,
                StrategyTuning::from_options(options),
            )) as Arc<dyn SearchStrategy>)
        });
        StrategyDescriptor::new(constructor)
            .with_dependencies(Self::DEPENDENCIES.iter().map(|s| s.to_string()).collect())
            .with_default_options(default_options())
    }
}

fn default_options() -> Map<String, Value> {
    let Value::Object(map) = json!({"hybrid": true, "suggest_limit": 8}) else {
        unreachable!()
    };
    map
}

#[async_trait]
impl SearchStrategy for ProductStrategy {
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
                let product = hit.record;
                let mut metadata = std::collections::BTreeMap::new();
                if let Some(price) = product.price {
                    metadata.insert("price".to_string(), json!(price));
                }
                metadata.insert("inStock".to_string(), json!(product.in_stock));
                Suggestion {
                    id: product.id.clone(),
                    label: product.name.clone(),
                    secondary: product.category.clone(),
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

    fn products() -> Vec<Product> {
        vec![
            Product {
                id: "p-1".into(),
                name: "Booster Box".into(),
                brand: Some("Cardex".into()),
                category: Some("Sealed".into()),
                price: Some(140.0),
                in_stock: true,
                popularity: 0.8,
            },
            Product {
                id: "p-2".into(),
                name: "Booster Pack".into(),
                brand: Some("Cardex".into()),
                category: Some("Sealed".into()),
                price: Some(5.0),
                in_stock: false,
                popularity: 0.9,
            },
            Product {
                id: "p-3".into(),
                name: "Card Sleeves".into(),
                brand: Some("ProGuard".into()),
                category: Some("Accessories".into()),
                price: Some(12.0),
                in_stock: true,
                popularity: 0.3,
            },
        ]
    }

    fn strategy() -> ProductStrategy {
        ProductStrategy::new(
            Arc::new(MemoryRepository::new(products())),
            StrategyTuning {
                hybrid: false,
                ..StrategyTuning::default()
            },
        )
    }

    #[tokio::test]
    async fn one_character_query_returns_empty_without_error() {
        let hits = strategy()
            .search("b", &SearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn price_range_filter_is_inclusive() {
        let mut options = SearchOptions::default();
        options.filters.insert(
            "price".into(),
            FilterValue::Range {
                min: Some(5.0),
                max: Some(20.0),
            },
        );
        let hits = strategy().search("booster", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record["id"], json!("p-2"));
    }

    #[tokio::test]
    async fn in_stock_flag_filters_out_of_stock() {
        let mut options = SearchOptions::default();
        options
            .filters
            .insert("inStock".into(), FilterValue::Flag(true));
        let hits = strategy().search("booster", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record["id"], json!("p-1"));
    }

    #[tokio::test]
    async fn display_name_includes_category() {
        let hits = strategy()
            .search("sleeves", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(
            hits[0].record["displayName"],
            json!("Card Sleeves (Accessories)")
        );
    }

    #[tokio::test]
    async fn categories_facet_counts_products() {
        let facets = strategy().categories().await.unwrap();
        assert_eq!(
            facets,
            vec![
                GroupCount {
                    key: "Accessories".into(),
                    count: 1
                },
                GroupCount {
                    key: "Sealed".into(),
                    count: 2
                },
            ]
        );
    }
}
