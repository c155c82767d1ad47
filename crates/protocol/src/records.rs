use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Projection contract the search core reads from a domain record.
///
/// Records stay owned by their repositories; the core only asks for
/// declared text fields and a normalized popularity counter.
pub trait Searchable: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Text content of a declared searchable field, if present on this record.
    fn text_field(&self, field: &str) -> Option<Cow<'_, str>>;

    /// Numeric content of a field used by range filters and scoring.
    fn numeric_field(&self, field: &str) -> Option<f64>;

    /// Boolean content of a field used by existence filters.
    fn flag_field(&self, field: &str) -> Option<bool> {
        let _ = field;
        None
    }

    /// Domain popularity/recency counter, already normalized to [0, 1].
    fn popularity(&self) -> f64;
}

/// A collectible card. `set_name` is joined context resolved from the
/// parent set during search, not a persisted column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    pub number: String,
    pub variety: Option<String>,
    pub rarity: Option<String>,
    pub set_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    pub price: Option<f64>,
    pub population: Option<u64>,
    pub available: bool,
    /// Normalized view/favorite counter in [0, 1].
    #[serde(default)]
    pub popularity: f64,
}

impl Searchable for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            "name" => Some(Cow::Borrowed(self.name.as_str())),
            "number" => Some(Cow::Borrowed(self.number.as_str())),
            "variety" => self.variety.as_deref().map(Cow::Borrowed),
            "rarity" => self.rarity.as_deref().map(Cow::Borrowed),
            "setName" => self.set_name.as_deref().map(Cow::Borrowed),
            // Filterable, not part of the declared searchable field list.
            "set_id" => self.set_id.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn numeric_field(&self, field: &str) -> Option<f64> {
        match field {
            "price" => self.price,
            "population" => self.population.map(|p| p as f64),
            _ => None,
        }
    }

    fn flag_field(&self, field: &str) -> Option<bool> {
        match field {
            "available" => Some(self.available),
            _ => None,
        }
    }

    fn popularity(&self) -> f64 {
        self.popularity.clamp(0.0, 1.0)
    }
}

/// A sealed product (booster box, elite trainer box, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub in_stock: bool,
    /// Normalized sales counter in [0, 1].
    #[serde(default)]
    pub popularity: f64,
}

impl Searchable for Product {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            "name" => Some(Cow::Borrowed(self.name.as_str())),
            "brand" => self.brand.as_deref().map(Cow::Borrowed),
            "category" => self.category.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn numeric_field(&self, field: &str) -> Option<f64> {
        match field {
            "price" => self.price,
            _ => None,
        }
    }

    fn flag_field(&self, field: &str) -> Option<bool> {
        match field {
            "in_stock" | "inStock" => Some(self.in_stock),
            _ => None,
        }
    }

    fn popularity(&self) -> f64 {
        self.popularity.clamp(0.0, 1.0)
    }
}

/// A card set/expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardSet {
    pub id: String,
    pub name: String,
    pub series: Option<String>,
    pub abbreviation: Option<String>,
    pub release_year: Option<u32>,
    pub card_count: Option<u32>,
    /// Normalized completion/interest counter in [0, 1].
    #[serde(default)]
    pub popularity: f64,
}

impl Searchable for CardSet {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            "name" => Some(Cow::Borrowed(self.name.as_str())),
            "series" => self.series.as_deref().map(Cow::Borrowed),
            "abbreviation" => self.abbreviation.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn numeric_field(&self, field: &str) -> Option<f64> {
        match field {
            "year" | "release_year" => self.release_year.map(f64::from),
            "card_count" => self.card_count.map(f64::from),
            _ => None,
        }
    }

    fn popularity(&self) -> f64 {
        self.popularity.clamp(0.0, 1.0)
    }
}
