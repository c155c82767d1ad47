use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hard ceiling on per-call result limits.
pub const MAX_LIMIT: usize = 100;

/// Queries longer than this (after trimming) are rejected.
pub const MAX_QUERY_LENGTH: usize = 200;

fn default_limit() -> usize {
    20
}

fn default_page() -> usize {
    1
}

/// Per-call search options. Bounds are validated by the strategy before any
/// repository query runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,

    /// Structured filters; unknown keys are ignored by strategies.
    #[serde(default)]
    pub filters: HashMap<String, FilterValue>,

    /// Per-call override of the strategy's hybrid-ranking mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid: Option<bool>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            page: default_page(),
            sort: None,
            filters: HashMap::new(),
            hybrid: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn bounds_ok(&self) -> bool {
        (1..=MAX_LIMIT).contains(&self.limit) && self.page >= 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// A caller-supplied filter value. Range bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Range {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_within_bounds() {
        let options = SearchOptions::default();
        assert!(options.bounds_ok());
        assert_eq!(options.limit, 20);
        assert_eq!(options.page, 1);
    }

    #[test]
    fn bounds_reject_zero_and_oversized_limits() {
        assert!(!SearchOptions::with_limit(0).bounds_ok());
        assert!(!SearchOptions::with_limit(101).bounds_ok());
        assert!(SearchOptions::with_limit(100).bounds_ok());

        let mut options = SearchOptions::default();
        options.page = 0;
        assert!(!options.bounds_ok());
    }

    #[test]
    fn filter_values_deserialize_untagged() {
        let parsed: FilterValue = serde_json::from_str(r#"{"min": 10.0, "max": 50.0}"#).unwrap();
        assert_eq!(
            parsed,
            FilterValue::Range {
                min: Some(10.0),
                max: Some(50.0)
            }
        );

        let parsed: FilterValue = serde_json::from_str("true").unwrap();
        assert_eq!(parsed, FilterValue::Flag(true));

        let parsed: FilterValue = serde_json::from_str(r#""Rare""#).unwrap();
        assert_eq!(parsed, FilterValue::Text("Rare".into()));
    }
}
