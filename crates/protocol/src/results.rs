use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One ranked hit. `record` is the domain projection with internal scoring
/// fields stripped and derived display fields added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: serde_json::Value,

    /// Final relevance, always >= 0. Within one result sequence scores are
    /// non-increasing by position.
    pub score: f64,

    pub matched_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<FieldHighlight>,
}

/// Byte offset spans of matched text within one field, for UI highlighting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldHighlight {
    pub field: String,
    pub spans: Vec<(usize, usize)>,
}

/// A typeahead suggestion projected from a full search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Per-type slice of a multi-type outcome. Present for every requested type,
/// whether or not that type's search succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeOutcome<T> {
    pub data: Vec<T>,
    pub count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> TypeOutcome<T> {
    pub fn ok(data: Vec<T>) -> Self {
        let count = data.len();
        Self {
            data,
            count,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            count: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome map of a fan-out call, keyed by type-id.
pub type MultiTypeOutcome<T> = BTreeMap<String, TypeOutcome<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_carries_error() {
        let outcome: TypeOutcome<SearchResult> = TypeOutcome::failed("repository offline");
        assert!(!outcome.success);
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.error.as_deref(), Some("repository offline"));
    }

    #[test]
    fn ok_outcome_counts_data() {
        let hit = SearchResult {
            record: serde_json::json!({"id": "c-1"}),
            score: 42.0,
            matched_fields: vec!["name".into()],
            highlights: vec![],
        };
        let outcome = TypeOutcome::ok(vec![hit]);
        assert!(outcome.success);
        assert_eq!(outcome.count, 1);
        assert!(outcome.error.is_none());
    }
}
