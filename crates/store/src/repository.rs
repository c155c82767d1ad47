use crate::error::Result;
use crate::query::QuerySpec;
use async_trait::async_trait;
use cardex_protocol::Searchable;
use serde::{Deserialize, Serialize};

/// One bucket from a grouped count (facet listings: categories, years, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

/// The persistence contract the search core consumes. One implementation per
/// domain collection; the core never touches storage directly.
#[async_trait]
pub trait Repository<R: Searchable>: Send + Sync {
    /// Execute a structured query: pattern matching across declared fields,
    /// filters, optional sort, then skip/limit.
    async fn query(&self, spec: &QuerySpec) -> Result<Vec<R>>;

    /// Batch lookup by record id, used for relational joins. Unknown ids are
    /// silently absent from the result.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<R>>;

    /// Group records by a field value and count each bucket, sorted by key.
    async fn count_grouped(&self, field: &str) -> Result<Vec<GroupCount>>;
}
