use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Bad query/options shape or bounds. Surfaced to the caller, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown search type: {0}")]
    TypeNotFound(String),

    /// Misconfigured registry; surfaced at strategy-construction time.
    #[error("Dependency resolution failed: {0}")]
    DependencyResolution(String),

    /// Caught internally by the hybrid path; triggers structured-only fallback.
    #[error("Fuzzy engine error: {0}")]
    FuzzyEngine(String),

    #[error("Cache key construction failed: {0}")]
    CacheKey(String),

    #[error("Store error: {0}")]
    Store(#[from] cardex_store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
