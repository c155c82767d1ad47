use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Dependency '{name}' has unexpected type (expected {expected})")]
    DependencyType { name: String, expected: &'static str },

    #[error("Query error: {0}")]
    Query(String),

    #[error("{0}")]
    Other(String),
}
