mod base;
mod error;
mod fuzzy;
mod multi;
mod registry;
mod score;
mod strategies;
mod strategy;

pub use base::{
    DomainSpec, FilterBinding, FilterKind, NoLookup, RankedRecord, RelationalLookup,
    StrategyCore, HYBRID_CUSTOM_WEIGHT, HYBRID_FUZZY_WEIGHT, HYBRID_STRUCTURED_WEIGHT,
};
pub use error::{Result, SearchError};
pub use fuzzy::{FieldWeight, FuzzyIndex, FuzzyMatch};
pub use multi::{SearchService, MULTI_SUGGEST_LIMIT};
pub use registry::{
    cache_key, CacheStats, ResolvedDependencies, StrategyConstructor, StrategyDescriptor,
    StrategyRegistry,
};
pub use strategies::{CardStrategy, ProductStrategy, SetStrategy};
pub use strategy::{SearchStrategy, StrategyTuning, SupportedOptions, SUGGEST_LIMIT_CEILING};
