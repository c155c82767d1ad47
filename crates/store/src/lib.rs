mod error;
mod memory;
mod query;
mod repository;
mod resolver;

pub use error::{Result, StoreError};
pub use memory::MemoryRepository;
pub use query::{FilterCondition, FilterOp, PatternKind, QuerySpec, TextPattern};
pub use repository::{GroupCount, Repository};
pub use resolver::{expect_dependency, Dependency, DependencyResolver, StaticResolver};
