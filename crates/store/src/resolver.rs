use crate::error::{Result, StoreError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved dependency, type-erased. Callers recover the concrete type
/// with [`expect_dependency`].
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// Resolves dependency names (repositories, collaborating services) for
/// strategy construction. Passed into the registry explicitly; there is no
/// ambient container.
pub trait DependencyResolver: Send + Sync {
    /// Fails with [`StoreError::DependencyNotFound`] for unknown names.
    fn resolve(&self, name: &str) -> Result<Dependency>;
}

/// Fixed name -> instance resolver for composition roots and tests.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Dependency>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency under `name`, replacing any prior entry.
    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), Arc::new(value));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }
}

impl DependencyResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Result<Dependency> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::DependencyNotFound(name.to_string()))
    }
}

/// Downcast a resolved dependency to its concrete registered type.
pub fn expect_dependency<T: Clone + Send + Sync + 'static>(
    name: &str,
    dependency: &Dependency,
) -> Result<T> {
    dependency
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| StoreError::DependencyType {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_names() {
        let resolver = StaticResolver::new().with("answer", 42u32);
        let dependency = resolver.resolve("answer").unwrap();
        let value: u32 = expect_dependency("answer", &dependency).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn unknown_name_is_distinguishable() {
        let resolver = StaticResolver::new();
        match resolver.resolve("ghost") {
            Err(StoreError::DependencyNotFound(name)) => assert_eq!(name, "ghost"),
            Err(other) => panic!("expected DependencyNotFound, got {other}"),
            Ok(_) => panic!("expected DependencyNotFound, got a dependency"),
        }
    }

    #[test]
    fn wrong_type_is_reported() {
        let resolver = StaticResolver::new().with("answer", 42u32);
        let dependency = resolver.resolve("answer").unwrap();
        let result: Result<String> = expect_dependency("answer", &dependency);
        assert!(matches!(result, Err(StoreError::DependencyType { .. })));
    }
}
