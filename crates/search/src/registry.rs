use crate::error::{Result, SearchError};
use crate::strategy::SearchStrategy;
use cardex_store::{Dependency, DependencyResolver};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

/// Nesting ceiling for option maps during cache-key construction. Deeper
/// structures fail explicitly instead of recursing without bound.
pub const MAX_OPTION_DEPTH: usize = 64;

/// Dependencies resolved for one construction, keyed by declared name.
pub type ResolvedDependencies = HashMap<String, Dependency>;

/// Builds a strategy instance from resolved dependencies and the merged
/// option map.
pub type StrategyConstructor = Arc<
    dyn Fn(&ResolvedDependencies, &Map<String, Value>) -> Result<Arc<dyn SearchStrategy>>
        + Send
        + Sync,
>;

/// Catalog entry for one searchable type.
#[derive(Clone)]
pub struct StrategyDescriptor {
    pub constructor: StrategyConstructor,
    /// Ordered dependency names handed to the resolver at construction.
    pub dependencies: Vec<String>,
    pub default_options: Map<String, Value>,
}

impl StrategyDescriptor {
    pub fn new(constructor: StrategyConstructor) -> Self {
        Self {
            constructor,
            dependencies: Vec::new(),
            default_options: Map::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_default_options(mut self, defaults: Map<String, Value>) -> Self {
        self.default_options = defaults;
        self
    }
}

struct CachedInstance {
    type_id: String,
    instance: Arc<dyn SearchStrategy>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Owns the strategy catalog and turns (type, options) requests into ready
/// instances, optionally reusing cached ones. Type-ids are case-insensitive.
///
/// The descriptor and cache maps are the only shared mutable state in the
/// engine; both sit behind `RwLock`s so one registry can serve concurrent
/// callers.
pub struct StrategyRegistry {
    resolver: Arc<dyn DependencyResolver>,
    descriptors: RwLock<HashMap<String, StrategyDescriptor>>,
    cache: RwLock<HashMap<String, CachedInstance>>,
    cache_enabled: bool,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl StrategyRegistry {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self::with_caching(resolver, true)
    }

    pub fn with_caching(resolver: Arc<dyn DependencyResolver>, cache_enabled: bool) -> Self {
        Self {
            resolver,
            descriptors: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            cache_enabled,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Register (or replace) the descriptor for a type. Any cached instances
    /// built from a replaced descriptor are purged.
    pub fn register_strategy(
        &self,
        type_id: &str,
        descriptor: StrategyDescriptor,
    ) -> Result<()> {
        let key = normalize_type_id(type_id)?;
        if descriptor
            .dependencies
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(SearchError::Validation(format!(
                "strategy '{type_id}' declares an empty dependency name"
            )));
        }

        self.purge_type(&key);
        let mut descriptors = self.descriptors.write().expect("descriptor lock poisoned");
        if descriptors.insert(key.clone(), descriptor).is_some() {
            log::debug!("replaced strategy descriptor '{key}'");
        }
        Ok(())
    }

    /// Remove a type's descriptor and purge its cache entries. Returns false
    /// for unknown types.
    pub fn unregister_strategy(&self, type_id: &str) -> bool {
        let Ok(key) = normalize_type_id(type_id) else {
            return false;
        };
        let removed = self
            .descriptors
            .write()
            .expect("descriptor lock poisoned")
            .remove(&key)
            .is_some();
        if removed {
            self.purge_type(&key);
        }
        removed
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .descriptors
            .read()
            .expect("descriptor lock poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn is_type_supported(&self, type_id: &str) -> bool {
        normalize_type_id(type_id).is_ok_and(|key| {
            self.descriptors
                .read()
                .expect("descriptor lock poisoned")
                .contains_key(&key)
        })
    }

    /// Construct a fresh instance, never consulting the cache. Dependency
    /// names are resolved in declaration order; descriptor defaults are
    /// merged under the call-supplied options (call-supplied values win).
    pub fn create_strategy(
        &self,
        type_id: &str,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn SearchStrategy>> {
        let key = normalize_type_id(type_id)?;
        let descriptor = self
            .descriptors
            .read()
            .expect("descriptor lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| SearchError::TypeNotFound(type_id.to_string()))?;

        let mut resolved = ResolvedDependencies::new();
        for name in &descriptor.dependencies {
            let dependency = self.resolver.resolve(name).map_err(|error| {
                SearchError::DependencyResolution(format!(
                    "strategy '{key}' dependency '{name}': {error}"
                ))
            })?;
            resolved.insert(name.clone(), dependency);
        }

        let merged = merge_options(&descriptor.default_options, options);
        (descriptor.constructor)(&resolved, &merged)
    }

    /// Cache-aware construction. With caching disabled this is identical to
    /// [`Self::create_strategy`].
    pub fn get_strategy(
        &self,
        type_id: &str,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn SearchStrategy>> {
        if !self.cache_enabled {
            return self.create_strategy(type_id, options);
        }

        let key = cache_key(type_id, options)?;
        {
            let cache = self.cache.read().expect("cache lock poisoned");
            if let Some(cached) = cache.get(&key) {
                self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
                return Ok(Arc::clone(&cached.instance));
            }
        }

        self.cache_misses.fetch_add(1, AtomicOrdering::Relaxed);
        let instance = self.create_strategy(type_id, options)?;
        let type_key = normalize_type_id(type_id)?;
        let mut cache = self.cache.write().expect("cache lock poisoned");
        let entry = cache.entry(key).or_insert_with(|| CachedInstance {
            type_id: type_key,
            instance: Arc::clone(&instance),
        });
        Ok(Arc::clone(&entry.instance))
    }

    /// Best-effort batch acquisition: failures are logged and the failing
    /// type is absent from the returned map; no failure aborts the batch.
    ///
    /// Unlike [`Self::create_strategy`], each type goes through the
    /// cache-aware [`Self::get_strategy`] path, so cached instances are
    /// reused when caching is enabled.
    pub fn create_strategies(
        &self,
        type_ids: &[String],
        options: &Map<String, Value>,
    ) -> HashMap<String, Arc<dyn SearchStrategy>> {
        let mut strategies = HashMap::new();
        for type_id in type_ids {
            match self.get_strategy(type_id, options) {
                Ok(strategy) => {
                    strategies.insert(type_id.to_lowercase(), strategy);
                }
                Err(error) => {
                    log::warn!("skipping strategy '{type_id}': {error}");
                }
            }
        }
        strategies
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.cache_enabled,
            entries: self.cache.read().expect("cache lock poisoned").len(),
            hits: self.cache_hits.load(AtomicOrdering::Relaxed),
            misses: self.cache_misses.load(AtomicOrdering::Relaxed),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.write().expect("cache lock poisoned").clear();
        self.cache_hits.store(0, AtomicOrdering::Relaxed);
        self.cache_misses.store(0, AtomicOrdering::Relaxed);
    }

    /// Drop every cache entry belonging to one type.
    fn purge_type(&self, key: &str) {
        self.cache
            .write()
            .expect("cache lock poisoned")
            .retain(|_, cached| cached.type_id != key);
    }

    #[cfg(test)]
    fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .cache
            .read()
            .expect("cache lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

fn normalize_type_id(type_id: &str) -> Result<String> {
    let trimmed = type_id.trim();
    if trimmed.is_empty() {
        return Err(SearchError::Validation(
            "strategy type-id must not be empty".into(),
        ));
    }
    Ok(trimmed.to_lowercase())
}

fn merge_options(
    defaults: &Map<String, Value>,
    supplied: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in supplied {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Deterministic cache key: type-id plus the canonically serialized option
/// map. Identical (type, options) always produce the same key; option maps
/// differing by value never collide.
pub fn cache_key(type_id: &str, options: &Map<String, Value>) -> Result<String> {
    let key = normalize_type_id(type_id)?;
    let mut serialized = String::new();
    write_canonical(&Value::Object(options.clone()), 0, &mut serialized)?;
    Ok(format!("{key}:{serialized}"))
}

/// Canonical JSON: object keys sorted recursively so insertion order never
/// leaks into the key.
fn write_canonical(value: &Value, depth: usize, out: &mut String) -> Result<()> {
    if depth > MAX_OPTION_DEPTH {
        return Err(SearchError::CacheKey(format!(
            "options nest deeper than {MAX_OPTION_DEPTH} levels"
        )));
    }
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], depth + 1, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, depth + 1, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
    Ok(())
}
