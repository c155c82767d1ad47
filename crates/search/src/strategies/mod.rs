mod card;
mod product;
mod set;

pub use card::CardStrategy;
pub use product::ProductStrategy;
pub use set::SetStrategy;

use crate::error::{Result, SearchError};
use crate::registry::ResolvedDependencies;
use serde::Serialize;
use serde_json::{Map, Value};

/// Pull one declared dependency out of the resolved map, with the concrete
/// type it was registered under.
fn dependency<T: Clone + Send + Sync + 'static>(
    deps: &ResolvedDependencies,
    name: &str,
) -> Result<T> {
    let dependency = deps.get(name).ok_or_else(|| {
        SearchError::DependencyResolution(format!("dependency '{name}' was not resolved"))
    })?;
    cardex_store::expect_dependency::<T>(name, dependency)
        .map_err(|error| SearchError::DependencyResolution(error.to_string()))
}

/// Serialize a record for output, stripping internal bookkeeping fields.
fn project_record<T: Serialize>(record: &T) -> Result<Map<String, Value>> {
    let Value::Object(mut map) = serde_json::to_value(record)? else {
        return Err(SearchError::Other(
            "record did not serialize to an object".into(),
        ));
    };
    map.remove("popularity");
    Ok(map)
}
