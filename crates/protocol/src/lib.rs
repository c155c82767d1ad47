mod options;
mod records;
mod results;

pub use options::{FilterValue, SearchOptions, SortDirection, SortSpec, MAX_LIMIT, MAX_QUERY_LENGTH};
pub use records::{Card, CardSet, Product, Searchable};
pub use results::{FieldHighlight, MultiTypeOutcome, SearchResult, Suggestion, TypeOutcome};
