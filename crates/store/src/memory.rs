use crate::error::Result;
use crate::query::{FilterCondition, FilterOp, QuerySpec};
use crate::repository::{GroupCount, Repository};
use async_trait::async_trait;
use cardex_protocol::{Searchable, SortDirection, SortSpec};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// In-memory reference implementation of the repository contract. Backs the
/// test suites and lets the engine run stand-alone without a document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository<R: Searchable> {
    records: Vec<R>,
}

impl<R: Searchable> MemoryRepository<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_candidate(&self, record: &R, spec: &QuerySpec) -> bool {
        let matched = spec.patterns.is_empty()
            || spec.fields.iter().any(|field| {
                record.text_field(field).is_some_and(|text| {
                    spec.patterns.iter().any(|pattern| pattern.matches(&text))
                })
            });
        matched && spec.filters.iter().all(|filter| self.filter_holds(record, filter))
    }

    fn filter_holds(&self, record: &R, filter: &FilterCondition) -> bool {
        match &filter.op {
            FilterOp::Range { min, max } => match record.numeric_field(&filter.field) {
                Some(value) => {
                    min.is_none_or(|lo| value >= lo) && max.is_none_or(|hi| value <= hi)
                }
                None => false,
            },
            FilterOp::Equals(expected) => record
                .text_field(&filter.field)
                .is_some_and(|text| text.eq_ignore_ascii_case(expected)),
            FilterOp::Flag(expected) => record
                .flag_field(&filter.field)
                .is_some_and(|value| value == *expected),
        }
    }

    fn compare(record_a: &R, record_b: &R, sort: &SortSpec) -> Ordering {
        let ordering = match (
            record_a.numeric_field(&sort.field),
            record_b.numeric_field(&sort.field),
        ) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => {
                let a = record_a.text_field(&sort.field).unwrap_or_default();
                let b = record_b.text_field(&sort.field).unwrap_or_default();
                a.cmp(&b)
            }
        };
        let ordering = match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        // Stable tie-break so repeated queries return one ordering.
        ordering.then_with(|| record_a.id().cmp(record_b.id()))
    }
}

#[async_trait]
impl<R: Searchable> Repository<R> for MemoryRepository<R> {
    async fn query(&self, spec: &QuerySpec) -> Result<Vec<R>> {
        let mut hits: Vec<R> = self
            .records
            .iter()
            .filter(|record| self.is_candidate(record, spec))
            .cloned()
            .collect();

        if let Some(sort) = &spec.sort {
            hits.sort_by(|a, b| Self::compare(a, b, sort));
        }

        let hits: Vec<R> = hits
            .into_iter()
            .skip(spec.skip)
            .take(spec.limit)
            .collect();
        log::debug!("memory query: {} hits (skip={})", hits.len(), spec.skip);
        Ok(hits)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<R>> {
        Ok(self
            .records
            .iter()
            .filter(|record| ids.iter().any(|id| id == record.id()))
            .cloned()
            .collect())
    }

    async fn count_grouped(&self, field: &str) -> Result<Vec<GroupCount>> {
        let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
        for record in &self.records {
            let key = record
                .text_field(field)
                .map(|text| text.into_owned())
                .or_else(|| record.numeric_field(field).map(format_numeric_key));
            if let Some(key) = key {
                *buckets.entry(key).or_insert(0) += 1;
            }
        }
        Ok(buckets
            .into_iter()
            .map(|(key, count)| GroupCount { key, count })
            .collect())
    }
}

fn format_numeric_key(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TextPattern;
    use cardex_protocol::CardSet;

    fn sets() -> Vec<CardSet> {
        vec![
            CardSet {
                id: "s-1".into(),
                name: "Base Set".into(),
                series: Some("Original".into()),
                abbreviation: Some("BS".into()),
                release_year: Some(1999),
                card_count: Some(102),
                popularity: 0.9,
            },
            CardSet {
                id: "s-2".into(),
                name: "Jungle".into(),
                series: Some("Original".into()),
                abbreviation: Some("JU".into()),
                release_year: Some(1999),
                card_count: Some(64),
                popularity: 0.6,
            },
            CardSet {
                id: "s-3".into(),
                name: "Evolving Skies".into(),
                series: Some("Sword & Shield".into()),
                abbreviation: Some("EVS".into()),
                release_year: Some(2021),
                card_count: Some(237),
                popularity: 0.8,
            },
        ]
    }

    fn name_query(query: &str, limit: usize) -> QuerySpec {
        QuerySpec {
            fields: vec!["name".into()],
            patterns: TextPattern::generate(query, true).unwrap(),
            filters: Vec::new(),
            sort: None,
            skip: 0,
            limit,
        }
    }

    #[tokio::test]
    async fn query_matches_any_pattern_on_declared_fields() {
        let repo = MemoryRepository::new(sets());
        let hits = repo.query(&name_query("skies", 10)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s-3");
    }

    #[tokio::test]
    async fn range_filter_is_inclusive() {
        let repo = MemoryRepository::new(sets());
        let mut spec = QuerySpec::match_all(10);
        spec.filters.push(FilterCondition {
            field: "year".into(),
            op: FilterOp::range(Some(1999.0), Some(1999.0)),
        });
        let hits = repo.query(&spec).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn categorical_filter_ignores_case() {
        let repo = MemoryRepository::new(sets());
        let mut spec = QuerySpec::match_all(10);
        spec.filters.push(FilterCondition {
            field: "series".into(),
            op: FilterOp::Equals("original".into()),
        });
        let hits = repo.query(&spec).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn sort_and_pagination_apply_after_filtering() {
        let repo = MemoryRepository::new(sets());
        let mut spec = QuerySpec::match_all(1);
        spec.sort = Some(SortSpec {
            field: "year".into(),
            direction: SortDirection::Desc,
        });
        spec.skip = 1;
        let hits = repo.query(&spec).await.unwrap();
        assert_eq!(hits.len(), 1);
        // Newest first, skipping Evolving Skies; s-1 wins the 1999 tie by id.
        assert_eq!(hits[0].id, "s-1");
    }

    #[tokio::test]
    async fn fetch_by_ids_skips_unknown() {
        let repo = MemoryRepository::new(sets());
        let hits = repo
            .fetch_by_ids(&["s-2".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s-2");
    }

    #[tokio::test]
    async fn count_grouped_buckets_by_value() {
        let repo = MemoryRepository::new(sets());
        let buckets = repo.count_grouped("series").await.unwrap();
        assert_eq!(
            buckets,
            vec![
                GroupCount {
                    key: "Original".into(),
                    count: 2
                },
                GroupCount {
                    key: "Sword & Shield".into(),
                    count: 1
                },
            ]
        );

        let years = repo.count_grouped("year").await.unwrap();
        assert_eq!(years[0].key, "1999");
        assert_eq!(years[0].count, 2);
    }
}
