use crate::error::{Result, SearchError};
use cardex_protocol::{FieldHighlight, Searchable};
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32String};

/// A searchable field and its relative weight in fuzzy ranking.
#[derive(Debug, Clone)]
pub struct FieldWeight {
    pub field: String,
    pub weight: f64,
}

impl FieldWeight {
    pub fn new(field: impl Into<String>, weight: f64) -> Self {
        Self {
            field: field.into(),
            weight,
        }
    }
}

/// One fuzzy hit: candidate index, 0-100 relevance, highlight spans per
/// matched field.
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub index: usize,
    pub score: f64,
    pub highlights: Vec<FieldHighlight>,
}

/// Approximate-string-matching index over one candidate set.
///
/// Built fresh for every re-ranking call; nothing is shared across requests,
/// so one query's candidates can never leak into another's results.
pub struct FuzzyIndex<'a, R: Searchable> {
    candidates: &'a [R],
    keys: &'a [FieldWeight],
}

const MAX_RELEVANCE: f64 = 100.0;

/// Multiplier applied when the query is a prefix of the field value.
const PREFIX_BOOST: f64 = 1.15;

impl<'a, R: Searchable> FuzzyIndex<'a, R> {
    pub fn new(candidates: &'a [R], keys: &'a [FieldWeight]) -> Self {
        Self { candidates, keys }
    }

    /// Fuzzy-match `query` against every candidate, returning hits sorted by
    /// relevance descending, truncated to `limit`.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<FuzzyMatch>> {
        if self.keys.is_empty() {
            return Err(SearchError::FuzzyEngine(
                "no weighted keys declared for fuzzy index".to_string(),
            ));
        }

        let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let needle = query.trim().to_lowercase();
        let max_weight = self
            .keys
            .iter()
            .map(|key| key.weight)
            .fold(f64::EPSILON, f64::max);

        struct RawHit {
            index: usize,
            weighted: f64,
            exact: bool,
            prefix: bool,
            highlights: Vec<FieldHighlight>,
        }

        let mut raw: Vec<RawHit> = Vec::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            let mut best: Option<(f64, bool, bool)> = None;
            let mut highlights = Vec::new();

            for key in self.keys {
                let Some(text) = candidate.text_field(&key.field) else {
                    continue;
                };
                let haystack = Utf32String::from(text.as_ref());
                let mut indices = Vec::new();
                let Some(score) = pattern.indices(haystack.slice(..), &mut matcher, &mut indices)
                else {
                    continue;
                };

                let normalized = text.trim().to_lowercase();
                let exact = normalized == needle;
                let prefix = !exact && normalized.starts_with(&needle);
                // Higher-weighted fields contribute proportionally more.
                let weighted = f64::from(score) * (key.weight / max_weight);

                let spans = char_runs_to_byte_spans(text.as_ref(), &indices);
                if !spans.is_empty() {
                    highlights.push(FieldHighlight {
                        field: key.field.clone(),
                        spans,
                    });
                }

                let better = best.is_none_or(|(current, _, _)| weighted > current);
                if better {
                    best = Some((weighted, exact, prefix));
                }
            }

            if let Some((weighted, exact, prefix)) = best {
                raw.push(RawHit {
                    index,
                    weighted,
                    exact,
                    prefix,
                    highlights,
                });
            }
        }

        let max_weighted = raw
            .iter()
            .map(|hit| hit.weighted)
            .fold(f64::EPSILON, f64::max);

        let mut hits: Vec<FuzzyMatch> = raw
            .into_iter()
            .map(|hit| {
                let mut score = hit.weighted / max_weighted * MAX_RELEVANCE;
                if hit.exact {
                    score = MAX_RELEVANCE;
                } else if hit.prefix {
                    score = (score * PREFIX_BOOST).min(MAX_RELEVANCE);
                }
                FuzzyMatch {
                    index: hit.index,
                    score,
                    highlights: hit.highlights,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.index.cmp(&b.index))
        });
        hits.truncate(limit);

        log::debug!("fuzzy: {} hits for '{}'", hits.len(), query);
        Ok(hits)
    }
}

/// Collapse matched char indices into contiguous byte-offset spans.
fn char_runs_to_byte_spans(text: &str, char_indices: &[u32]) -> Vec<(usize, usize)> {
    if char_indices.is_empty() {
        return Vec::new();
    }

    let offsets: Vec<(usize, char)> = text.char_indices().collect();
    let byte_range = |char_idx: usize| -> Option<(usize, usize)> {
        offsets
            .get(char_idx)
            .map(|&(start, c)| (start, start + c.len_utf8()))
    };

    let mut sorted = char_indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut run_start = sorted[0];
    let mut run_end = sorted[0];
    for &idx in &sorted[1..] {
        if idx == run_end + 1 {
            run_end = idx;
        } else {
            if let (Some((s, _)), Some((_, e))) =
                (byte_range(run_start as usize), byte_range(run_end as usize))
            {
                spans.push((s, e));
            }
            run_start = idx;
            run_end = idx;
        }
    }
    if let (Some((s, _)), Some((_, e))) =
        (byte_range(run_start as usize), byte_range(run_end as usize))
    {
        spans.push((s, e));
    }
    spans
}
