use crate::fuzzy::FieldWeight;
use cardex_protocol::{FieldHighlight, Searchable};
use cardex_store::{PatternKind, TextPattern};

/// Points per match kind. An exact full-field match on the top-weighted
/// field scores 100; weaker kinds step down from there.
pub const EXACT_POINTS: f64 = 100.0;
pub const PREFIX_POINTS: f64 = 60.0;
pub const SUBSTRING_POINTS: f64 = 40.0;
pub const WORD_BOUNDARY_POINTS: f64 = 25.0;
pub const CHARS_IN_ORDER_POINTS: f64 = 10.0;

/// Cap on the popularity/recency term.
pub const POPULARITY_CAP: f64 = 20.0;

/// Cap on the inverse-field-length term; shorter equally-matching values
/// outrank longer ones.
pub const LENGTH_CAP: f64 = 10.0;

/// Field length at which the length bonus halves.
const LENGTH_HALF_POINT: f64 = 16.0;

pub fn kind_points(kind: PatternKind) -> f64 {
    match kind {
        PatternKind::Exact => EXACT_POINTS,
        PatternKind::Prefix => PREFIX_POINTS,
        PatternKind::Substring => SUBSTRING_POINTS,
        PatternKind::WordBoundary => WORD_BOUNDARY_POINTS,
        PatternKind::CharsInOrder => CHARS_IN_ORDER_POINTS,
    }
}

/// Structured relevance of one candidate record.
#[derive(Debug, Clone, Default)]
pub struct StructuredScore {
    pub total: f64,
    pub matched_fields: Vec<String>,
    pub highlights: Vec<FieldHighlight>,
}

/// Additive scoring across declared fields. Every term is bounded, so the
/// total stays below [`max_structured_score`] for any input.
pub fn score_record<R: Searchable>(
    record: &R,
    fields: &[FieldWeight],
    patterns: &[TextPattern],
) -> StructuredScore {
    let max_weight = fields
        .iter()
        .map(|f| f.weight)
        .fold(f64::EPSILON, f64::max);

    let mut score = StructuredScore::default();
    let mut best_match_len: Option<usize> = None;

    for field in fields {
        let Some(text) = record.text_field(&field.field) else {
            continue;
        };

        // Patterns are generated strongest-first; the first hit wins.
        let hit = patterns
            .iter()
            .find_map(|pattern| pattern.first_span(&text).map(|span| (pattern.kind(), span)));
        let Some((kind, span)) = hit else {
            continue;
        };

        score.total += kind_points(kind) * (field.weight / max_weight);
        score.matched_fields.push(field.field.clone());
        score.highlights.push(FieldHighlight {
            field: field.field.clone(),
            spans: vec![span],
        });

        let len = text.chars().count();
        if best_match_len.is_none_or(|current| len < current) {
            best_match_len = Some(len);
        }
    }

    if score.matched_fields.is_empty() {
        return score;
    }

    score.total += POPULARITY_CAP * record.popularity();
    if let Some(len) = best_match_len {
        score.total += LENGTH_CAP * LENGTH_HALF_POINT / (LENGTH_HALF_POINT + len as f64);
    }
    score
}

/// Upper bound of [`score_record`] for a given field list, used to normalize
/// structured scores into the 0-100 band for hybrid blending.
pub fn max_structured_score(fields: &[FieldWeight]) -> f64 {
    let max_weight = fields
        .iter()
        .map(|f| f.weight)
        .fold(f64::EPSILON, f64::max);
    let field_sum: f64 = fields
        .iter()
        .map(|f| EXACT_POINTS * (f.weight / max_weight))
        .sum();
    field_sum + POPULARITY_CAP + LENGTH_CAP
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardex_protocol::Product;

    fn product(name: &str, brand: Option<&str>, popularity: f64) -> Product {
        Product {
            id: format!("p-{name}"),
            name: name.into(),
            brand: brand.map(Into::into),
            category: None,
            price: None,
            in_stock: true,
            popularity,
        }
    }

    fn fields() -> Vec<FieldWeight> {
        vec![FieldWeight::new("name", 10.0), FieldWeight::new("brand", 5.0)]
    }

    fn patterns(query: &str) -> Vec<TextPattern> {
        TextPattern::generate(query, true).unwrap()
    }

    #[test]
    fn exact_beats_prefix_beats_substring() {
        let fields = fields();
        let patterns = patterns("booster");

        let exact = score_record(&product("Booster", None, 0.0), &fields, &patterns);
        let prefix = score_record(&product("Booster Box", None, 0.0), &fields, &patterns);
        let substring = score_record(&product("MegaBooster", None, 0.0), &fields, &patterns);

        assert!(exact.total > prefix.total);
        assert!(prefix.total > substring.total);
    }

    #[test]
    fn popularity_breaks_equal_text_matches() {
        let fields = fields();
        let patterns = patterns("elite");

        let hot = score_record(&product("Elite Box", None, 1.0), &fields, &patterns);
        let cold = score_record(&product("Elite Box", None, 0.0), &fields, &patterns);
        assert!(hot.total > cold.total);
        assert!((hot.total - cold.total - POPULARITY_CAP).abs() < 1e-9);
    }

    #[test]
    fn shorter_field_outranks_longer_on_equal_match() {
        let fields = fields();
        let patterns = patterns("box");

        let short = score_record(&product("Box One", None, 0.0), &fields, &patterns);
        let long = score_record(
            &product("Box of the Grand Collection Anniversary", None, 0.0),
            &fields,
            &patterns,
        );
        assert!(short.total > long.total);
    }

    #[test]
    fn unmatched_record_scores_zero() {
        let fields = fields();
        let patterns = patterns("charizard");

        let score = score_record(&product("Sleeves", None, 1.0), &fields, &patterns);
        assert_eq!(score.total, 0.0);
        assert!(score.matched_fields.is_empty());
    }

    #[test]
    fn totals_stay_below_declared_maximum() {
        let fields = fields();
        let patterns = patterns("pro");
        let ceiling = max_structured_score(&fields);

        let score = score_record(&product("Pro", Some("Pro"), 1.0), &fields, &patterns);
        assert!(score.total > 0.0);
        assert!(score.total <= ceiling);
    }

    #[test]
    fn matched_fields_and_highlights_align() {
        let fields = fields();
        let patterns = patterns("ultra");

        let score = score_record(
            &product("Ultra Premium", Some("Ultra"), 0.2),
            &fields,
            &patterns,
        );
        assert_eq!(score.matched_fields, vec!["name", "brand"]);
        assert_eq!(score.highlights.len(), 2);
        assert_eq!(score.highlights[0].spans, vec![(0, 5)]);
    }
}
