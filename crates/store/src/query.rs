use crate::error::Result;
use cardex_protocol::SortSpec;
use regex::Regex;

/// How a text pattern was derived from the query. Listed in priority order:
/// when several patterns match the same field, the strongest kind wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternKind {
    Exact,
    Prefix,
    Substring,
    WordBoundary,
    /// All query characters present in field order ("pkchu" ~ "Pikachu").
    CharsInOrder,
}

/// A case-insensitive text pattern evaluated against declared searchable
/// fields. Compiled once per query, shared across all candidate records.
#[derive(Debug, Clone)]
pub struct TextPattern {
    kind: PatternKind,
    regex: Regex,
}

impl TextPattern {
    pub fn new(kind: PatternKind, query: &str) -> Result<Self> {
        let escaped = regex::escape(query);
        let source = match kind {
            PatternKind::Exact => format!("(?i)^{escaped}$"),
            PatternKind::Prefix => format!("(?i)^{escaped}"),
            PatternKind::Substring => format!("(?i){escaped}"),
            PatternKind::WordBoundary => format!(r"(?i)\b{escaped}\b"),
            PatternKind::CharsInOrder => {
                let interleaved: Vec<String> = query
                    .chars()
                    .map(|c| regex::escape(&c.to_string()))
                    .collect();
                format!("(?i){}", interleaved.join(".*?"))
            }
        };
        Ok(Self {
            kind,
            regex: Regex::new(&source)?,
        })
    }

    /// Generate the pattern ladder for a normalized (trimmed) query, in
    /// priority order. The chars-in-order pattern is only emitted when fuzzy
    /// matching is enabled and the query is longer than two characters.
    pub fn generate(query: &str, fuzzy_enabled: bool) -> Result<Vec<TextPattern>> {
        let mut patterns = vec![
            TextPattern::new(PatternKind::Exact, query)?,
            TextPattern::new(PatternKind::Prefix, query)?,
            TextPattern::new(PatternKind::Substring, query)?,
            TextPattern::new(PatternKind::WordBoundary, query)?,
        ];
        if fuzzy_enabled && query.chars().count() > 2 {
            patterns.push(TextPattern::new(PatternKind::CharsInOrder, query)?);
        }
        Ok(patterns)
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Byte offsets of the first match within `text`, for highlighting.
    pub fn first_span(&self, text: &str) -> Option<(usize, usize)> {
        self.regex.find(text).map(|m| (m.start(), m.end()))
    }
}

/// Structured filter against one record field.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone)]
pub enum FilterOp {
    /// Inclusive numeric range; open bounds are unconstrained.
    Range { min: Option<f64>, max: Option<f64> },
    /// Case-insensitive categorical equality.
    Equals(String),
    /// Boolean flag must equal the given value.
    Flag(bool),
}

impl FilterOp {
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range { min, max }
    }
}

/// The query contract a repository executes for the structured path:
/// a record is a candidate when any declared field matches any pattern
/// (logical OR across field x pattern) and every filter holds.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Declared searchable fields, in weight order.
    pub fields: Vec<String>,

    /// Pattern ladder; empty means "match all records".
    pub patterns: Vec<TextPattern>,

    pub filters: Vec<FilterCondition>,

    pub sort: Option<SortSpec>,

    pub skip: usize,

    pub limit: usize,
}

impl QuerySpec {
    pub fn match_all(limit: usize) -> Self {
        Self {
            fields: Vec::new(),
            patterns: Vec::new(),
            filters: Vec::new(),
            sort: None,
            skip: 0,
            limit,
        }
    }
}
