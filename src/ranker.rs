//! Relevance ranking and snippet construction.
//!
//! Turns the store's raw hits into ordered [`ScoredMatch`]es. The score is
//! a product of the normalized engine score and a few mild multipliers:
//!
//! ```text
//! score = base × field × phrase × recency × authority
//!
//! base      = 0.1 + 0.9 × minmax(raw)        (1.0 for filter-only browses)
//! field     = max weight of the matched fields
//! phrase    = 1 + phrase_bonus               when a quoted phrase occurs verbatim
//! recency   = 1 + recency_weight × age_factor
//! authority = 1 + authority_weight × tier_factor
//! ```
//!
//! Ordering is fully deterministic: score descending, then decision date
//! descending (undated last), then case id ascending.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::compiler::{CompiledQuery, QueryMode};
use crate::config::RankingConfig;
use crate::models::{Case, MatchedField, ScoredMatch};
use crate::store::RawMatches;
use crate::text::{fold, fold_chars};

const ELLIPSIS: char = '…';
const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";

pub struct Ranker {
    config: RankingConfig,
    leitsatz_max_chars: usize,
}

/// Min-max normalize raw scores into `[0, 1]`. A single candidate, or a
/// set where all scores are equal, normalizes to 1.0.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    raw.iter()
        .map(|s| {
            if range > 0.0 {
                (s - min) / range
            } else {
                1.0
            }
        })
        .collect()
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold(haystack).contains(&fold(needle))
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Window of at most `max_chars` chars around the first occurrence of any
/// term, with every term occurrence inside it wrapped in `<mark>` tags.
/// Matching ignores case and diacritics. `terms` must be longest first. Without a match the window
/// starts at the beginning of the text.
pub fn build_snippet(text: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let folded = fold_chars(text);
    let needles: Vec<Vec<char>> = terms
        .iter()
        .map(|t| fold_chars(t))
        .filter(|t| !t.is_empty())
        .collect();

    let first = needles
        .iter()
        .filter_map(|n| find_chars(&folded, n, 0))
        .min();

    let len = chars.len();
    let mut start = first.map_or(0, |pos| pos.saturating_sub(max_chars / 3));
    let end = (start + max_chars).min(len);
    if end - start < max_chars {
        start = end.saturating_sub(max_chars);
    }

    let mut out = String::with_capacity(max_chars + 32);
    if start > 0 {
        out.push(ELLIPSIS);
    }
    let mut i = start;
    while i < end {
        let hit = needles
            .iter()
            .find(|n| i + n.len() <= end && folded[i..i + n.len()] == n[..]);
        match hit {
            Some(n) => {
                out.push_str(MARK_OPEN);
                out.extend(&chars[i..i + n.len()]);
                out.push_str(MARK_CLOSE);
                i += n.len();
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    if end < len {
        out.push(ELLIPSIS);
    }
    out
}

impl Ranker {
    pub fn new(config: RankingConfig, leitsatz_max_chars: usize) -> Self {
        Self {
            config,
            leitsatz_max_chars,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Fields of `case` containing any of `terms`, in declaration order.
    pub fn matched_fields(case: &Case, terms: &[String]) -> Vec<MatchedField> {
        let fields: [(MatchedField, Option<&str>); 5] = [
            (MatchedField::Content, Some(case.content_clean.as_str())),
            (MatchedField::Court, Some(case.court_name.as_str())),
            (MatchedField::FileNumber, case.file_number.as_deref()),
            (MatchedField::Ecli, case.ecli.as_deref()),
            (MatchedField::LegalArea, case.legal_area.as_deref()),
        ];
        fields
            .into_iter()
            .filter_map(|(field, value)| {
                let value = value?;
                terms
                    .iter()
                    .any(|t| contains_folded(value, t))
                    .then_some(field)
            })
            .collect()
    }

    fn field_weight(&self, field: MatchedField) -> f64 {
        let w = &self.config.field_weights;
        match field {
            MatchedField::Content => w.content,
            MatchedField::Court => w.court,
            MatchedField::FileNumber => w.file_number,
            MatchedField::Ecli => w.ecli,
            MatchedField::LegalArea => w.legal_area,
        }
    }

    /// Linear in years behind `reference_year`, 1.0 for the newest cases and
    /// 0.0 at or beyond the horizon. Undated cases get 0.0.
    fn age_factor(&self, year: Option<i32>, reference_year: Option<i32>) -> f64 {
        match (year, reference_year) {
            (Some(y), Some(r)) => {
                let horizon = self.config.recency_horizon_years.max(1) as f64;
                let age = (r - y).max(0) as f64;
                1.0 - age.min(horizon) / horizon
            }
            _ => 0.0,
        }
    }

    /// Rank the hits of `raw`. Hits whose case is missing from `cases` are
    /// skipped.
    pub fn rank(
        &self,
        raw: &RawMatches,
        cases: &HashMap<i64, Case>,
        compiled: &CompiledQuery,
    ) -> Vec<ScoredMatch> {
        let present: Vec<(&Case, f64)> = raw
            .hits
            .iter()
            .filter_map(|h| cases.get(&h.case_id).map(|c| (c, h.raw_score)))
            .collect();
        if present.len() < raw.hits.len() {
            tracing::debug!(
                missing = raw.hits.len() - present.len(),
                "hits without a stored case were skipped"
            );
        }

        let raw_scores: Vec<f64> = present.iter().map(|(_, s)| *s).collect();
        let bases: Vec<f64> = match compiled.mode() {
            QueryMode::FullText => normalize_scores(&raw_scores)
                .into_iter()
                .map(|n| 0.1 + 0.9 * n)
                .collect(),
            _ => vec![1.0; present.len()],
        };

        let reference_year = self
            .config
            .reference_year
            .or_else(|| present.iter().filter_map(|(c, _)| c.year).max());
        let terms = compiled.highlight_terms();
        let phrases: Vec<&str> = compiled.phrases().collect();

        let mut scored: Vec<ScoredMatch> = present
            .iter()
            .zip(bases)
            .map(|((case, raw_score), base)| {
                let matched_fields = Self::matched_fields(case, &terms);
                let field = matched_fields
                    .iter()
                    .map(|f| self.field_weight(*f))
                    .fold(self.config.field_weights.content, f64::max);
                let phrase = if phrases
                    .iter()
                    .any(|p| contains_folded(&case.content_clean, p))
                {
                    1.0 + self.config.phrase_bonus
                } else {
                    1.0
                };
                let recency =
                    1.0 + self.config.recency_weight * self.age_factor(case.year, reference_year);
                let authority =
                    1.0 + self.config.authority_weight * case.court_level.authority_factor();

                ScoredMatch {
                    case: case.summary(self.leitsatz_max_chars),
                    raw_score: *raw_score,
                    score: base * field * phrase * recency * authority,
                    matched_fields,
                    snippet: build_snippet(&case.content_clean, &terms, self.config.snippet_chars),
                }
            })
            .collect();

        scored.sort_by(compare_matches);
        scored
    }
}

fn compare_matches(a: &ScoredMatch, b: &ScoredMatch) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.case.decision_date.is_some().cmp(&a.case.decision_date.is_some()))
        .then_with(|| b.case.decision_date.cmp(&a.case.decision_date))
        .then_with(|| a.case.id.cmp(&b.case.id))
}
