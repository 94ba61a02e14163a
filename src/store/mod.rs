//! Storage abstraction for the case corpus.
//!
//! The [`Store`] trait is everything the compiler, ranker, similarity
//! matcher and orchestrator need from persistence. [`SqliteStore`]
//! (`crate::sqlite_store`) is the production backend; [`memory::InMemoryStore`]
//! implements the same contract without a database for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! [`SqliteStore`]: crate::sqlite_store::SqliteStore

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::compiler::CompiledQuery;
use crate::models::{Case, CorpusStats, CourtTier, NewCase, OptimizeReport, Pagination, QueryFilters};

/// One engine hit, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub case_id: i64,
    /// Engine relevance; higher is better. Zero for filter-only browses.
    pub raw_score: f64,
}

/// The requested page of engine hits plus the total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMatches {
    pub hits: Vec<RawMatch>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    FileNumber,
    Court,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub value: String,
}

/// Shortest input [`Store::suggest`] answers.
pub const MIN_SUGGEST_CHARS: usize = 2;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`execute`](Store::execute) | Run a compiled query, one page of hits plus total |
/// | [`get_by_ids`](Store::get_by_ids) | Batch case lookup |
/// | [`get_by_slug`](Store::get_by_slug) | Case lookup by slug |
/// | [`resolve_citations`](Store::resolve_citations) | Citation strings to corpus ids |
/// | [`citing_cases`](Store::citing_cases) | Cases whose citation list names any identifier |
/// | [`suggest`](Store::suggest) | File-number and court completions |
/// | [`statistics`](Store::statistics) | Corpus aggregates |
/// | [`upsert_case`](Store::upsert_case) | Insert or replace a case by slug |
/// | [`optimize`](Store::optimize) | Index and file maintenance |
#[async_trait]
pub trait Store: Send + Sync {
    /// Run `query`, returning the hits of the requested page in engine
    /// order and the total number of matching cases. A match-nothing query
    /// returns no hits and a zero total.
    async fn execute(&self, query: &CompiledQuery, page: Pagination) -> Result<RawMatches>;

    /// Fetch cases by id. Unknown ids are absent from the map.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Case>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Case>>;

    /// Map each citation (normalized with
    /// [`normalize_citation`](crate::models::normalize_citation)) that names
    /// a corpus case by ECLI, slug, file number or id to that case's id.
    /// When several cases share a file number the lowest id wins.
    async fn resolve_citations(&self, citations: &[String]) -> Result<HashMap<String, i64>>;

    /// Ids of cases whose citation list contains any of `identifiers`
    /// (normalized), ascending, at most `limit`.
    async fn citing_cases(&self, identifiers: &[String], limit: usize) -> Result<Vec<i64>>;

    /// File numbers and court names containing `partial`, case-insensitive.
    /// Inputs shorter than [`MIN_SUGGEST_CHARS`] yield nothing.
    async fn suggest(&self, partial: &str, limit: usize) -> Result<Vec<Suggestion>>;

    async fn statistics(&self) -> Result<CorpusStats>;

    /// Insert a case, or replace the case with the same slug. Returns its id.
    async fn upsert_case(&self, case: &NewCase) -> Result<i64>;

    async fn optimize(&self) -> Result<OptimizeReport>;
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

fn equals_ci(value: Option<&str>, expected: &str) -> bool {
    value
        .map(|v| v.trim().to_lowercase() == expected.trim().to_lowercase())
        .unwrap_or(false)
}

/// Whether `case` satisfies every present filter. Substring filters (legal
/// area, court, file number) are case-insensitive contains; decision type,
/// ECLI and court level compare case-insensitively for equality. Year
/// bounds are inclusive and exclude cases without a year.
pub fn matches_filters(case: &Case, f: &QueryFilters) -> bool {
    if let Some(area) = &f.legal_area {
        if !contains_ci(case.legal_area.as_deref(), area) {
            return false;
        }
    }
    if let Some(court) = &f.court {
        if !contains_ci(Some(&case.court_name), court)
            && !contains_ci(case.jurisdiction.as_deref(), court)
        {
            return false;
        }
    }
    if let Some(from) = f.year_from {
        if case.year.map_or(true, |y| y < from) {
            return false;
        }
    }
    if let Some(to) = f.year_to {
        if case.year.map_or(true, |y| y > to) {
            return false;
        }
    }
    if let Some(t) = &f.decision_type {
        if !equals_ci(case.decision_type.as_deref(), t) {
            return false;
        }
    }
    if let Some(n) = &f.file_number {
        if !contains_ci(case.file_number.as_deref(), n) {
            return false;
        }
    }
    if let Some(e) = &f.ecli {
        if !equals_ci(case.ecli.as_deref(), e) {
            return false;
        }
    }
    if let Some(level) = &f.court_level {
        if CourtTier::parse(level) != Some(case.court_level) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaseRow;

    fn case() -> Case {
        Case::from_row(
            CaseRow {
                id: 1,
                slug: "bag-2023-1".into(),
                court_name: "Bundesarbeitsgericht".into(),
                court_slug: None,
                court_level: None,
                jurisdiction: Some("Arbeitsgerichtsbarkeit".into()),
                legal_area: Some("Arbeitsrecht".into()),
                decision_type: Some("Urteil".into()),
                file_number: Some("5 AZR 12/22".into()),
                ecli: Some("ECLI:DE:BAG:2023:1".into()),
                decision_date: Some("2023-05-10".into()),
                year: None,
                content_raw: "x".into(),
                content_clean: "x".into(),
                created_at: 0,
                updated_at: 0,
            },
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn filters_are_conjunctive() {
        let c = case();
        let mut f = QueryFilters {
            legal_area: Some("arbeits".into()),
            court: Some("arbeitsgerichtsbarkeit".into()),
            year_from: Some(2023),
            year_to: Some(2023),
            decision_type: Some("URTEIL".into()),
            file_number: Some("azr 12".into()),
            ecli: Some("ecli:de:bag:2023:1".into()),
            court_level: Some("federal".into()),
        };
        assert!(matches_filters(&c, &f));

        f.year_to = Some(2022);
        assert!(!matches_filters(&c, &f));
    }

    #[test]
    fn missing_values_never_match_present_filters() {
        let mut c = case();
        c.year = None;
        c.legal_area = None;
        let f = QueryFilters {
            year_from: Some(1900),
            ..QueryFilters::default()
        };
        assert!(!matches_filters(&c, &f));
        let f = QueryFilters {
            legal_area: Some("recht".into()),
            ..QueryFilters::default()
        };
        assert!(!matches_filters(&c, &f));
        assert!(matches_filters(&c, &QueryFilters::default()));
    }
}
