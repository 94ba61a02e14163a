//! Core data models for the case-law search pipeline.
//!
//! [`Case`] is the stored court decision, [`Query`] the request the
//! orchestrator receives, and [`ResultSet`] / [`SimilarityLink`] what flows
//! back to the caller. Cases are only ever built through the checked
//! constructors here ([`Case::from_row`], [`PreparedCase::into_case`]);
//! rows with missing required fields are rejected rather than defaulted.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{SearchError, SearchResult};
use crate::text;

/// Public full-text location for a case slug.
pub const CASE_URL_BASE: &str = "https://de.openlegaldata.io/case";

/// Position of a court in the German court hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourtTier {
    Federal,
    Appellate,
    Regional,
    Local,
    Unknown,
}

impl CourtTier {
    /// Classify a court by its German name or common abbreviation.
    pub fn from_court_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        let first = lower.split_whitespace().next().unwrap_or("");

        const FEDERAL: &[&str] = &["bgh", "bag", "bverwg", "bsg", "bfh", "bverfg", "bpatg"];
        const APPELLATE: &[&str] = &["olg", "lag", "ovg", "vgh", "lsg", "fg", "kg"];
        const REGIONAL: &[&str] = &["lg", "vg", "sg", "arbg"];
        const LOCAL: &[&str] = &["ag"];

        if lower.starts_with("bundes") || FEDERAL.contains(&first) {
            CourtTier::Federal
        } else if lower.contains("oberlandesgericht")
            || lower.contains("landesarbeitsgericht")
            || lower.contains("oberverwaltungsgericht")
            || lower.contains("verwaltungsgerichtshof")
            || lower.contains("landessozialgericht")
            || lower.contains("finanzgericht")
            || lower.contains("kammergericht")
            || APPELLATE.contains(&first)
        {
            CourtTier::Appellate
        } else if lower.contains("landgericht")
            || lower.contains("verwaltungsgericht")
            || lower.contains("sozialgericht")
            || lower.contains("arbeitsgericht")
            || REGIONAL.contains(&first)
        {
            CourtTier::Regional
        } else if lower.contains("amtsgericht") || LOCAL.contains(&first) {
            CourtTier::Local
        } else {
            CourtTier::Unknown
        }
    }

    /// Parse a stored or user-supplied tier name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "federal" => Some(CourtTier::Federal),
            "appellate" => Some(CourtTier::Appellate),
            "regional" => Some(CourtTier::Regional),
            "local" => Some(CourtTier::Local),
            "unknown" => Some(CourtTier::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CourtTier::Federal => "federal",
            CourtTier::Appellate => "appellate",
            CourtTier::Regional => "regional",
            CourtTier::Local => "local",
            CourtTier::Unknown => "unknown",
        }
    }

    /// Weight in [0, 1] used by the authority boost.
    pub fn authority_factor(&self) -> f64 {
        match self {
            CourtTier::Federal => 1.0,
            CourtTier::Appellate => 0.66,
            CourtTier::Regional => 0.33,
            CourtTier::Local | CourtTier::Unknown => 0.0,
        }
    }
}

impl fmt::Display for CourtTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A court decision as stored in the corpus.
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub id: i64,
    pub slug: String,
    pub court_name: String,
    pub court_slug: Option<String>,
    pub court_level: CourtTier,
    pub jurisdiction: Option<String>,
    pub legal_area: Option<String>,
    pub decision_type: Option<String>,
    pub file_number: Option<String>,
    pub ecli: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub year: Option<i32>,
    #[serde(skip)]
    pub content_raw: String,
    pub content_clean: String,
    pub content_length: usize,
    pub citations: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Column values of one `cases` row, before validation.
#[derive(Debug, Clone)]
pub struct CaseRow {
    pub id: i64,
    pub slug: String,
    pub court_name: String,
    pub court_slug: Option<String>,
    pub court_level: Option<String>,
    pub jurisdiction: Option<String>,
    pub legal_area: Option<String>,
    pub decision_type: Option<String>,
    pub file_number: Option<String>,
    pub ecli: Option<String>,
    pub decision_date: Option<String>,
    pub year: Option<i64>,
    pub content_raw: String,
    pub content_clean: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Case {
    /// Build a case from a stored row, failing on missing required fields or
    /// on values that break the model invariants.
    pub fn from_row(row: CaseRow, citations: Vec<String>) -> Result<Case> {
        if row.id <= 0 {
            bail!("case row has invalid id {}", row.id);
        }
        if row.slug.trim().is_empty() {
            bail!("case {} has an empty slug", row.id);
        }
        if row.court_name.trim().is_empty() {
            bail!("case {} has an empty court name", row.id);
        }
        if row.content_clean.chars().count() > row.content_raw.chars().count() {
            bail!("case {}: cleaned text is longer than raw text", row.id);
        }

        let decision_date = row
            .decision_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .with_context(|| format!("case {} has a malformed decision_date", row.id))?;
        let year = match decision_date {
            Some(d) => Some(d.year()),
            None => row.year.map(|y| y as i32),
        };
        let court_level = row
            .court_level
            .as_deref()
            .and_then(CourtTier::parse)
            .unwrap_or_else(|| CourtTier::from_court_name(&row.court_name));

        Ok(Case {
            id: row.id,
            slug: row.slug,
            court_name: row.court_name,
            court_slug: row.court_slug,
            court_level,
            jurisdiction: row.jurisdiction,
            legal_area: row.legal_area,
            decision_type: row.decision_type,
            file_number: row.file_number,
            ecli: row.ecli,
            decision_date,
            year,
            content_length: row.content_clean.chars().count(),
            content_raw: row.content_raw,
            content_clean: row.content_clean,
            citations,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub fn url(&self) -> String {
        format!("{}/{}/", CASE_URL_BASE, self.slug)
    }

    /// Headnote of the decision, or the first sentence when none is marked.
    pub fn leitsatz(&self, max_chars: usize) -> Option<String> {
        let source = if self.content_raw.is_empty() {
            &self.content_clean
        } else {
            &self.content_raw
        };
        text::extract_leitsatz(source, max_chars)
    }

    /// Strings other cases may use to cite this one.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids = vec![normalize_citation(&self.slug), self.id.to_string()];
        if let Some(ecli) = &self.ecli {
            ids.push(normalize_citation(ecli));
        }
        if let Some(fnr) = &self.file_number {
            ids.push(normalize_citation(fnr));
        }
        ids.retain(|s| !s.is_empty());
        ids
    }

    pub fn summary(&self, leitsatz_max_chars: usize) -> CaseSummary {
        CaseSummary {
            id: self.id,
            slug: self.slug.clone(),
            court_name: self.court_name.clone(),
            court_level: self.court_level,
            legal_area: self.legal_area.clone(),
            decision_type: self.decision_type.clone(),
            file_number: self.file_number.clone(),
            ecli: self.ecli.clone(),
            decision_date: self.decision_date,
            year: self.year,
            leitsatz: self.leitsatz(leitsatz_max_chars),
            url: self.url(),
        }
    }
}

/// Canonical form of a citation string used for matching: trimmed,
/// lower-cased, whitespace collapsed.
pub fn normalize_citation(s: &str) -> String {
    text::normalize_whitespace(s).to_lowercase()
}

/// Display-oriented view of a case carried in results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSummary {
    pub id: i64,
    pub slug: String,
    pub court_name: String,
    pub court_level: CourtTier,
    pub legal_area: Option<String>,
    pub decision_type: Option<String>,
    pub file_number: Option<String>,
    pub ecli: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub leitsatz: Option<String>,
    pub url: String,
}

/// One case record for import, as read from a JSON line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCase {
    #[serde(default)]
    pub id: Option<i64>,
    pub slug: String,
    pub court_name: String,
    #[serde(default)]
    pub court_slug: Option<String>,
    #[serde(default)]
    pub court_level: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub legal_area: Option<String>,
    #[serde(default)]
    pub decision_type: Option<String>,
    #[serde(default)]
    pub file_number: Option<String>,
    #[serde(default)]
    pub ecli: Option<String>,
    /// `YYYY-MM-DD`, `D.M.YYYY` or a bare year.
    #[serde(default)]
    pub date: Option<String>,
    /// Raw decision text, usually HTML.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_clean: Option<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A validated [`NewCase`] ready to be written by a store.
#[derive(Debug, Clone)]
pub struct PreparedCase {
    pub id: Option<i64>,
    pub slug: String,
    pub court_name: String,
    pub court_slug: Option<String>,
    pub court_level: CourtTier,
    pub jurisdiction: Option<String>,
    pub legal_area: Option<String>,
    pub decision_type: Option<String>,
    pub file_number: Option<String>,
    pub ecli: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub content_raw: String,
    pub content_clean: String,
    pub citations: Vec<String>,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl NewCase {
    pub fn prepare(&self) -> Result<PreparedCase> {
        let slug = self.slug.trim();
        if slug.is_empty() {
            bail!("case record is missing a slug");
        }
        let court_name = self.court_name.trim();
        if court_name.is_empty() {
            bail!("case {} is missing a court name", slug);
        }
        if let Some(id) = self.id {
            if id <= 0 {
                bail!("case {} has invalid id {}", slug, id);
            }
        }

        let raw = self.content.clone().unwrap_or_default();
        let clean = match non_empty(&self.content_clean) {
            Some(c) => c,
            None => text::clean_html(&raw),
        };
        let raw = if raw.trim().is_empty() { clean.clone() } else { raw };
        if clean.chars().count() > raw.chars().count() {
            bail!("case {}: cleaned text is longer than raw text", slug);
        }

        let dates = self
            .date
            .as_deref()
            .map(text::parse_decision_date)
            .unwrap_or_default();

        let court_level = self
            .court_level
            .as_deref()
            .and_then(CourtTier::parse)
            .unwrap_or_else(|| CourtTier::from_court_name(court_name));

        let citations = self
            .citations
            .iter()
            .map(|c| text::normalize_whitespace(c))
            .filter(|c| !c.is_empty())
            .collect();

        Ok(PreparedCase {
            id: self.id,
            slug: slug.to_string(),
            court_name: court_name.to_string(),
            court_slug: non_empty(&self.court_slug),
            court_level,
            jurisdiction: non_empty(&self.jurisdiction),
            legal_area: non_empty(&self.legal_area),
            decision_type: non_empty(&self.decision_type),
            file_number: non_empty(&self.file_number).map(|s| text::normalize_whitespace(&s)),
            ecli: non_empty(&self.ecli).map(|s| text::normalize_whitespace(&s)),
            decision_date: dates.date,
            year: dates.year,
            content_raw: raw,
            content_clean: clean,
            citations,
        })
    }
}

impl PreparedCase {
    pub fn into_case(self, id: i64, created_at: i64, updated_at: i64) -> Case {
        Case {
            id,
            content_length: self.content_clean.chars().count(),
            slug: self.slug,
            court_name: self.court_name,
            court_slug: self.court_slug,
            court_level: self.court_level,
            jurisdiction: self.jurisdiction,
            legal_area: self.legal_area,
            decision_type: self.decision_type,
            file_number: self.file_number,
            ecli: self.ecli,
            decision_date: self.decision_date,
            year: self.year,
            content_raw: self.content_raw,
            content_clean: self.content_clean,
            citations: self.citations,
            created_at,
            updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Filter keys accepted by [`QueryFilters::from_pairs`].
pub const FILTER_KEYS: &[&str] = &[
    "court",
    "court_level",
    "decision_type",
    "ecli",
    "file_number",
    "legal_area",
    "year_from",
    "year_to",
];

/// Structured filters. Every present filter must hold for a case to match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryFilters {
    pub legal_area: Option<String>,
    /// Matches the court name or its jurisdiction.
    pub court: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub decision_type: Option<String>,
    pub file_number: Option<String>,
    pub ecli: Option<String>,
    pub court_level: Option<String>,
}

fn parse_year(field: &'static str, value: &str) -> SearchResult<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| SearchError::invalid(field, format!("`{}` is not a year", value.trim())))
}

impl QueryFilters {
    /// Build filters from loosely typed key/value pairs, as they arrive from
    /// a CLI or tool layer. Unknown keys and unparsable years are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> SearchResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut f = QueryFilters::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            let text = (!value.is_empty()).then(|| value.to_string());
            match key.as_ref().trim() {
                "legal_area" => f.legal_area = text,
                "court" => f.court = text,
                "decision_type" => f.decision_type = text,
                "file_number" => f.file_number = text,
                "ecli" => f.ecli = text,
                "court_level" => f.court_level = text,
                "year_from" if !value.is_empty() => f.year_from = Some(parse_year("year_from", value)?),
                "year_to" if !value.is_empty() => f.year_to = Some(parse_year("year_to", value)?),
                "year_from" | "year_to" => {}
                other => {
                    return Err(SearchError::invalid(
                        "filters",
                        format!("unknown filter `{}` (expected one of {})", other, FILTER_KEYS.join(", ")),
                    ))
                }
            }
        }
        Ok(f)
    }

    pub fn validate(&self) -> SearchResult<()> {
        let range = text::MIN_YEAR..=text::MAX_YEAR;
        for (field, year) in [("year_from", self.year_from), ("year_to", self.year_to)] {
            if let Some(y) = year {
                if !range.contains(&y) {
                    return Err(SearchError::invalid(
                        field,
                        format!("{} is outside {}..={}", y, text::MIN_YEAR, text::MAX_YEAR),
                    ));
                }
            }
        }
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(SearchError::invalid(
                    "year_from",
                    format!("{} is after year_to {}", from, to),
                ));
            }
        }
        if let Some(level) = &self.court_level {
            if CourtTier::parse(level).is_none() {
                return Err(SearchError::invalid(
                    "court_level",
                    format!("`{}` is not one of federal, appellate, regional, local, unknown", level),
                ));
            }
        }
        Ok(())
    }

    /// Present filters as `(key, normalized value)`, sorted by key. Empty
    /// strings count as absent.
    pub fn canonical_pairs(&self) -> Vec<(&'static str, String)> {
        let norm = |v: &Option<String>| {
            v.as_deref()
                .map(|s| text::normalize_whitespace(s).to_lowercase())
                .filter(|s| !s.is_empty())
        };
        let mut pairs: Vec<(&'static str, String)> = [
            ("legal_area", norm(&self.legal_area)),
            ("court", norm(&self.court)),
            ("year_from", self.year_from.map(|y| y.to_string())),
            ("year_to", self.year_to.map(|y| y.to_string())),
            ("decision_type", norm(&self.decision_type)),
            ("file_number", norm(&self.file_number)),
            ("ecli", norm(&self.ecli)),
            ("court_level", norm(&self.court_level)),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_pairs().is_empty()
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Query {
    pub text: String,
    pub filters: QueryFilters,
    pub pagination: Pagination,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.pagination = Pagination::new(page, page_size);
        self
    }

    /// Lower-cased, whitespace-collapsed query text.
    pub fn normalized_text(&self) -> String {
        text::normalize_whitespace(&self.text).to_lowercase()
    }

    /// Cache key: SHA-256 over the normalized text and the sorted filter
    /// set, each part length-prefixed. Pagination is not part of the key; all pages of a query share
    /// one cached ranking.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_part(&mut hasher, self.normalized_text().as_bytes());
        let pairs = self.filters.canonical_pairs();
        hasher.update((pairs.len() as u64).to_le_bytes());
        for (key, value) in pairs {
            hash_part(&mut hasher, key.as_bytes());
            hash_part(&mut hasher, value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn hash_part(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Searchable field that contributed to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Content,
    Court,
    FileNumber,
    Ecli,
    LegalArea,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    pub case: CaseSummary,
    /// Engine score (negated BM25; higher is better).
    pub raw_score: f64,
    pub score: f64,
    pub matched_fields: Vec<MatchedField>,
    pub snippet: String,
}

/// The ranked candidate window for a query, as cached.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResults {
    pub matches: Vec<ScoredMatch>,
    /// Engine match count, which may exceed `window`.
    pub total: usize,
    /// Number of engine hits requested when ranking.
    pub window: usize,
}

impl RankedResults {
    /// Whether `pagination` can be sliced from this window. A page past
    /// the window needs a deeper ranking unless the window already holds
    /// every hit or the page starts past the last match.
    pub fn covers(&self, pagination: Pagination) -> bool {
        let end = pagination.offset().saturating_add(pagination.page_size);
        end <= self.window || self.total <= self.window || pagination.offset() >= self.total
    }

    pub fn page(&self, pagination: Pagination) -> Vec<ScoredMatch> {
        self.matches
            .iter()
            .skip(pagination.offset())
            .take(pagination.page_size)
            .cloned()
            .collect()
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub matches: Vec<ScoredMatch>,
    /// Total number of matching cases in the corpus.
    pub total: usize,
    pub query: Query,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityBasis {
    pub shared_citations: usize,
    pub direct_citation: bool,
    pub citation_score: f64,
    pub lexical_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityLink {
    pub source_id: i64,
    pub target_id: i64,
    pub strength: f64,
    pub basis: SimilarityBasis,
    pub target: CaseSummary,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentStats {
    pub avg_length: f64,
    pub min_length: i64,
    pub max_length: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQuality {
    pub with_ecli: i64,
    pub with_date: i64,
    pub with_file_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_cases: i64,
    pub total_citations: i64,
    pub legal_areas: Vec<NamedCount>,
    pub courts: Vec<NamedCount>,
    pub years: Vec<YearCount>,
    pub content: ContentStats,
    pub quality: DataQuality,
}

impl CorpusStats {
    /// Share of cases with the given count, in percent.
    pub fn coverage(&self, count: i64) -> f64 {
        if self.total_cases == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total_cases as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub analyzed: bool,
    pub fts_optimized: bool,
    pub vacuumed: bool,
    pub freelist_ratio: f64,
}
