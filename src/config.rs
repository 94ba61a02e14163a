//! TOML configuration parsing and validation.
//!
//! Every section is optional and falls back to the defaults below, so a
//! minimal configuration only needs `[db] path`. The loaded [`Config`] is
//! built once at startup and passed by reference into the store, the caches
//! and the orchestrator.
//!
//! ```toml
//! [db]
//! path = "./data/german_legal.sqlite"
//!
//! [search]
//! max_page_size = 100
//! max_concurrent_searches = 10
//!
//! [cache]
//! capacity = 50
//! ttl_secs = 3600
//!
//! [ranking.field_weights]
//! file_number = 2.0
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/german_legal.sqlite")
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Number of engine candidates ranked per query. Pages are sliced from
    /// this ranked window.
    #[serde(default = "default_candidate_window")]
    pub candidate_window: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_searches: usize,
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    #[serde(default = "default_leitsatz_max_chars")]
    pub leitsatz_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            default_page_size: default_page_size(),
            candidate_window: default_candidate_window(),
            max_concurrent_searches: default_max_concurrent(),
            time_budget_ms: default_time_budget_ms(),
            leitsatz_max_chars: default_leitsatz_max_chars(),
        }
    }
}

impl SearchConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

fn default_max_page_size() -> usize {
    100
}
fn default_page_size() -> usize {
    20
}
fn default_candidate_window() -> usize {
    500
}
fn default_max_concurrent() -> usize {
    10
}
fn default_time_budget_ms() -> u64 {
    5_000
}
fn default_leitsatz_max_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_related_capacity")]
    pub related_capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub related_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
            related_capacity: default_related_capacity(),
            related_ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> usize {
    50
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_related_capacity() -> usize {
    16
}

/// Relevance boost weights. These shape result ordering only; none of them
/// is required for correctness.
#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_phrase_bonus")]
    pub phrase_bonus: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_recency_horizon")]
    pub recency_horizon_years: u32,
    /// Year that counts as "most recent". Defaults to the newest decision
    /// among the ranked candidates.
    #[serde(default)]
    pub reference_year: Option<i32>,
    #[serde(default = "default_authority_weight")]
    pub authority_weight: f64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default)]
    pub field_weights: FieldWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            phrase_bonus: default_phrase_bonus(),
            recency_weight: default_recency_weight(),
            recency_horizon_years: default_recency_horizon(),
            reference_year: None,
            authority_weight: default_authority_weight(),
            snippet_chars: default_snippet_chars(),
            field_weights: FieldWeights::default(),
        }
    }
}

fn default_phrase_bonus() -> f64 {
    0.5
}
fn default_recency_weight() -> f64 {
    0.1
}
fn default_recency_horizon() -> u32 {
    30
}
fn default_authority_weight() -> f64 {
    0.1
}
fn default_snippet_chars() -> usize {
    240
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldWeights {
    #[serde(default = "one")]
    pub content: f64,
    #[serde(default = "default_court_weight")]
    pub court: f64,
    #[serde(default = "default_citation_field_weight")]
    pub file_number: f64,
    #[serde(default = "default_citation_field_weight")]
    pub ecli: f64,
    #[serde(default = "default_legal_area_weight")]
    pub legal_area: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            content: one(),
            court: default_court_weight(),
            file_number: default_citation_field_weight(),
            ecli: default_citation_field_weight(),
            legal_area: default_legal_area_weight(),
        }
    }
}

fn one() -> f64 {
    1.0
}
fn default_court_weight() -> f64 {
    1.5
}
fn default_citation_field_weight() -> f64 {
    2.0
}
fn default_legal_area_weight() -> f64 {
    1.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    #[serde(default = "default_citation_weight")]
    pub citation_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
    #[serde(default = "default_direct_floor")]
    pub direct_citation_floor: f64,
    #[serde(default = "default_sketch_size")]
    pub sketch_size: usize,
    #[serde(default = "default_min_sketch_terms")]
    pub min_sketch_terms: usize,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_related_limit")]
    pub default_limit: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            citation_weight: default_citation_weight(),
            lexical_weight: default_lexical_weight(),
            min_strength: default_min_strength(),
            direct_citation_floor: default_direct_floor(),
            sketch_size: default_sketch_size(),
            min_sketch_terms: default_min_sketch_terms(),
            candidate_limit: default_candidate_limit(),
            default_limit: default_related_limit(),
        }
    }
}

fn default_citation_weight() -> f64 {
    0.6
}
fn default_lexical_weight() -> f64 {
    0.4
}
fn default_min_strength() -> f64 {
    0.05
}
fn default_direct_floor() -> f64 {
    0.5
}
fn default_sketch_size() -> usize {
    64
}
fn default_min_sketch_terms() -> usize {
    3
}
fn default_candidate_limit() -> usize {
    200
}
fn default_related_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Default configuration pointing at the given database file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: path.into(),
                ..DbConfig::default()
            },
            ..Config::default()
        }
    }

    /// Check cross-field constraints. Called by [`load_config`]; programmatic
    /// callers that build a `Config` by hand should call it too.
    pub fn validate(&self) -> Result<()> {
        if self.db.max_connections == 0 {
            anyhow::bail!("db.max_connections must be >= 1");
        }

        if self.search.max_page_size == 0 {
            anyhow::bail!("search.max_page_size must be >= 1");
        }
        if self.search.default_page_size == 0
            || self.search.default_page_size > self.search.max_page_size
        {
            anyhow::bail!("search.default_page_size must be in [1, search.max_page_size]");
        }
        if self.search.candidate_window < self.search.max_page_size {
            anyhow::bail!("search.candidate_window must be >= search.max_page_size");
        }
        if self.search.max_concurrent_searches == 0 {
            anyhow::bail!("search.max_concurrent_searches must be >= 1");
        }
        if self.search.time_budget_ms == 0 {
            anyhow::bail!("search.time_budget_ms must be > 0");
        }

        if self.cache.capacity == 0 || self.cache.related_capacity == 0 {
            anyhow::bail!("cache.capacity and cache.related_capacity must be >= 1");
        }
        if self.cache.ttl_secs == 0 || self.cache.related_ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs and cache.related_ttl_secs must be > 0");
        }

        let r = &self.ranking;
        if r.phrase_bonus < 0.0 {
            anyhow::bail!("ranking.phrase_bonus must be >= 0.0");
        }
        if !(0.0..=0.5).contains(&r.recency_weight) {
            anyhow::bail!("ranking.recency_weight must be in [0.0, 0.5]");
        }
        if !(0.0..=0.5).contains(&r.authority_weight) {
            anyhow::bail!("ranking.authority_weight must be in [0.0, 0.5]");
        }
        if r.recency_horizon_years == 0 {
            anyhow::bail!("ranking.recency_horizon_years must be >= 1");
        }
        if r.snippet_chars < 16 {
            anyhow::bail!("ranking.snippet_chars must be >= 16");
        }
        let fw = &r.field_weights;
        for (name, w) in [
            ("content", fw.content),
            ("court", fw.court),
            ("file_number", fw.file_number),
            ("ecli", fw.ecli),
            ("legal_area", fw.legal_area),
        ] {
            if w < 1.0 {
                anyhow::bail!("ranking.field_weights.{} must be >= 1.0", name);
            }
        }

        let s = &self.similarity;
        if s.citation_weight < 0.0 || s.lexical_weight < 0.0 {
            anyhow::bail!("similarity weights must be >= 0.0");
        }
        if s.citation_weight + s.lexical_weight <= 0.0 {
            anyhow::bail!("similarity.citation_weight + similarity.lexical_weight must be > 0.0");
        }
        if !(0.0..=1.0).contains(&s.min_strength) {
            anyhow::bail!("similarity.min_strength must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&s.direct_citation_floor) {
            anyhow::bail!("similarity.direct_citation_floor must be in [0.0, 1.0]");
        }
        if s.sketch_size == 0 || s.candidate_limit == 0 || s.default_limit == 0 {
            anyhow::bail!(
                "similarity.sketch_size, candidate_limit and default_limit must be >= 1"
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
