//! Request coordination: the entry point for every caller.
//!
//! ```text
//! search(q) ─▶ validate ─▶ fingerprint ─▶ query cache ──hit──▶ slice page
//!                                            │ miss
//!                                            ▼
//!                     permit ─▶ compile ─▶ store.execute(window)
//!                        ─▶ store.get_by_ids ─▶ rank ─▶ cache put ─▶ slice page
//! ```
//!
//! The miss path runs under a FIFO semaphore permit and the configured time
//! budget. It ranks `candidate_window` hits, or enough to reach the
//! requested page when that lies deeper; the deeper window then replaces
//! the cached one. A computation that exceeds the budget is dropped and nothing is
//! cached for it. The related-cases path bypasses the query cache and uses
//! its own cache keyed by case id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::cache::{AdaptiveCache, CacheStats};
use crate::compiler;
use crate::config::Config;
use crate::error::{SearchError, SearchResult};
use crate::models::{
    Case, CorpusStats, NewCase, OptimizeReport, Pagination, Query, RankedResults, ResultSet,
    SimilarityLink,
};
use crate::ranker::Ranker;
use crate::similarity::SimilarityMatcher;
use crate::store::{Store, Suggestion};

const STATS_KEY: &str = "corpus";
const STATS_TTL: Duration = Duration::from_secs(300);

pub struct SearchOrchestrator<S: Store> {
    store: Arc<S>,
    config: Config,
    ranker: Ranker,
    matcher: SimilarityMatcher,
    permits: Semaphore,
    query_cache: AdaptiveCache<String, RankedResults>,
    related_cache: AdaptiveCache<i64, Vec<SimilarityLink>>,
    stats_cache: AdaptiveCache<&'static str, CorpusStats>,
}

fn storage<T>(r: anyhow::Result<T>) -> SearchResult<T> {
    r.map_err(SearchError::StorageUnavailable)
}

impl<S: Store> SearchOrchestrator<S> {
    pub fn new(store: Arc<S>, config: Config) -> Self {
        let ranker = Ranker::new(config.ranking.clone(), config.search.leitsatz_max_chars);
        let matcher =
            SimilarityMatcher::new(config.similarity.clone(), config.search.leitsatz_max_chars);
        let permits = Semaphore::new(config.search.max_concurrent_searches.max(1));
        let query_cache = AdaptiveCache::new(
            "query",
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        );
        let related_cache = AdaptiveCache::new(
            "related",
            config.cache.related_capacity,
            Duration::from_secs(config.cache.related_ttl_secs),
        );
        let stats_cache = AdaptiveCache::new("stats", 1, STATS_TTL);

        Self {
            store,
            config,
            ranker,
            matcher,
            permits,
            query_cache,
            related_cache,
            stats_cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Check pagination and filters; clamp the page size to the configured
    /// maximum.
    fn validate(&self, mut query: Query) -> SearchResult<Query> {
        if query.pagination.page == 0 {
            return Err(SearchError::invalid("page", "must be >= 1"));
        }
        if query.pagination.page_size == 0 {
            return Err(SearchError::invalid("page_size", "must be >= 1"));
        }
        query.pagination.page_size = query.pagination.page_size.min(self.config.search.max_page_size);
        query.filters.validate()?;
        Ok(query)
    }

    async fn run_with_budget<T, F>(&self, what: &'static str, fut: F) -> SearchResult<T>
    where
        F: std::future::Future<Output = SearchResult<T>>,
    {
        let budget = self.config.search.time_budget();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SearchError::StorageUnavailable(anyhow::Error::new(e)))?;
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation = what, budget_ms = budget.as_millis() as u64, "time budget exceeded");
                Err(SearchError::Timeout(budget))
            }
        }
    }

    async fn compute(&self, query: &Query, window: usize) -> SearchResult<RankedResults> {
        let compiled = compiler::compile(query);
        let raw = storage(self.store.execute(&compiled, Pagination::new(1, window)).await)?;
        let ids: Vec<i64> = raw.hits.iter().map(|h| h.case_id).collect();
        let cases = storage(self.store.get_by_ids(&ids).await)?;
        let matches = self.ranker.rank(&raw, &cases, &compiled);
        Ok(RankedResults {
            matches,
            total: raw.total,
            window,
        })
    }

    /// Run a search. Repeated queries (same normalized text and filters,
    /// any page) are answered from the query cache.
    pub async fn search(&self, query: Query) -> SearchResult<ResultSet> {
        let started = Instant::now();
        let query = self.validate(query)?;
        let key = query.fingerprint();

        let (ranked, from_cache) = match self.query_cache.get(&key) {
            Some(hit) if hit.covers(query.pagination) => (hit, true),
            _ => {
                let end = query.pagination.offset().saturating_add(query.pagination.page_size);
                let window = end.max(self.config.search.candidate_window).max(1);
                let ranked = self.run_with_budget("search", self.compute(&query, window)).await?;
                (self.query_cache.put(key, ranked), false)
            }
        };

        let matches = ranked.page(query.pagination);
        let elapsed = started.elapsed();
        tracing::info!(
            query = %query.normalized_text(),
            total = ranked.total,
            returned = matches.len(),
            page = query.pagination.page,
            from_cache,
            elapsed_ms = elapsed.as_millis() as u64,
            "search"
        );

        Ok(ResultSet {
            matches,
            total: ranked.total,
            query,
            elapsed,
            from_cache,
        })
    }

    /// Cases related to `case_id`, strongest first. The related cache
    /// keeps the full candidate ranking per case; `limit` slices it.
    pub async fn related(&self, case_id: i64, limit: usize) -> SearchResult<Vec<SimilarityLink>> {
        if limit == 0 {
            return Err(SearchError::invalid("limit", "must be >= 1"));
        }
        let limit = limit.min(self.config.similarity.candidate_limit.max(1));

        let links = match self.related_cache.get(&case_id) {
            Some(hit) => hit,
            None => {
                let full = self.config.similarity.candidate_limit.max(1);
                let links = self
                    .run_with_budget(
                        "related",
                        self.matcher.find_similar(self.store.as_ref(), case_id, full),
                    )
                    .await?;
                self.related_cache.put(case_id, links)
            }
        };

        tracing::info!(case_id, related = links.len().min(limit), "related");
        Ok(links.iter().take(limit).cloned().collect())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.query_cache.stats()
    }

    pub fn related_cache_stats(&self) -> CacheStats {
        self.related_cache.stats()
    }

    /// Corpus aggregates, cached for five minutes.
    pub async fn corpus_stats(&self) -> SearchResult<CorpusStats> {
        if let Some(hit) = self.stats_cache.get(&STATS_KEY) {
            return Ok((*hit).clone());
        }
        let stats = storage(self.store.statistics().await)?;
        Ok((*self.stats_cache.put(STATS_KEY, stats)).clone())
    }

    pub async fn get_case(&self, id: i64) -> SearchResult<Case> {
        let mut found = storage(self.store.get_by_ids(&[id]).await)?;
        found.remove(&id).ok_or(SearchError::CaseNotFound(id))
    }

    pub async fn get_case_by_slug(&self, slug: &str) -> SearchResult<Option<Case>> {
        storage(self.store.get_by_slug(slug).await)
    }

    pub async fn suggest(&self, partial: &str, limit: usize) -> SearchResult<Vec<Suggestion>> {
        storage(self.store.suggest(partial, limit).await)
    }

    /// Insert or replace a case. Cached results may be stale afterwards, so
    /// every cache is cleared.
    pub async fn upsert_case(&self, case: &NewCase) -> SearchResult<i64> {
        let id = storage(self.store.upsert_case(case).await)?;
        self.invalidate_caches();
        Ok(id)
    }

    pub async fn optimize(&self) -> SearchResult<OptimizeReport> {
        let report = storage(self.store.optimize().await)?;
        self.invalidate_caches();
        tracing::info!(
            vacuumed = report.vacuumed,
            freelist_ratio = report.freelist_ratio,
            "database optimized"
        );
        Ok(report)
    }

    /// Drop every cached result. Hit and miss counters are kept.
    pub fn invalidate_caches(&self) {
        self.query_cache.invalidate_all();
        self.related_cache.invalidate_all();
        self.stats_cache.invalidate_all();
        tracing::debug!("caches invalidated");
    }
}
