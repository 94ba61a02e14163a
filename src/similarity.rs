//! Related-case discovery by shared citations and lexical overlap.
//!
//! For a source case the matcher gathers a bounded candidate set from the
//! store (cases it cites, cases citing it or sharing one of its citations,
//! and full-text hits for its most characteristic words), then scores each
//! candidate:
//!
//! - **citation score**: Jaccard of the two citation sets. A case's set
//!   holds the ids of the corpus cases it cites, the normalized text of
//!   citations that resolve to nothing, and its own id, so a direct
//!   citation in either direction counts as overlap. A direct citation
//!   floors the score at `direct_citation_floor`.
//! - **lexical score**: weighted Jaccard (Σmin / Σmax) of bounded
//!   term-frequency sketches of the cleaned texts.
//!
//! No pairwise scan of the corpus happens; cost is bounded by
//! `candidate_limit`.

use std::collections::{BTreeSet, HashMap};

use crate::compiler::CompiledQuery;
use crate::config::SimilarityConfig;
use crate::error::{SearchError, SearchResult};
use crate::models::{normalize_citation, Case, Pagination, SimilarityBasis, SimilarityLink};
use crate::store::Store;
use crate::text;

/// Sketch words used to query the full-text index for candidates.
const FTS_SEED_TERMS: usize = 12;

/// Bounded term-frequency profile of a text. Weights are relative
/// frequencies over the kept terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermSketch {
    /// Sorted by weight descending, then term ascending.
    terms: Vec<(String, f64)>,
}

impl TermSketch {
    /// Top `size` content words and statute references of `text`.
    pub fn build(text: &str, size: usize) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for w in text::content_words(text) {
            *counts.entry(w).or_default() += 1;
        }
        for r in text::extract_statute_refs(text) {
            *counts.entry(r.to_lowercase()).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(size);

        let total: usize = ranked.iter().map(|(_, c)| c).sum();
        let terms = ranked
            .into_iter()
            .map(|(t, c)| (t, c as f64 / total.max(1) as f64))
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Most frequent single words, skipping multi-word statute references.
    pub fn top_words(&self, n: usize) -> Vec<&str> {
        self.terms
            .iter()
            .map(|(t, _)| t.as_str())
            .filter(|t| !t.contains(' '))
            .take(n)
            .collect()
    }

    /// Weighted Jaccard similarity in `[0, 1]`.
    pub fn weighted_jaccard(&self, other: &TermSketch) -> f64 {
        let a: HashMap<&str, f64> = self.terms.iter().map(|(t, w)| (t.as_str(), *w)).collect();
        let b: HashMap<&str, f64> = other.terms.iter().map(|(t, w)| (t.as_str(), *w)).collect();

        let mut min_sum = 0.0;
        let mut max_sum = 0.0;
        for (term, wa) in &a {
            let wb = b.get(term).copied().unwrap_or(0.0);
            min_sum += wa.min(wb);
            max_sum += wa.max(wb);
        }
        for (term, wb) in &b {
            if !a.contains_key(term) {
                max_sum += wb;
            }
        }
        if max_sum > 0.0 {
            min_sum / max_sum
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CitationKey {
    Case(i64),
    Text(String),
}

fn citation_set(case: &Case, resolved: &HashMap<String, i64>) -> BTreeSet<CitationKey> {
    let mut set: BTreeSet<CitationKey> = case
        .citations
        .iter()
        .map(|c| normalize_citation(c))
        .filter(|c| !c.is_empty())
        .map(|c| match resolved.get(&c) {
            Some(id) => CitationKey::Case(*id),
            None => CitationKey::Text(c),
        })
        .collect();
    set.insert(CitationKey::Case(case.id));
    set
}

pub struct SimilarityMatcher {
    config: SimilarityConfig,
    leitsatz_max_chars: usize,
}

impl SimilarityMatcher {
    pub fn new(config: SimilarityConfig, leitsatz_max_chars: usize) -> Self {
        Self {
            config,
            leitsatz_max_chars,
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    fn storage<T>(r: anyhow::Result<T>) -> SearchResult<T> {
        r.map_err(SearchError::StorageUnavailable)
    }

    /// Cases related to `case_id`, strongest first (ties by id), at most
    /// `limit`. The source case never appears in its own result.
    pub async fn find_similar<S: Store + ?Sized>(
        &self,
        store: &S,
        case_id: i64,
        limit: usize,
    ) -> SearchResult<Vec<SimilarityLink>> {
        let mut fetched = Self::storage(store.get_by_ids(&[case_id]).await)?;
        let source = fetched
            .remove(&case_id)
            .ok_or(SearchError::CaseNotFound(case_id))?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let cfg = &self.config;
        let sketch = TermSketch::build(&source.content_clean, cfg.sketch_size);
        let has_text = sketch.len() >= cfg.min_sketch_terms;
        if source.citations.is_empty() && !has_text {
            tracing::debug!(case_id, "no citations and too little text for similarity");
            return Ok(Vec::new());
        }

        let mut resolved = Self::storage(store.resolve_citations(&source.citations).await)?;

        // Candidate order: cited cases, citing/co-citing cases, text hits.
        let mut candidates: Vec<i64> = resolved.values().copied().collect::<BTreeSet<_>>().into_iter().collect();

        let mut identifiers = source.identifiers();
        identifiers.extend(source.citations.iter().map(|c| normalize_citation(c)));
        candidates.extend(Self::storage(store.citing_cases(&identifiers, cfg.candidate_limit).await)?);

        if has_text {
            let seed = CompiledQuery::any_of(sketch.top_words(FTS_SEED_TERMS));
            let hits = Self::storage(
                store
                    .execute(&seed, Pagination::new(1, cfg.candidate_limit))
                    .await,
            )?;
            candidates.extend(hits.hits.into_iter().map(|h| h.case_id));
        }

        let mut seen = BTreeSet::new();
        candidates.retain(|id| *id != case_id && seen.insert(*id));
        candidates.truncate(cfg.candidate_limit);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let cases = Self::storage(store.get_by_ids(&candidates).await)?;

        let unresolved: Vec<String> = cases
            .values()
            .flat_map(|c| c.citations.iter().map(|s| normalize_citation(s)))
            .filter(|c| !resolved.contains_key(c))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !unresolved.is_empty() {
            resolved.extend(Self::storage(store.resolve_citations(&unresolved).await)?);
        }

        let source_set = citation_set(&source, &resolved);
        let weight_sum = cfg.citation_weight + cfg.lexical_weight;

        let mut links: Vec<SimilarityLink> = candidates
            .iter()
            .filter_map(|id| cases.get(id))
            .filter_map(|candidate| {
                let target_set = citation_set(candidate, &resolved);
                let direct = source_set.contains(&CitationKey::Case(candidate.id))
                    || target_set.contains(&CitationKey::Case(source.id));
                let shared = source_set
                    .intersection(&target_set)
                    .filter(|k| {
                        **k != CitationKey::Case(source.id) && **k != CitationKey::Case(candidate.id)
                    })
                    .count();

                let union = source_set.union(&target_set).count();
                let jaccard = if union > 0 {
                    source_set.intersection(&target_set).count() as f64 / union as f64
                } else {
                    0.0
                };
                let citation_score = if direct {
                    jaccard.max(cfg.direct_citation_floor)
                } else {
                    jaccard
                };

                let lexical_score = if has_text {
                    sketch.weighted_jaccard(&TermSketch::build(&candidate.content_clean, cfg.sketch_size))
                } else {
                    0.0
                };

                if shared == 0 && !direct && lexical_score <= 0.0 {
                    return None;
                }

                let strength = ((cfg.citation_weight * citation_score
                    + cfg.lexical_weight * lexical_score)
                    / weight_sum)
                    .clamp(0.0, 1.0);
                if strength < cfg.min_strength {
                    return None;
                }

                Some(SimilarityLink {
                    source_id: source.id,
                    target_id: candidate.id,
                    strength,
                    basis: SimilarityBasis {
                        shared_citations: shared,
                        direct_citation: direct,
                        citation_score,
                        lexical_score,
                    },
                    target: candidate.summary(self.leitsatz_max_chars),
                })
            })
            .collect();

        links.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        links.truncate(limit);

        tracing::debug!(case_id, related = links.len(), "similarity computed");
        Ok(links)
    }
}
