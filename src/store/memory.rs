//! In-memory [`Store`] implementation for tests.
//!
//! Cases live in a `BTreeMap` behind a `parking_lot::RwLock`. Text matching
//! follows the FTS5 model loosely: documents and terms are split into case-
//! and diacritic-folded alphanumeric tokens, a term matches a contiguous
//! token run, and hits are scored with a BM25-style saturation over idf.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::compiler::{CompiledQuery, QueryMode, QueryTerm};
use crate::models::{
    normalize_citation, Case, ContentStats, CorpusStats, DataQuality, NamedCount, NewCase,
    OptimizeReport, Pagination, YearCount,
};

use crate::text;

use super::{
    matches_filters, RawMatch, RawMatches, Store, Suggestion, SuggestionKind, MIN_SUGGEST_CHARS,
};

const TOP_N: usize = 15;

struct Indexed {
    case: Case,
    tokens: Vec<String>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    cases: RwLock<BTreeMap<i64, Indexed>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            cases: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(text::fold)
        .collect()
}

fn searchable_tokens(case: &Case) -> Vec<String> {
    let mut out = tokens(&case.content_clean);
    out.extend(tokens(&case.court_name));
    for field in [&case.file_number, &case.ecli, &case.legal_area] {
        if let Some(v) = field {
            out.extend(tokens(v));
        }
    }
    out
}

/// Occurrences of `pattern` as a contiguous run in `doc`. With `prefix`,
/// the last pattern token only has to start the document token.
fn occurrences(doc: &[String], pattern: &[String], prefix: bool) -> usize {
    if pattern.is_empty() || pattern.len() > doc.len() {
        return 0;
    }
    let last = pattern.len() - 1;
    doc.windows(pattern.len())
        .filter(|w| {
            w.iter().zip(pattern).enumerate().all(|(i, (d, p))| {
                if prefix && i == last {
                    d.starts_with(p.as_str())
                } else {
                    d == p
                }
            })
        })
        .count()
}

fn term_pattern(term: &QueryTerm) -> (Vec<String>, bool) {
    match term {
        QueryTerm::Phrase(s) | QueryTerm::Term(s) => (tokens(s), false),
        QueryTerm::Prefix(s) => (tokens(s), true),
    }
}

fn top_counts<'a, I: Iterator<Item = &'a str>>(values: I) -> Vec<NamedCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut out: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount {
            name: name.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    out.truncate(TOP_N);
    out
}

#[async_trait]
impl Store for InMemoryStore {
    async fn execute(&self, query: &CompiledQuery, page: Pagination) -> Result<RawMatches> {
        let cases = self.cases.read();
        let filtered = cases
            .values()
            .filter(|ix| matches_filters(&ix.case, query.filters()));

        let mut hits: Vec<(RawMatch, Option<chrono::NaiveDate>)> = match query.mode() {
            QueryMode::MatchNothing => return Ok(RawMatches::default()),
            QueryMode::Browse => filtered
                .map(|ix| {
                    (
                        RawMatch {
                            case_id: ix.case.id,
                            raw_score: 0.0,
                        },
                        ix.case.decision_date,
                    )
                })
                .collect(),
            QueryMode::FullText => {
                let n = cases.len() as f64;
                let patterns: Vec<(Vec<String>, bool, f64)> = query
                    .terms()
                    .iter()
                    .map(|t| {
                        let (pattern, prefix) = term_pattern(t);
                        let df = cases
                            .values()
                            .filter(|ix| occurrences(&ix.tokens, &pattern, prefix) > 0)
                            .count() as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        (pattern, prefix, idf)
                    })
                    .collect();

                filtered
                    .filter_map(|ix| {
                        let score: f64 = patterns
                            .iter()
                            .map(|(pattern, prefix, idf)| {
                                let tf = occurrences(&ix.tokens, pattern, *prefix) as f64;
                                idf * tf / (tf + 1.2)
                            })
                            .sum();
                        (score > 0.0).then(|| {
                            (
                                RawMatch {
                                    case_id: ix.case.id,
                                    raw_score: score,
                                },
                                ix.case.decision_date,
                            )
                        })
                    })
                    .collect()
            }
        };

        hits.sort_by(|(a, da), (b, db)| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| db.is_some().cmp(&da.is_some()))
                .then_with(|| db.cmp(da))
                .then_with(|| a.case_id.cmp(&b.case_id))
        });

        let total = hits.len();
        let hits = hits
            .into_iter()
            .skip(page.offset())
            .take(page.page_size)
            .map(|(m, _)| m)
            .collect();
        Ok(RawMatches { hits, total })
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Case>> {
        let cases = self.cases.read();
        Ok(ids
            .iter()
            .filter_map(|id| cases.get(id).map(|ix| (*id, ix.case.clone())))
            .collect())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Case>> {
        let cases = self.cases.read();
        Ok(cases
            .values()
            .find(|ix| ix.case.slug == slug)
            .map(|ix| ix.case.clone()))
    }

    async fn resolve_citations(&self, citations: &[String]) -> Result<HashMap<String, i64>> {
        let wanted: BTreeSet<String> = citations.iter().map(|c| normalize_citation(c)).collect();
        let cases = self.cases.read();
        let mut out = HashMap::new();
        // Ascending id order, so the first writer is the lowest id.
        for ix in cases.values() {
            for ident in ix.case.identifiers() {
                if wanted.contains(&ident) {
                    out.entry(ident).or_insert(ix.case.id);
                }
            }
        }
        Ok(out)
    }

    async fn citing_cases(&self, identifiers: &[String], limit: usize) -> Result<Vec<i64>> {
        let wanted: BTreeSet<String> = identifiers.iter().map(|c| normalize_citation(c)).collect();
        let cases = self.cases.read();
        Ok(cases
            .values()
            .filter(|ix| {
                ix.case
                    .citations
                    .iter()
                    .any(|c| wanted.contains(&normalize_citation(c)))
            })
            .map(|ix| ix.case.id)
            .take(limit)
            .collect())
    }

    async fn suggest(&self, partial: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let needle = partial.trim().to_lowercase();
        if needle.chars().count() < MIN_SUGGEST_CHARS {
            return Ok(Vec::new());
        }
        let cases = self.cases.read();
        let mut found: BTreeSet<Suggestion> = BTreeSet::new();
        for ix in cases.values() {
            if let Some(fnr) = &ix.case.file_number {
                if fnr.to_lowercase().contains(&needle) {
                    found.insert(Suggestion {
                        kind: SuggestionKind::FileNumber,
                        value: fnr.clone(),
                    });
                }
            }
            if ix.case.court_name.to_lowercase().contains(&needle) {
                found.insert(Suggestion {
                    kind: SuggestionKind::Court,
                    value: ix.case.court_name.clone(),
                });
            }
        }
        Ok(found.into_iter().take(limit).collect())
    }

    async fn statistics(&self) -> Result<CorpusStats> {
        let cases = self.cases.read();
        let all: Vec<&Case> = cases.values().map(|ix| &ix.case).collect();
        if all.is_empty() {
            return Ok(CorpusStats::default());
        }

        let mut years: BTreeMap<i32, i64> = BTreeMap::new();
        for y in all.iter().filter_map(|c| c.year) {
            *years.entry(y).or_default() += 1;
        }
        let lengths: Vec<i64> = all.iter().map(|c| c.content_length as i64).collect();

        Ok(CorpusStats {
            total_cases: all.len() as i64,
            total_citations: all.iter().map(|c| c.citations.len() as i64).sum(),
            legal_areas: top_counts(all.iter().filter_map(|c| c.legal_area.as_deref())),
            courts: top_counts(all.iter().map(|c| c.court_name.as_str())),
            years: years
                .into_iter()
                .rev()
                .take(TOP_N)
                .map(|(year, count)| YearCount { year, count })
                .collect(),
            content: ContentStats {
                avg_length: lengths.iter().sum::<i64>() as f64 / lengths.len() as f64,
                min_length: lengths.iter().copied().min().unwrap_or(0),
                max_length: lengths.iter().copied().max().unwrap_or(0),
            },
            quality: DataQuality {
                with_ecli: all.iter().filter(|c| c.ecli.is_some()).count() as i64,
                with_date: all.iter().filter(|c| c.decision_date.is_some()).count() as i64,
                with_file_number: all.iter().filter(|c| c.file_number.is_some()).count() as i64,
            },
        })
    }

    async fn upsert_case(&self, case: &NewCase) -> Result<i64> {
        let prepared = case.prepare()?;
        let now = chrono::Utc::now().timestamp();
        let mut cases = self.cases.write();

        let existing = cases
            .values()
            .find(|ix| ix.case.slug == prepared.slug)
            .map(|ix| (ix.case.id, ix.case.created_at));

        let (id, created_at) = match (prepared.id, existing) {
            (Some(id), Some((existing_id, _))) if id != existing_id => {
                bail!("slug {} already belongs to case {}", prepared.slug, existing_id)
            }
            (_, Some((existing_id, created))) => (existing_id, created),
            (Some(id), None) => {
                if cases.contains_key(&id) {
                    bail!("case id {} is already taken", id);
                }
                (id, now)
            }
            (None, None) => (cases.keys().next_back().map_or(1, |max| max + 1), now),
        };

        let case = prepared.into_case(id, created_at, now);
        let tokens = searchable_tokens(&case);
        cases.insert(id, Indexed { case, tokens });
        Ok(id)
    }

    async fn optimize(&self) -> Result<OptimizeReport> {
        Ok(OptimizeReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::models::{Query, QueryFilters};

    fn new_case(slug: &str, court: &str, area: &str, date: &str, content: &str) -> NewCase {
        NewCase {
            slug: slug.into(),
            court_name: court.into(),
            legal_area: Some(area.into()),
            date: Some(date.into()),
            content: Some(content.into()),
            ..NewCase::default()
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_case(&new_case(
                "a",
                "Bundesgerichtshof",
                "Mietrecht",
                "2022-03-15",
                "Die Kündigung des Mietvertrags wegen Eigenbedarf ist wirksam.",
            ))
            .await
            .unwrap();
        store
            .upsert_case(&new_case(
                "b",
                "Amtsgericht Köln",
                "Mietrecht",
                "2019-01-10",
                "Mietminderung wegen Schimmel. Kündigung unwirksam. Kündigung zurückgewiesen.",
            ))
            .await
            .unwrap();
        store
            .upsert_case(&new_case(
                "c",
                "Bundesarbeitsgericht",
                "Arbeitsrecht",
                "2023-06-01",
                "Überstunden sind zu vergüten.",
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn full_text_scores_and_totals() {
        let store = seeded().await;
        let compiled = compile(&Query::new("Kündigung"));
        let res = store.execute(&compiled, Pagination::new(1, 10)).await.unwrap();
        assert_eq!(res.total, 2);
        // Two occurrences beat one.
        assert_eq!(res.hits[0].case_id, 2);
        assert!(res.hits.iter().all(|h| h.raw_score > 0.0));
    }

    #[tokio::test]
    async fn prefix_and_phrase_terms() {
        let store = seeded().await;
        let res = store
            .execute(&compile(&Query::new("Miet*")), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(res.total, 2);

        let res = store
            .execute(&compile(&Query::new("\"wegen Eigenbedarf\"")), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(res.hits.iter().map(|h| h.case_id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn browse_and_pagination() {
        let store = seeded().await;
        let q = Query::new("").with_filters(QueryFilters {
            legal_area: Some("Mietrecht".into()),
            ..QueryFilters::default()
        });
        let compiled = compile(&q);
        let page1 = store.execute(&compiled, Pagination::new(1, 1)).await.unwrap();
        let page2 = store.execute(&compiled, Pagination::new(2, 1)).await.unwrap();
        assert_eq!(page1.total, 2);
        // Newest first.
        assert_eq!(page1.hits[0].case_id, 1);
        assert_eq!(page2.hits[0].case_id, 2);

        let nothing = store
            .execute(&compile(&Query::new("")), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(nothing, RawMatches::default());
    }

    #[tokio::test]
    async fn upsert_replaces_by_slug() {
        let store = seeded().await;
        let id = store
            .upsert_case(&new_case("a", "BGH", "Mietrecht", "2022", "Neu."))
            .await
            .unwrap();
        assert_eq!(id, 1);
        let case = store.get_by_slug("a").await.unwrap().unwrap();
        assert_eq!(case.content_clean, "Neu.");
        assert_eq!(case.year, Some(2022));
        assert_eq!(case.decision_date, None);
        assert_eq!(store.statistics().await.unwrap().total_cases, 3);
    }

    #[tokio::test]
    async fn citations_resolve_and_reverse() {
        let store = InMemoryStore::new();
        let target = NewCase {
            slug: "bgh-target".into(),
            court_name: "BGH".into(),
            ecli: Some("ECLI:DE:BGH:2020:1".into()),
            content: Some("Text".into()),
            ..NewCase::default()
        };
        let source = NewCase {
            slug: "olg-source".into(),
            court_name: "OLG Hamm".into(),
            citations: vec!["ecli:de:bgh:2020:1".into(), "BVerfGE 1, 2".into()],
            content: Some("Text".into()),
            ..NewCase::default()
        };
        let t = store.upsert_case(&target).await.unwrap();
        let s = store.upsert_case(&source).await.unwrap();

        let resolved = store
            .resolve_citations(&["ECLI:DE:BGH:2020:1".into(), "BVerfGE 1, 2".into()])
            .await
            .unwrap();
        assert_eq!(resolved.get("ecli:de:bgh:2020:1"), Some(&t));
        assert_eq!(resolved.len(), 1);

        let citing = store
            .citing_cases(&["ECLI:DE:BGH:2020:1".into()], 10)
            .await
            .unwrap();
        assert_eq!(citing, vec![s]);
    }

    #[tokio::test]
    async fn suggestions_and_empty_stats() {
        let empty = InMemoryStore::new();
        assert_eq!(empty.statistics().await.unwrap(), CorpusStats::default());

        let store = seeded().await;
        let s = store.suggest("bundes", 10).await.unwrap();
        assert_eq!(s.len(), 2);
        assert!(s.iter().all(|x| x.kind == SuggestionKind::Court));
        assert!(store.suggest("b", 10).await.unwrap().is_empty());
    }
}
