//! SQLite-backed [`Store`] implementation.
//!
//! Full-text matching runs against the `cases_fts` FTS5 table (BM25 via
//! `bm25()`), metadata filters against `cases`. Every read holds the shared
//! side of a maintenance lock; [`Store::optimize`] and [`Store::upsert_case`]
//! take the exclusive side, so index rebuilds never interleave with queries.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tokio::sync::RwLock;

use crate::compiler::{CompiledQuery, QueryMode};
use crate::config::DbConfig;
use crate::db;
use crate::models::{
    normalize_citation, Case, CaseRow, ContentStats, CorpusStats, CourtTier, DataQuality,
    NamedCount, NewCase, OptimizeReport, Pagination, QueryFilters, YearCount,
};
use crate::schema;
use crate::store::{RawMatch, RawMatches, Store, Suggestion, SuggestionKind, MIN_SUGGEST_CHARS};

const CASE_COLUMNS: &str = "id, slug, court_name, court_slug, court_level, jurisdiction, \
     legal_area, decision_type, file_number, ecli, decision_date, year, content_raw, \
     content_clean, created_at, updated_at";

/// Ids per `IN (...)` list, well below SQLite's bound-variable limit.
const ID_BATCH: usize = 500;

const TOP_N: i64 = 15;

/// VACUUM only when more than this share of pages is free.
const VACUUM_FREELIST_RATIO: f64 = 0.10;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    maintenance: RwLock<()>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            maintenance: RwLock::new(()),
        }
    }

    /// Open an existing corpus. A missing schema or a damaged full-text
    /// index fails here rather than on the first query.
    pub async fn open(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config, false).await?;
        schema::verify(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create (or upgrade in place) the database and open it.
    pub async fn create(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config, true).await?;
        schema::run_migrations(&pool).await?;
        schema::verify(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn citations_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        let mut out: HashMap<i64, Vec<String>> = HashMap::new();
        for batch in ids.chunks(ID_BATCH) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT case_id, citation FROM case_citations WHERE case_id IN (");
            push_list(&mut qb, batch.iter().copied());
            qb.push(") ORDER BY case_id, position");

            for row in qb.build().fetch_all(&self.pool).await? {
                out.entry(row.try_get("case_id")?)
                    .or_default()
                    .push(row.try_get("citation")?);
            }
        }
        Ok(out)
    }

    async fn cases_from_rows(&self, rows: Vec<SqliteRow>) -> Result<Vec<Case>> {
        let parsed: Vec<CaseRow> = rows.iter().map(case_row).collect::<Result<_>>()?;
        let ids: Vec<i64> = parsed.iter().map(|r| r.id).collect();
        let mut citations = self.citations_for(&ids).await?;
        parsed
            .into_iter()
            .map(|r| {
                let cites = citations.remove(&r.id).unwrap_or_default();
                Case::from_row(r, cites)
            })
            .collect()
    }
}

fn case_row(row: &SqliteRow) -> Result<CaseRow> {
    Ok(CaseRow {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        court_name: row.try_get("court_name")?,
        court_slug: row.try_get("court_slug")?,
        court_level: row.try_get("court_level")?,
        jurisdiction: row.try_get("jurisdiction")?,
        legal_area: row.try_get("legal_area")?,
        decision_type: row.try_get("decision_type")?,
        file_number: row.try_get("file_number")?,
        ecli: row.try_get("ecli")?,
        decision_date: row.try_get("decision_date")?,
        year: row.try_get("year")?,
        content_raw: row.try_get("content_raw")?,
        content_clean: row.try_get("content_clean")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn push_list<'a, T, I>(qb: &mut QueryBuilder<'a, Sqlite>, values: I)
where
    T: 'a + sqlx::Encode<'a, Sqlite> + sqlx::Type<Sqlite> + Send,
    I: IntoIterator<Item = T>,
{
    let mut sep = qb.separated(", ");
    for v in values {
        sep.push_bind(v);
    }
}

/// `%value%` with LIKE wildcards in the value escaped by `\`.
fn like_contains(value: &str) -> String {
    let escaped = value
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, f: &QueryFilters) {
    if let Some(area) = &f.legal_area {
        qb.push(" AND c.legal_area LIKE ")
            .push_bind(like_contains(area))
            .push(" ESCAPE '\\'");
    }
    if let Some(court) = &f.court {
        qb.push(" AND (c.court_name LIKE ")
            .push_bind(like_contains(court))
            .push(" ESCAPE '\\' OR c.jurisdiction LIKE ")
            .push_bind(like_contains(court))
            .push(" ESCAPE '\\')");
    }
    if let Some(from) = f.year_from {
        qb.push(" AND c.year >= ").push_bind(from);
    }
    if let Some(to) = f.year_to {
        qb.push(" AND c.year <= ").push_bind(to);
    }
    if let Some(t) = &f.decision_type {
        qb.push(" AND c.decision_type = ")
            .push_bind(t.trim().to_string())
            .push(" COLLATE NOCASE");
    }
    if let Some(n) = &f.file_number {
        qb.push(" AND c.file_number LIKE ")
            .push_bind(like_contains(n))
            .push(" ESCAPE '\\'");
    }
    if let Some(e) = &f.ecli {
        qb.push(" AND c.ecli = ")
            .push_bind(e.trim().to_string())
            .push(" COLLATE NOCASE");
    }
    if let Some(level) = &f.court_level {
        // Unparsable levels are rejected before compilation; fall back to a
        // value no row carries.
        let level = CourtTier::parse(level).map_or("", |t| t.as_str());
        qb.push(" AND c.court_level = ").push_bind(level);
    }
}

/// FROM/WHERE clause shared by the page and count queries.
fn push_match_clause(qb: &mut QueryBuilder<'_, Sqlite>, query: &CompiledQuery) {
    match query.to_fts5() {
        Some(fts) => {
            qb.push(" FROM cases_fts JOIN cases c ON c.id = cases_fts.rowid WHERE cases_fts MATCH ")
                .push_bind(fts);
        }
        None => {
            qb.push(" FROM cases c WHERE 1 = 1");
        }
    }
    push_filters(qb, query.filters());
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute(&self, query: &CompiledQuery, page: Pagination) -> Result<RawMatches> {
        if query.mode() == QueryMode::MatchNothing {
            return Ok(RawMatches::default());
        }
        let _guard = self.maintenance.read().await;

        let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*)");
        push_match_clause(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count matches")?;

        let mut qb: QueryBuilder<Sqlite> = match query.mode() {
            QueryMode::FullText => QueryBuilder::new("SELECT c.id AS id, bm25(cases_fts) AS score"),
            _ => QueryBuilder::new("SELECT c.id AS id, 0.0 AS score"),
        };
        push_match_clause(&mut qb, query);
        match query.mode() {
            QueryMode::FullText => qb.push(" ORDER BY score ASC, c.id ASC"),
            _ => qb.push(" ORDER BY (c.decision_date IS NULL), c.decision_date DESC, c.id ASC"),
        };
        qb.push(" LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to execute full-text query")?;

        let hits = rows
            .iter()
            .map(|row| {
                let bm25: f64 = row.try_get("score")?;
                Ok(RawMatch {
                    case_id: row.try_get("id")?,
                    // bm25() is lower-is-better; negate so higher wins.
                    raw_score: -bm25,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawMatches {
            hits,
            total: total as usize,
        })
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Case>> {
        let _guard = self.maintenance.read().await;
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        let unique: Vec<i64> = unique.into_iter().collect();

        let mut out = HashMap::with_capacity(unique.len());
        for batch in unique.chunks(ID_BATCH) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {} FROM cases WHERE id IN (", CASE_COLUMNS));
            push_list(&mut qb, batch.iter().copied());
            qb.push(")");
            let rows = qb.build().fetch_all(&self.pool).await?;
            for case in self.cases_from_rows(rows).await? {
                out.insert(case.id, case);
            }
        }
        Ok(out)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Case>> {
        let _guard = self.maintenance.read().await;
        let row = sqlx::query(&format!("SELECT {} FROM cases WHERE slug = ?", CASE_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.cases_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn resolve_citations(&self, citations: &[String]) -> Result<HashMap<String, i64>> {
        let wanted: BTreeSet<String> = citations
            .iter()
            .map(|c| normalize_citation(c))
            .filter(|c| !c.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let numeric: Vec<i64> = wanted.iter().filter_map(|c| c.parse().ok()).collect();

        let _guard = self.maintenance.read().await;
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, slug, ecli, file_number FROM cases WHERE lower(slug) IN (",
        );
        push_list(&mut qb, wanted.iter().cloned());
        qb.push(") OR lower(ecli) IN (");
        push_list(&mut qb, wanted.iter().cloned());
        qb.push(") OR lower(file_number) IN (");
        push_list(&mut qb, wanted.iter().cloned());
        qb.push(")");
        if !numeric.is_empty() {
            qb.push(" OR id IN (");
            push_list(&mut qb, numeric);
            qb.push(")");
        }
        qb.push(" ORDER BY id ASC");

        let mut out = HashMap::new();
        for row in qb.build().fetch_all(&self.pool).await? {
            let id: i64 = row.try_get("id")?;
            let slug: String = row.try_get("slug")?;
            let ecli: Option<String> = row.try_get("ecli")?;
            let file_number: Option<String> = row.try_get("file_number")?;

            let idents = [Some(slug), ecli, file_number, Some(id.to_string())];
            for ident in idents.into_iter().flatten().map(|s| normalize_citation(&s)) {
                if wanted.contains(&ident) {
                    out.entry(ident).or_insert(id);
                }
            }
        }
        Ok(out)
    }

    async fn citing_cases(&self, identifiers: &[String], limit: usize) -> Result<Vec<i64>> {
        let wanted: BTreeSet<String> = identifiers
            .iter()
            .map(|c| normalize_citation(c))
            .filter(|c| !c.is_empty())
            .collect();
        if wanted.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.maintenance.read().await;
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT case_id FROM case_citations WHERE citation_norm IN (",
        );
        push_list(&mut qb, wanted.into_iter());
        qb.push(") ORDER BY case_id ASC LIMIT ")
            .push_bind(limit as i64);

        let ids = qb.build_query_scalar::<i64>().fetch_all(&self.pool).await?;
        Ok(ids)
    }

    async fn suggest(&self, partial: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let partial = partial.trim();
        if partial.chars().count() < MIN_SUGGEST_CHARS || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = like_contains(partial);

        let _guard = self.maintenance.read().await;
        let file_numbers: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT file_number FROM cases WHERE file_number LIKE ? ESCAPE '\\' \
             ORDER BY file_number LIMIT ?",
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let courts: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT court_name FROM cases WHERE court_name LIKE ? ESCAPE '\\' \
             ORDER BY court_name LIMIT ?",
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<Suggestion> = file_numbers
            .into_iter()
            .map(|value| Suggestion {
                kind: SuggestionKind::FileNumber,
                value,
            })
            .chain(courts.into_iter().map(|value| Suggestion {
                kind: SuggestionKind::Court,
                value,
            }))
            .collect();
        out.sort();
        out.truncate(limit);
        Ok(out)
    }

    async fn statistics(&self) -> Result<CorpusStats> {
        let _guard = self.maintenance.read().await;

        let total_cases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cases")
            .fetch_one(&self.pool)
            .await?;
        if total_cases == 0 {
            return Ok(CorpusStats::default());
        }

        let total_citations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM case_citations")
            .fetch_one(&self.pool)
            .await?;

        let named = |column: &str| {
            format!(
                "SELECT {col} AS name, COUNT(*) AS count FROM cases WHERE {col} IS NOT NULL \
                 GROUP BY {col} ORDER BY count DESC, name ASC LIMIT {top}",
                col = column,
                top = TOP_N
            )
        };
        let mut groups = Vec::with_capacity(2);
        for column in ["legal_area", "court_name"] {
            let rows = sqlx::query(&named(column)).fetch_all(&self.pool).await?;
            let counts = rows
                .iter()
                .map(|r| {
                    Ok(NamedCount {
                        name: r.try_get("name")?,
                        count: r.try_get("count")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            groups.push(counts);
        }
        let courts = groups.pop().unwrap_or_default();
        let legal_areas = groups.pop().unwrap_or_default();

        let year_rows = sqlx::query(
            "SELECT year, COUNT(*) AS count FROM cases WHERE year IS NOT NULL \
             GROUP BY year ORDER BY year DESC LIMIT ?",
        )
        .bind(TOP_N)
        .fetch_all(&self.pool)
        .await?;
        let years = year_rows
            .iter()
            .map(|r| {
                Ok(YearCount {
                    year: r.try_get::<i64, _>("year")? as i32,
                    count: r.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let content = sqlx::query(
            "SELECT AVG(content_length) AS avg_len, MIN(content_length) AS min_len, \
             MAX(content_length) AS max_len FROM cases",
        )
        .fetch_one(&self.pool)
        .await?;

        let quality = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(ecli IS NOT NULL), 0) AS with_ecli,
                COALESCE(SUM(decision_date IS NOT NULL), 0) AS with_date,
                COALESCE(SUM(file_number IS NOT NULL), 0) AS with_file_number
            FROM cases
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CorpusStats {
            total_cases,
            total_citations,
            legal_areas,
            courts,
            years,
            content: ContentStats {
                avg_length: content.try_get::<Option<f64>, _>("avg_len")?.unwrap_or(0.0),
                min_length: content.try_get::<Option<i64>, _>("min_len")?.unwrap_or(0),
                max_length: content.try_get::<Option<i64>, _>("max_len")?.unwrap_or(0),
            },
            quality: DataQuality {
                with_ecli: quality.try_get("with_ecli")?,
                with_date: quality.try_get("with_date")?,
                with_file_number: quality.try_get("with_file_number")?,
            },
        })
    }

    async fn upsert_case(&self, case: &NewCase) -> Result<i64> {
        let prepared = case.prepare()?;
        let now = chrono::Utc::now().timestamp();

        let _guard = self.maintenance.write().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, i64)> =
            sqlx::query_as("SELECT id, created_at FROM cases WHERE slug = ?")
                .bind(&prepared.slug)
                .fetch_optional(&mut *tx)
                .await?;

        let (id, created_at) = match (prepared.id, existing) {
            (Some(id), Some((existing_id, _))) if id != existing_id => {
                bail!("slug {} already belongs to case {}", prepared.slug, existing_id)
            }
            (_, Some((existing_id, created))) => (existing_id, created),
            (Some(id), None) => {
                let taken: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM cases WHERE id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
                if taken {
                    bail!("case id {} is already taken", id);
                }
                (id, now)
            }
            (None, None) => {
                let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM cases")
                    .fetch_one(&mut *tx)
                    .await?;
                (next, now)
            }
        };

        let decision_date = prepared
            .decision_date
            .map(|d| d.format("%Y-%m-%d").to_string());
        let content_length = prepared.content_clean.chars().count() as i64;

        sqlx::query(
            r#"
            INSERT INTO cases (id, slug, court_name, court_slug, court_level, jurisdiction,
                               legal_area, decision_type, file_number, ecli, decision_date,
                               year, content_raw, content_clean, content_length,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                court_name = excluded.court_name,
                court_slug = excluded.court_slug,
                court_level = excluded.court_level,
                jurisdiction = excluded.jurisdiction,
                legal_area = excluded.legal_area,
                decision_type = excluded.decision_type,
                file_number = excluded.file_number,
                ecli = excluded.ecli,
                decision_date = excluded.decision_date,
                year = excluded.year,
                content_raw = excluded.content_raw,
                content_clean = excluded.content_clean,
                content_length = excluded.content_length,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&prepared.slug)
        .bind(&prepared.court_name)
        .bind(&prepared.court_slug)
        .bind(prepared.court_level.as_str())
        .bind(&prepared.jurisdiction)
        .bind(&prepared.legal_area)
        .bind(&prepared.decision_type)
        .bind(&prepared.file_number)
        .bind(&prepared.ecli)
        .bind(&decision_date)
        .bind(prepared.year)
        .bind(&prepared.content_raw)
        .bind(&prepared.content_clean)
        .bind(content_length)
        .bind(created_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to write case {}", prepared.slug))?;

        sqlx::query("DELETE FROM case_citations WHERE case_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (position, citation) in prepared.citations.iter().enumerate() {
            sqlx::query(
                "INSERT INTO case_citations (case_id, position, citation, citation_norm) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(position as i64)
            .bind(citation)
            .bind(normalize_citation(citation))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cases_fts WHERE rowid = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO cases_fts (rowid, content_clean, court_name, file_number, ecli, legal_area) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&prepared.content_clean)
        .bind(&prepared.court_name)
        .bind(&prepared.file_number)
        .bind(&prepared.ecli)
        .bind(&prepared.legal_area)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn optimize(&self) -> Result<OptimizeReport> {
        let _guard = self.maintenance.write().await;

        sqlx::query("ANALYZE").execute(&self.pool).await?;
        sqlx::query("INSERT INTO cases_fts(cases_fts) VALUES('optimize')")
            .execute(&self.pool)
            .await
            .context("Failed to optimize full-text index")?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let freelist: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await?;
        let freelist_ratio = if page_count > 0 {
            freelist as f64 / page_count as f64
        } else {
            0.0
        };

        let vacuumed = freelist_ratio > VACUUM_FREELIST_RATIO;
        if vacuumed {
            sqlx::query("VACUUM").execute(&self.pool).await?;
        }

        Ok(OptimizeReport {
            analyzed: true,
            fts_optimized: true,
            vacuumed,
            freelist_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::models::Query;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            path: dir.path().join("cases.sqlite"),
            max_connections: 2,
        };
        let store = SqliteStore::create(&config).await.unwrap();
        (dir, store)
    }

    fn case(slug: &str, court: &str, area: &str, date: &str, content: &str) -> NewCase {
        NewCase {
            slug: slug.into(),
            court_name: court.into(),
            legal_area: Some(area.into()),
            date: Some(date.into()),
            content: Some(format!("<p>{}</p>", content)),
            ..NewCase::default()
        }
    }

    #[tokio::test]
    async fn upsert_and_fetch_round_trip() {
        let (_dir, store) = temp_store().await;
        let mut new = case("bgh-1", "Bundesgerichtshof", "Mietrecht", "15.03.2022", "Mietrecht ist wichtig.");
        new.citations = vec!["ECLI:DE:BGH:2019:1".into(), "§ 573 BGB".into()];
        let id = store.upsert_case(&new).await.unwrap();

        let cases = store.get_by_ids(&[id, 999]).await.unwrap();
        assert_eq!(cases.len(), 1);
        let c = &cases[&id];
        assert_eq!(c.content_clean, "Mietrecht ist wichtig.");
        assert_eq!(c.year, Some(2022));
        assert_eq!(c.court_level, CourtTier::Federal);
        assert_eq!(c.citations, vec!["ECLI:DE:BGH:2019:1", "§ 573 BGB"]);

        // Re-import keeps the id and replaces content.
        let again = store
            .upsert_case(&case("bgh-1", "Bundesgerichtshof", "Mietrecht", "2022-03-15", "Neu."))
            .await
            .unwrap();
        assert_eq!(again, id);
        let c = store.get_by_slug("bgh-1").await.unwrap().unwrap();
        assert_eq!(c.content_clean, "Neu.");
        assert!(c.citations.is_empty());
    }

    #[tokio::test]
    async fn execute_full_text_with_filters() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_case(&case("a", "Bundesgerichtshof", "Mietrecht", "2022-01-01", "Kündigung wegen Eigenbedarf."))
            .await
            .unwrap();
        store
            .upsert_case(&case("b", "Landgericht Berlin", "Mietrecht", "2015-01-01", "Kündigung des Mietvertrags."))
            .await
            .unwrap();
        store
            .upsert_case(&case("c", "Bundesarbeitsgericht", "Arbeitsrecht", "2023-01-01", "Kündigung des Arbeitsvertrags."))
            .await
            .unwrap();

        let all = store
            .execute(&compile(&Query::new("Kündigung")), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(all.total, 3);
        assert!(all.hits.iter().all(|h| h.raw_score.is_finite()));

        let filtered = Query::new("Kündigung").with_filters(QueryFilters {
            legal_area: Some("miet".into()),
            year_from: Some(2020),
            ..QueryFilters::default()
        });
        let res = store
            .execute(&compile(&filtered), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(res.total, 1);
        assert_eq!(res.hits[0].case_id, 1);

        let browse = Query::new("").with_filters(QueryFilters {
            court_level: Some("federal".into()),
            ..QueryFilters::default()
        });
        let res = store
            .execute(&compile(&browse), Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(res.hits.iter().map(|h| h.case_id).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[tokio::test]
    async fn like_wildcards_are_literal() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_case(&case("a", "BGH", "Mietrecht", "2022", "Text."))
            .await
            .unwrap();
        let q = Query::new("").with_filters(QueryFilters {
            legal_area: Some("%".into()),
            ..QueryFilters::default()
        });
        let res = store.execute(&compile(&q), Pagination::new(1, 10)).await.unwrap();
        assert_eq!(res.total, 0);
    }

    #[tokio::test]
    async fn statistics_and_suggestions() {
        let (_dir, store) = temp_store().await;
        assert_eq!(store.statistics().await.unwrap(), CorpusStats::default());

        let mut a = case("a", "Bundesgerichtshof", "Mietrecht", "2022-01-01", "Eins zwei drei.");
        a.file_number = Some("VIII ZR 1/21".into());
        a.ecli = Some("ECLI:DE:BGH:2022:1".into());
        store.upsert_case(&a).await.unwrap();
        store
            .upsert_case(&case("b", "Amtsgericht Köln", "Mietrecht", "2021", "Vier."))
            .await
            .unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_cases, 2);
        assert_eq!(stats.legal_areas[0], NamedCount { name: "Mietrecht".into(), count: 2 });
        assert_eq!(stats.years[0], YearCount { year: 2022, count: 1 });
        assert_eq!(stats.quality.with_ecli, 1);
        assert_eq!(stats.quality.with_date, 1);
        assert_eq!(stats.content.max_length, "Eins zwei drei.".chars().count() as i64);

        let s = store.suggest("zr 1", 5).await.unwrap();
        assert_eq!(
            s,
            vec![Suggestion {
                kind: SuggestionKind::FileNumber,
                value: "VIII ZR 1/21".into()
            }]
        );
    }

    #[tokio::test]
    async fn citations_resolve_to_ids() {
        let (_dir, store) = temp_store().await;
        let mut target = case("bgh-x", "BGH", "Mietrecht", "2020", "Ziel.");
        target.ecli = Some("ECLI:DE:BGH:2020:7".into());
        let t = store.upsert_case(&target).await.unwrap();
        let mut source = case("lg-y", "LG Berlin", "Mietrecht", "2021", "Quelle.");
        source.citations = vec!["ecli:de:bgh:2020:7".into()];
        let s = store.upsert_case(&source).await.unwrap();

        let resolved = store
            .resolve_citations(&["ECLI:DE:BGH:2020:7".into(), "unknown".into()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["ecli:de:bgh:2020:7"], t);

        let citing = store
            .citing_cases(&["ECLI:DE:BGH:2020:7".into()], 10)
            .await
            .unwrap();
        assert_eq!(citing, vec![s]);
    }

    #[tokio::test]
    async fn optimize_reports_work_done() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_case(&case("a", "BGH", "Mietrecht", "2022", "Text."))
            .await
            .unwrap();
        let report = store.optimize().await.unwrap();
        assert!(report.analyzed);
        assert!(report.fts_optimized);
        assert!((0.0..=1.0).contains(&report.freelist_ratio));
    }

    #[tokio::test]
    async fn open_fails_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            path: dir.path().join("cases.sqlite"),
            max_connections: 1,
        };
        let store = SqliteStore::create(&config).await.unwrap();
        sqlx::query("DROP TABLE cases_fts")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        let err = SqliteStore::open(&config).await.err().unwrap();
        assert!(err.to_string().contains("cases_fts"));
    }
}
