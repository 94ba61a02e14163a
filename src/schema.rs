//! Idempotent schema bootstrap and startup verification.
//!
//! Tables:
//!
//! | Table | Content |
//! |-------|---------|
//! | `cases` | One row per decision, keyed by integer id, unique slug |
//! | `case_citations` | Ordered citation list per case, with a normalized column for lookup |
//! | `cases_fts` | FTS5 index over cleaned text, court name, file number, ECLI and legal area; `rowid` = case id |

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            court_name TEXT NOT NULL,
            court_slug TEXT,
            court_level TEXT,
            jurisdiction TEXT,
            legal_area TEXT,
            decision_type TEXT,
            file_number TEXT,
            ecli TEXT,
            decision_date TEXT,
            year INTEGER,
            content_raw TEXT NOT NULL DEFAULT '',
            content_clean TEXT NOT NULL DEFAULT '',
            content_length INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_citations (
            case_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            citation TEXT NOT NULL,
            citation_norm TEXT NOT NULL,
            PRIMARY KEY (case_id, position),
            FOREIGN KEY (case_id) REFERENCES cases(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='cases_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE cases_fts USING fts5(
                content_clean,
                court_name,
                file_number,
                ecli,
                legal_area,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_cases_year ON cases(year)",
        "CREATE INDEX IF NOT EXISTS idx_cases_decision_date ON cases(decision_date DESC)",
        "CREATE INDEX IF NOT EXISTS idx_cases_legal_area ON cases(legal_area)",
        "CREATE INDEX IF NOT EXISTS idx_cases_court_name ON cases(court_name)",
        "CREATE INDEX IF NOT EXISTS idx_cases_ecli ON cases(ecli)",
        "CREATE INDEX IF NOT EXISTS idx_cases_file_number ON cases(file_number)",
        "CREATE INDEX IF NOT EXISTS idx_case_citations_norm ON case_citations(citation_norm)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}

/// Confirm the schema is present and the full-text index is consistent.
/// A failure here is a startup error, not a per-query one.
pub async fn verify(pool: &SqlitePool) -> Result<()> {
    for table in ["cases", "case_citations", "cases_fts"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        if !exists {
            bail!("Database schema is missing table `{}` (run `gls init`)", table);
        }
    }

    sqlx::query("INSERT INTO cases_fts(cases_fts) VALUES('integrity-check')")
        .execute(pool)
        .await
        .context("Full-text index failed its integrity check")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::db;

    fn db_config(dir: &tempfile::TempDir) -> DbConfig {
        DbConfig {
            path: dir.path().join("cases.sqlite"),
            max_connections: 1,
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(&db_config(&dir), true).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        verify(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn verify_rejects_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(&db_config(&dir), true).await.unwrap();
        let err = verify(&pool).await.unwrap_err();
        assert!(err.to_string().contains("missing table `cases`"));
    }

    #[tokio::test]
    async fn connect_without_create_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = db::connect(&db_config(&dir), false).await.unwrap_err();
        assert!(err.to_string().contains("Database not found"));
    }
}
