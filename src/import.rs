//! Bulk import of case records from JSON Lines.
//!
//! Each non-blank line is one [`NewCase`]. Records are upserted by slug, so
//! re-importing a file refreshes existing cases instead of duplicating
//! them. A line that fails to parse or validate is skipped and reported; a
//! storage failure aborts the import.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::models::NewCase;
use crate::orchestrator::SearchOrchestrator;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub read: usize,
    pub upserted: usize,
    pub skipped: Vec<SkippedLine>,
}

fn parse_line(line: &str) -> Result<NewCase> {
    let case: NewCase = serde_json::from_str(line).context("malformed JSON record")?;
    case.prepare()?;
    Ok(case)
}

/// Import `path` into the orchestrator's store. With `limit`, stop after
/// that many records; with `dry_run`, validate without writing.
pub async fn import_jsonl<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    path: &Path,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<ImportReport> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open import file: {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut report = ImportReport::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        if limit.is_some_and(|l| report.read >= l) {
            break;
        }
        report.read += 1;

        let case = match parse_line(&line) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(line = line_no, error = %format!("{:#}", e), "skipping record");
                report.skipped.push(SkippedLine {
                    line: line_no,
                    reason: format!("{:#}", e),
                });
                continue;
            }
        };

        if !dry_run {
            orchestrator.upsert_case(&case).await?;
            report.upserted += 1;
        }
    }

    tracing::info!(
        read = report.read,
        upserted = report.upserted,
        skipped = report.skipped.len(),
        "import finished"
    );
    Ok(report)
}

/// CLI entry point.
pub async fn run_import<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    path: &Path,
    limit: Option<usize>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let report = import_jsonl(orchestrator, path, limit, dry_run).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if dry_run {
        println!("import {} (dry-run)", path.display());
    } else {
        println!("import {}", path.display());
    }
    println!("  records read: {}", report.read);
    println!("  upserted cases: {}", report.upserted);
    println!("  skipped: {}", report.skipped.len());
    for s in &report.skipped {
        println!("    line {}: {}", s.line, s.reason);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::memory::InMemoryStore;
    use std::io::Write;
    use std::sync::Arc;

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{}", l).unwrap();
        }
        f
    }

    #[tokio::test]
    async fn imports_and_reports_bad_lines() {
        let file = write_lines(&[
            r#"{"slug":"bgh-1","court_name":"Bundesgerichtshof","date":"2020-01-02","content":"<p>Kündigung.</p>"}"#,
            "",
            "not json",
            r#"{"slug":"","court_name":"Amtsgericht Köln"}"#,
            r#"{"slug":"ag-2","court_name":"Amtsgericht Köln","date":"1.2.2019"}"#,
        ]);
        let o = SearchOrchestrator::new(Arc::new(InMemoryStore::new()), Config::default());

        let report = import_jsonl(&o, file.path(), None, false).await.unwrap();
        assert_eq!(report.read, 4);
        assert_eq!(report.upserted, 2);
        assert_eq!(
            report.skipped.iter().map(|s| s.line).collect::<Vec<_>>(),
            vec![3, 4]
        );

        let again = import_jsonl(&o, file.path(), None, false).await.unwrap();
        assert_eq!(again.upserted, 2);
        assert_eq!(o.corpus_stats().await.unwrap().total_cases, 2);
    }

    #[tokio::test]
    async fn dry_run_and_limit() {
        let file = write_lines(&[
            r#"{"slug":"a","court_name":"Bundesgerichtshof"}"#,
            r#"{"slug":"b","court_name":"Bundesgerichtshof"}"#,
        ]);
        let o = SearchOrchestrator::new(Arc::new(InMemoryStore::new()), Config::default());

        let report = import_jsonl(&o, file.path(), Some(1), true).await.unwrap();
        assert_eq!(report.read, 1);
        assert_eq!(report.upserted, 0);
        assert_eq!(o.corpus_stats().await.unwrap().total_cases, 0);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let o = SearchOrchestrator::new(Arc::new(InMemoryStore::new()), Config::default());
        let err = import_jsonl(&o, Path::new("/nonexistent/cases.jsonl"), None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open import file"));
    }
}
