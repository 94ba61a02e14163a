//! Corpus statistics and maintenance for `gls stats` and `gls optimize`.
//!
//! Stats give a quick picture of what is indexed: case counts per legal
//! area, court and year, content length, and how many records carry an
//! ECLI, a decision date and a file number.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::CorpusStats;
use crate::orchestrator::SearchOrchestrator;
use crate::store::Store;

#[derive(Serialize)]
struct StatsOutput<'a> {
    corpus: &'a CorpusStats,
    database_bytes: u64,
    query_cache: CacheStats,
    related_cache: CacheStats,
}

/// Print corpus statistics. `db_path` is only used to report the file size.
pub async fn run_stats<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    db_path: &Path,
    json: bool,
) -> Result<()> {
    let stats = orchestrator.corpus_stats().await?;
    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        let out = StatsOutput {
            corpus: &stats,
            database_bytes: db_size,
            query_cache: orchestrator.cache_stats(),
            related_cache: orchestrator.related_cache_stats(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("German Legal Search — Corpus Stats");
    println!("==================================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Cases:       {}", stats.total_cases);
    println!("  Citations:   {}", stats.total_citations);
    println!(
        "  Length:      avg {:.0}, min {}, max {} chars",
        stats.content.avg_length, stats.content.min_length, stats.content.max_length
    );
    println!();
    println!("  Data quality:");
    for (label, count) in [
        ("ECLI", stats.quality.with_ecli),
        ("date", stats.quality.with_date),
        ("file number", stats.quality.with_file_number),
    ] {
        println!(
            "    with {:<12} {:>8} ({:.1}%)",
            label,
            count,
            stats.coverage(count)
        );
    }

    if !stats.legal_areas.is_empty() {
        println!();
        println!("  By legal area:");
        for a in &stats.legal_areas {
            println!("    {:<40} {:>8}", a.name, a.count);
        }
    }

    if !stats.courts.is_empty() {
        println!();
        println!("  Top courts:");
        for c in &stats.courts {
            println!("    {:<40} {:>8}", c.name, c.count);
        }
    }

    if !stats.years.is_empty() {
        println!();
        println!("  By year:");
        for y in &stats.years {
            println!("    {:<40} {:>8}", y.year, y.count);
        }
    }

    println!();
    Ok(())
}

pub async fn run_optimize<S: Store>(orchestrator: &SearchOrchestrator<S>, json: bool) -> Result<()> {
    let report = orchestrator.optimize().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("optimize");
    println!("  analyze: {}", if report.analyzed { "done" } else { "skipped" });
    println!(
        "  fts optimize: {}",
        if report.fts_optimized { "done" } else { "skipped" }
    );
    println!(
        "  vacuum: {} (freelist {:.1}%)",
        if report.vacuumed { "done" } else { "skipped" },
        report.freelist_ratio * 100.0
    );
    println!("ok");
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
