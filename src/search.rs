//! `gls search`, `gls related` and `gls suggest`: run a request through the
//! orchestrator and print the result as text or JSON.

use anyhow::Result;

use crate::models::{CaseSummary, Query, QueryFilters};
use crate::orchestrator::SearchOrchestrator;
use crate::store::{Store, SuggestionKind};

fn headline(case: &CaseSummary) -> String {
    let date = case
        .decision_date
        .map(|d| d.format("%d.%m.%Y").to_string())
        .or_else(|| case.year.map(|y| y.to_string()))
        .unwrap_or_else(|| "undated".to_string());
    match &case.file_number {
        Some(fnr) => format!("{}, {} ({})", case.court_name, fnr, date),
        None => format!("{} ({})", case.court_name, date),
    }
}

/// Run a search. `filters` are `key=value` pairs as given on the command
/// line; unknown keys are rejected.
pub async fn run_search<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    text: &str,
    filters: &[(String, String)],
    page: usize,
    page_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let filters = QueryFilters::from_pairs(filters.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    let page_size = page_size.unwrap_or(orchestrator.config().search.default_page_size);
    let query = Query::new(text).with_filters(filters).page(page, page_size);

    let results = orchestrator.search(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.matches.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let offset = results.query.pagination.offset();
    for (i, m) in results.matches.iter().enumerate() {
        println!("{}. [{:.2}] {}", offset + i + 1, m.score, headline(&m.case));
        if let Some(area) = &m.case.legal_area {
            println!("    area: {}", area);
        }
        if let Some(ecli) = &m.case.ecli {
            println!("    ecli: {}", ecli);
        }
        if let Some(ls) = &m.case.leitsatz {
            println!("    leitsatz: {}", ls);
        }
        if !m.snippet.is_empty() {
            println!("    excerpt: \"{}\"", m.snippet.replace('\n', " ").trim());
        }
        println!("    url: {}", m.case.url);
        println!("    id: {}", m.case.id);
        println!();
    }
    println!(
        "{} of {} matches (page {}, {:.1} ms{})",
        results.matches.len(),
        results.total,
        results.query.pagination.page,
        results.elapsed.as_secs_f64() * 1000.0,
        if results.from_cache { ", cached" } else { "" }
    );
    Ok(())
}

pub async fn run_related<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    case_id: i64,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(orchestrator.config().similarity.default_limit);
    let links = orchestrator.related(case_id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&links)?);
        return Ok(());
    }

    if links.is_empty() {
        println!("No related cases.");
        return Ok(());
    }

    for (i, l) in links.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, l.strength, headline(&l.target));
        let mut basis = Vec::new();
        if l.basis.direct_citation {
            basis.push("direct citation".to_string());
        }
        if l.basis.shared_citations > 0 {
            basis.push(format!("{} shared citations", l.basis.shared_citations));
        }
        if l.basis.lexical_score > 0.0 {
            basis.push(format!("text overlap {:.2}", l.basis.lexical_score));
        }
        println!("    basis: {}", basis.join(", "));
        println!("    url: {}", l.target.url);
        println!("    id: {}", l.target_id);
        println!();
    }
    Ok(())
}

pub async fn run_suggest<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    partial: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let suggestions = orchestrator.suggest(partial, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }

    for s in &suggestions {
        let kind = match s.kind {
            SuggestionKind::FileNumber => "file number",
            SuggestionKind::Court => "court",
        };
        println!("{:<12} {}", kind, s.value);
    }
    Ok(())
}
