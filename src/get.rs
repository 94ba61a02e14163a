//! Case retrieval by id or slug for `gls get`.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::models::{Case, CaseSummary};
use crate::orchestrator::SearchOrchestrator;
use crate::store::Store;

/// Case response: the summary fields plus the cleaned text and citations.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResponse {
    #[serde(flatten)]
    pub summary: CaseSummary,
    pub jurisdiction: Option<String>,
    pub content_length: usize,
    pub content: String,
    pub citations: Vec<String>,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

impl CaseResponse {
    pub fn from_case(case: Case, leitsatz_max_chars: usize) -> Self {
        Self {
            summary: case.summary(leitsatz_max_chars),
            jurisdiction: case.jurisdiction,
            content_length: case.content_length,
            content: case.content_clean,
            citations: case.citations,
            created_at: format_ts_iso(case.created_at),
            updated_at: format_ts_iso(case.updated_at),
        }
    }
}

/// Look a case up by numeric id, falling back to the slug.
pub async fn get_case<S: Store>(orchestrator: &SearchOrchestrator<S>, key: &str) -> Result<Case> {
    if let Ok(id) = key.trim().parse::<i64>() {
        return Ok(orchestrator.get_case(id).await?);
    }
    match orchestrator.get_case_by_slug(key.trim()).await? {
        Some(case) => Ok(case),
        None => bail!("case not found: {}", key),
    }
}

/// CLI entry point: fetch and print.
pub async fn run_get<S: Store>(
    orchestrator: &SearchOrchestrator<S>,
    key: &str,
    json: bool,
) -> Result<()> {
    let case = get_case(orchestrator, key).await?;
    let resp = CaseResponse::from_case(case, orchestrator.config().search.leitsatz_max_chars);

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    let s = &resp.summary;
    println!("--- Case ---");
    println!("id:            {}", s.id);
    println!("slug:          {}", s.slug);
    println!("court:         {} ({})", s.court_name, s.court_level);
    if let Some(j) = &resp.jurisdiction {
        println!("jurisdiction:  {}", j);
    }
    if let Some(fnr) = &s.file_number {
        println!("file_number:   {}", fnr);
    }
    if let Some(ecli) = &s.ecli {
        println!("ecli:          {}", ecli);
    }
    if let Some(date) = s.decision_date {
        println!("date:          {}", date);
    } else if let Some(year) = s.year {
        println!("year:          {}", year);
    }
    if let Some(area) = &s.legal_area {
        println!("legal_area:    {}", area);
    }
    if let Some(t) = &s.decision_type {
        println!("type:          {}", t);
    }
    println!("url:           {}", s.url);
    println!("updated_at:    {}", resp.updated_at);
    println!();

    if let Some(ls) = &s.leitsatz {
        println!("--- Leitsatz ---");
        println!("{}", ls);
        println!();
    }

    println!("--- Text ({} chars) ---", resp.content_length);
    println!("{}", resp.content);
    println!();

    println!("--- Citations ({}) ---", resp.citations.len());
    for c in &resp.citations {
        println!("{}", c);
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::NewCase;
    use std::sync::Arc;

    #[tokio::test]
    async fn lookup_by_id_or_slug() {
        let store = crate::store::memory::InMemoryStore::new();
        store
            .upsert_case(&NewCase {
                slug: "bgh-2020-1".into(),
                court_name: "Bundesgerichtshof".into(),
                content: Some("Leitsatz: Der Mieter haftet. Gründe folgen.".into()),
                ..NewCase::default()
            })
            .await
            .unwrap();
        let o = SearchOrchestrator::new(Arc::new(store), Config::default());

        assert_eq!(get_case(&o, "1").await.unwrap().slug, "bgh-2020-1");
        assert_eq!(get_case(&o, " bgh-2020-1 ").await.unwrap().id, 1);
        assert!(get_case(&o, "missing").await.is_err());
        assert!(get_case(&o, "7").await.is_err());

        let resp = CaseResponse::from_case(get_case(&o, "1").await.unwrap(), 200);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["slug"], "bgh-2020-1");
        assert!(v.get("content").is_some());
    }

    #[test]
    fn iso_timestamps() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
