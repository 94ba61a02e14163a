//! # German Legal Search
//!
//! Ranked full-text search and related-case discovery over a corpus of
//! German court decisions stored in SQLite.
//!
//! A query (free text plus structured filters) is compiled into an FTS5
//! expression, executed against the corpus, re-ranked with field, phrase,
//! recency and court-authority boosts, and returned with highlighted
//! snippets. Repeated queries are served from a bounded TTL cache. Related
//! cases are found through shared citations and lexical overlap.
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────────────┐
//!   request ───▶ │ SearchOrchestrator │──▶ AdaptiveCache (query / related / stats)
//!                └─────────┬──────────┘
//!          ┌───────────────┼──────────────┬──────────────────┐
//!          ▼              ▼               ▼                  ▼
//!    ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌───────────────────┐
//!    │ compiler │   │  Store   │   │   Ranker    │   │ SimilarityMatcher │
//!    │ (FTS5)   │   │ SQLite / │   │ boosts +    │   │ citations +       │
//!    └──────────┘   │ memory   │   │ snippets    │   │ term sketches     │
//!                   └──────────┘   └─────────────┘   └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gls init                                  # create database
//! gls import decisions.jsonl                # load case records
//! gls search "Kündigung Eigenbedarf" --filter legal_area=Mietrecht
//! gls related 42                            # cases related to case 42
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Cases, queries, results, statistics |
//! | [`text`] | HTML cleaning, Leitsatz and statute-reference extraction, dates |
//! | [`compiler`] | Query text and filters to FTS5 expressions |
//! | [`ranker`] | Score normalization, boosts, snippets |
//! | [`cache`] | Bounded LRU cache with TTL expiry |
//! | [`similarity`] | Related cases by citations and lexical overlap |
//! | [`store`] | Storage trait and in-memory backend |
//! | [`sqlite_store`] | SQLite/FTS5 backend |
//! | [`orchestrator`] | Request coordination |
//! | [`db`] | Database connection |
//! | [`schema`] | Table creation and startup checks |
//! | [`error`] | Error types returned to callers |
//! | [`logging`] | Subscriber setup for the CLI |
//! | [`import`], [`search`], [`get`], [`stats`] | CLI commands |

pub mod cache;
pub mod compiler;
pub mod config;
pub mod db;
pub mod error;
pub mod get;
pub mod import;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod ranker;
pub mod schema;
pub mod search;
pub mod similarity;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod text;
