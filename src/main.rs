//! # German Legal Search CLI (`gls`)
//!
//! ## Usage
//!
//! ```bash
//! gls --config ./config/gls.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gls init` | Create the SQLite database and its tables |
//! | `gls import <file.jsonl>` | Insert or refresh case records |
//! | `gls search "<query>"` | Ranked search with optional filters |
//! | `gls related <id>` | Cases related by citations and text |
//! | `gls get <id-or-slug>` | Print a full case |
//! | `gls suggest <partial>` | File-number and court completions |
//! | `gls stats` | Corpus statistics |
//! | `gls optimize` | ANALYZE, FTS optimize, VACUUM when fragmented |
//!
//! ## Examples
//!
//! ```bash
//! gls init
//! gls import ./data/cases.jsonl
//! gls search "fristlose Kündigung" --filter court=BGH --filter year_from=2015
//! gls search "" --filter legal_area=Arbeitsrecht --page 2
//! gls related 1234 --limit 5 --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use german_legal_search::config::{self, Config};
use german_legal_search::orchestrator::SearchOrchestrator;
use german_legal_search::sqlite_store::SqliteStore;
use german_legal_search::{get, import, logging, search, stats};

/// German Legal Search: ranked search over German court decisions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, defaults are used.
#[derive(Parser)]
#[command(
    name = "gls",
    about = "Ranked full-text and related-case search over German court decisions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist the built-in defaults apply.
    #[arg(long, global = true, default_value = "./config/gls.toml")]
    config: PathBuf,

    /// Override `[db].path` from the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and all tables. Safe to run repeatedly.
    Init,

    /// Import case records from a JSON Lines file.
    ///
    /// Records are upserted by slug. Malformed lines are skipped and listed.
    Import {
        /// Path to the `.jsonl` file.
        path: PathBuf,

        /// Maximum number of records to read.
        #[arg(long)]
        limit: Option<usize>,

        /// Validate without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the corpus.
    ///
    /// Quoted text is matched as a phrase; a trailing `*` matches a prefix.
    /// An empty query with filters lists matching cases, newest first.
    Search {
        /// The search query string.
        query: String,

        /// Filter as `key=value`. Keys: legal_area, court, year_from,
        /// year_to, decision_type, file_number, ecli, court_level.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Results per page (defaults to `[search].default_page_size`).
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// List cases related to a case.
    Related {
        /// Case id.
        id: i64,

        /// Maximum number of related cases.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a case by id or slug.
    Get {
        /// Numeric id or slug.
        id: String,
    },

    /// Suggest file numbers and court names containing the input.
    Suggest {
        partial: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show corpus statistics.
    Stats,

    /// Run database maintenance.
    Optimize,
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    if let Some(db) = cli.db {
        cfg.db.path = db;
        cfg.validate()?;
    }
    logging::init(&cfg.logging)?;

    if let Commands::Init = cli.command {
        let store = SqliteStore::create(&cfg.db).await?;
        store.close().await;
        println!("Database initialized at {}.", cfg.db.path.display());
        return Ok(());
    }

    let store = Arc::new(SqliteStore::open(&cfg.db).await?);
    let db_path = cfg.db.path.clone();
    let orchestrator = SearchOrchestrator::new(Arc::clone(&store), cfg);
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Import {
            path,
            limit,
            dry_run,
        } => import::run_import(&orchestrator, &path, limit, dry_run, json).await,
        Commands::Search {
            query,
            filters,
            page,
            page_size,
        } => search::run_search(&orchestrator, &query, &filters, page, page_size, json).await,
        Commands::Related { id, limit } => {
            search::run_related(&orchestrator, id, limit, json).await
        }
        Commands::Get { id } => get::run_get(&orchestrator, &id, json).await,
        Commands::Suggest { partial, limit } => {
            search::run_suggest(&orchestrator, &partial, limit, json).await
        }
        Commands::Stats => stats::run_stats(&orchestrator, &db_path, json).await,
        Commands::Optimize => stats::run_optimize(&orchestrator, json).await,
    };

    store.close().await;
    result
}
