// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recall - semantic memory for conversational agents.
//!
//! This is the operator binary: it backfills stored chat sessions, searches
//! memory, feeds documents to a specialist, and looks up relations.

mod backfill;
mod feed;
mod search;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use recall_config::RecallConfig;
use recall_core::RecallError;
use recall_memory::{MemoryEngine, SearchFilter};
use recall_openai::{OpenAiEmbedder, OpenAiProvider};
use tracing::debug;

/// Recall - semantic memory for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "recall", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Index stored chat sessions into memory.
    Backfill {
        /// Directory holding session JSON files.
        sessions_dir: PathBuf,
        /// Also extract and consolidate knowledge from every turn.
        #[arg(long)]
        extract: bool,
        /// Count what would be indexed without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Search conversations and knowledge.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// One of: all, conversations, knowledge.
        #[arg(long, default_value = "all")]
        filter: SearchFilter,
        /// Search a specialist's knowledge, backfilled with global facts.
        #[arg(long)]
        specialist: Option<String>,
    },
    /// Extract facts from a document into a specialist's memory.
    Feed {
        file: PathBuf,
        #[arg(long)]
        specialist: String,
        /// Kind of source, e.g. whatsapp_chat, pdf, email, notes.
        #[arg(long, default_value = "document")]
        source_type: String,
        /// Defaults to the file name.
        #[arg(long)]
        source_name: Option<String>,
        /// When the source was produced (ISO 8601).
        #[arg(long)]
        source_date: Option<String>,
        /// Who wrote the content.
        #[arg(long)]
        source_person: Option<String>,
        /// Category for facts the model leaves uncategorized.
        #[arg(long, default_value = "contextual")]
        category: String,
    },
    /// Show relations mentioning an entity.
    Relations {
        entity: String,
        #[arg(long, default_value = "")]
        specialist: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => recall_config::load_and_validate_path(path),
        None => recall_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            recall_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.workspace.log_level);
    recall_memory::metrics::register_metrics();

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("recall: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &RecallConfig) -> Result<(), RecallError> {
    let engine = open_engine(config).await?;
    let result = dispatch(command, &engine).await;
    engine.shutdown().await;
    result
}

async fn dispatch(command: Commands, engine: &MemoryEngine) -> Result<(), RecallError> {
    match command {
        Commands::Backfill {
            sessions_dir,
            extract,
            dry_run,
        } => backfill::run_backfill(engine, &sessions_dir, extract, dry_run).await,
        Commands::Search {
            query,
            limit,
            filter,
            specialist,
        } => {
            let output =
                search::run_search(engine, &query, limit, filter, specialist.as_deref()).await?;
            println!("{output}");
            Ok(())
        }
        Commands::Feed {
            file,
            specialist,
            source_type,
            source_name,
            source_date,
            source_person,
            category,
        } => {
            let request = feed::FeedRequest {
                file,
                specialist,
                source_type,
                source_name,
                source_date,
                source_person,
                category,
            };
            let summary = feed::run_feed(engine, request).await?;
            println!("{summary}");
            Ok(())
        }
        Commands::Relations { entity, specialist } => {
            println!("{}", search::run_relations(engine, &entity, &specialist).await);
            Ok(())
        }
    }
}

async fn open_engine(config: &RecallConfig) -> Result<MemoryEngine, RecallError> {
    let embedder = Arc::new(OpenAiEmbedder::new(config)?);
    let provider = Arc::new(OpenAiProvider::new(config)?);
    debug!(workspace = %config.workspace.path, "opening memory engine");
    MemoryEngine::from_config(config, embedder, provider).await
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("recall={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_defaults() {
        let cli = Cli::try_parse_from(["recall", "search", "where does the user live"]).unwrap();
        match cli.command {
            Commands::Search {
                query,
                limit,
                filter,
                specialist,
            } => {
                assert_eq!(query, "where does the user live");
                assert_eq!(limit, 5);
                assert_eq!(filter, SearchFilter::All);
                assert!(specialist.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_rejects_unknown_filter() {
        let err = Cli::try_parse_from(["recall", "search", "q", "--filter", "emails"]).unwrap_err();
        assert!(err.to_string().contains("unknown filter"));
    }

    #[test]
    fn feed_requires_specialist() {
        assert!(Cli::try_parse_from(["recall", "feed", "notes.txt"]).is_err());

        let cli = Cli::try_parse_from([
            "recall",
            "feed",
            "notes.txt",
            "--specialist",
            "events",
            "--source-type",
            "whatsapp_chat",
        ])
        .unwrap();
        match cli.command {
            Commands::Feed {
                specialist,
                source_type,
                category,
                ..
            } => {
                assert_eq!(specialist, "events");
                assert_eq!(source_type, "whatsapp_chat");
                assert_eq!(category, "contextual");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn backfill_flags_and_global_config() {
        let cli = Cli::try_parse_from([
            "recall",
            "backfill",
            "/var/lib/sessions",
            "--dry-run",
            "--config",
            "/etc/recall/recall.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/recall/recall.toml")));
        match cli.command {
            Commands::Backfill {
                sessions_dir,
                extract,
                dry_run,
            } => {
                assert_eq!(sessions_dir, PathBuf::from("/var/lib/sessions"));
                assert!(!extract);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = recall_config::load_and_validate_str("").expect("default config should be valid");
        assert!(config.memory.enabled);
    }
}
