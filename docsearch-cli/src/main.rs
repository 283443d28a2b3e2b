mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::DocumentSource;
use docsearch::config::{default_config_path, Config};
use docsearch::SearchEngineService;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docsearch")]
#[command(about = "docsearch CLI - query and administer Elasticsearch document indices")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.docsearch/config.toml)
    #[arg(short, long, env = "DOCSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter, overrides the configured level (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: "pretty" or "json"
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Free-text search, best matches first
    Search {
        index: String,

        /// Query string (Lucene syntax); empty matches everything
        #[arg(default_value = "")]
        query: String,

        /// Restrict to these document ids (comma-separated)
        #[arg(long)]
        ids: Option<String>,
    },

    /// Aggregation counts without hits
    Cover {
        index: String,

        /// Aggregation properties as key=value (e.g. age.type=stats); repeatable
        #[arg(short, long = "agg", value_name = "KEY=VALUE")]
        aggs: Vec<String>,

        /// Query string narrowing the counted documents
        #[arg(short, long, default_value = "")]
        query: String,
    },

    /// Count matching documents
    Count {
        index: String,

        #[arg(default_value = "")]
        query: String,
    },

    /// Suggest cleaned values of a localized field
    Suggest {
        index: String,

        /// Text to complete
        text: String,

        /// Field pattern, `{locale}` is substituted
        #[arg(short, long, default_value = "name.{locale}.analyzed")]
        field: String,

        #[arg(short, long, default_value = "en")]
        locale: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Fetch one document by id
    Get { index: String, id: String },

    /// Check whether an index exists
    Exists { index: String },

    /// Delete an index
    Drop { index: String },

    /// Drop an index and rebuild it from JSONL documents
    Reindex {
        index: String,

        /// JSONL input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Document member holding the id
        #[arg(long, default_value = "id")]
        id_field: String,

        /// Parent id used as routing for every document
        #[arg(long)]
        parent: Option<String>,
    },
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.log_format.as_deref().unwrap_or(&config.logging.format),
    );
    tracing::debug!("Config file: {}", config_path.display());

    let service = SearchEngineService::from_config(config)?;

    match cli.command {
        Commands::Search { index, query, ids } => {
            commands::run_search(&service, &index, &query, ids.as_deref()).await?;
        }
        Commands::Cover { index, aggs, query } => {
            commands::run_cover(&service, &index, &query, &aggs).await?;
        }
        Commands::Count { index, query } => {
            commands::run_count(&service, &index, &query).await?;
        }
        Commands::Suggest {
            index,
            text,
            field,
            locale,
            limit,
        } => {
            commands::run_suggest(&service, &index, &text, &field, &locale, limit).await?;
        }
        Commands::Get { index, id } => {
            commands::run_get(&service, &index, &id).await?;
        }
        Commands::Exists { index } => {
            commands::run_exists(&service, &index).await?;
        }
        Commands::Drop { index } => {
            commands::run_drop(&service, &index).await?;
        }
        Commands::Reindex {
            index,
            input,
            id_field,
            parent,
        } => {
            let source = match input {
                Some(path) => DocumentSource::FromFile(path),
                None => DocumentSource::FromStdin,
            };
            commands::run_reindex(&service, &index, source, &id_field, parent.as_deref()).await?;
        }
    }

    Ok(())
}
