mod cleanse;
mod commands;
mod config;
mod http;
mod metrics;
mod sentiment;
mod stock_client;
mod stock_sync;
mod storage;
mod tweet_sync;
mod twitter_client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::LoadType;
use std::path::PathBuf;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Incremental tweet and daily stock price ingest
#[derive(Parser)]
#[command(name = "ingest-service")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file, layered under INGEST__* variables
    #[arg(long, default_value = "ingest.toml")]
    config: PathBuf,

    /// Database URL, overrides database.url
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download new tweets per group, then cleanse and score them
    Tweets {
        /// Project query file holding the groups and their watermarks
        query_file: PathBuf,

        /// DELTA processes new raw tweets only, FULL rebuilds derived tables
        #[arg(long, default_value_t = LoadType::Delta)]
        load_type: LoadType,

        /// Reprocess already downloaded tweets without calling the search API
        #[arg(long)]
        skip_download: bool,
    },

    /// Bring daily adjusted stock prices up to date
    Stocks {
        /// Ticker symbols; defaults to stocks.symbols from the configuration
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let mut config = config::Config::load(&cli.config)?;
    if let Some(url) = cli.database {
        config.database.url = url;
    }

    // Initialize tracing
    let (file_layer, _log_guard) = match &config.pipeline.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ingest-service.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest_service=info,sync_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    // Initialize metrics
    let metrics_handle = metrics::init_metrics()?;

    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("run", run_id = %run_id);

    let outcome = async {
        info!(config = %cli.config.display(), "Starting ingest run");
        match cli.command {
            Command::Tweets {
                query_file,
                load_type,
                skip_download,
            } => commands::run_tweets(&config, &query_file, load_type, skip_download).await,
            Command::Stocks { symbols } => commands::run_stocks(&config, &symbols).await,
        }
    }
    .instrument(span)
    .await;

    if let Some(path) = &config.pipeline.metrics_path {
        if let Err(e) = metrics::write_snapshot(&metrics_handle, path) {
            error!(path = %path.display(), error = %e, "Failed to write metrics snapshot");
        }
    }

    if let Err(e) = &outcome {
        error!(run_id = %run_id, "Ingest run failed: {:#}", e);
    }
    outcome
}
