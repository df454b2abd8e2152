use crate::cleanse::Cleanser;
use crate::config::Config;
use crate::metrics::record_summary_rows;
use crate::sentiment::{SentimentAnnotator, VaderScorer};
use crate::stock_client::StockClient;
use crate::stock_sync::sync_symbols;
use crate::storage::{self, Storage};
use crate::tweet_sync::TweetSync;
use crate::twitter_client::{TweetSearchSource, TwitterClient};
use anyhow::{bail, Context, Result};
use common::{GroupName, LoadType, Symbol};
use std::path::Path;
use sync_engine::sqlite::SqliteTweetStore;
use sync_engine::{QueryFileStore, SyncEngine};
use tracing::{info, warn};

/// Download, cleanse and score the groups of one query file
pub async fn run_tweets(config: &Config, query_path: &Path, load_type: LoadType, skip_download: bool) -> Result<()> {
    let pool = storage::connect(&config.database).await?;
    let storage = Storage::new(pool.clone());
    storage.install_schema().await?;

    let watermarks = QueryFileStore::new(query_path);
    let query_file = watermarks
        .read()
        .await
        .with_context(|| format!("reading query file {}", query_path.display()))?;
    let groups: Vec<GroupName> = query_file.groups().map(|(group, _)| group).collect();
    info!(groups = groups.len(), %load_type, skip_download, "Query file loaded");

    let mut failed_groups = Vec::new();
    if skip_download {
        info!("Skipping download");
    } else {
        let client = TwitterClient::new(&config.twitter)?;
        let engine = SyncEngine::new(config.sync.clone());
        let params = query_file.search_params();

        let summary = TweetSync::new(&engine, &watermarks)
            .run(
                &query_file,
                |group, query| TweetSearchSource::new(client.clone(), group.clone(), query.query.clone(), params.clone()),
                |group| SqliteTweetStore::new(pool.clone(), group.clone()),
            )
            .await?;
        failed_groups = summary.failed;
    }

    let touched = Cleanser::new(storage.clone(), config.pipeline.day_time_zone)
        .run(&groups, load_type)
        .await?;

    let annotator = SentimentAnnotator::new(storage.clone(), Box::new(VaderScorer::new()));
    for group in &groups {
        let days = match load_type {
            LoadType::Full => None,
            LoadType::Delta => match touched.get(group) {
                Some(days) => Some(days),
                None => continue,
            },
        };
        let summaries = annotator.annotate(group, days).await?;
        record_summary_rows(group.as_str(), summaries.len());
    }

    if !failed_groups.is_empty() {
        for (group, reason) in &failed_groups {
            warn!(group = %group, reason = %reason, "group not downloaded");
        }
        bail!("{} of {} groups failed to download", failed_groups.len(), groups.len());
    }

    info!("Tweet run complete");
    Ok(())
}

/// Sync daily bars for the given symbols, or the configured ones
pub async fn run_stocks(config: &Config, requested: &[String]) -> Result<()> {
    let raw = if requested.is_empty() {
        config.stocks.symbols.as_slice()
    } else {
        requested
    };
    if raw.is_empty() {
        bail!("no symbols given and stocks.symbols is empty");
    }
    let symbols = raw
        .iter()
        .map(|s| Symbol::parse(s))
        .collect::<common::Result<Vec<_>>>()?;

    let pool = storage::connect(&config.database).await?;
    Storage::new(pool.clone()).install_schema().await?;

    let client = StockClient::new(&config.stocks)?;
    let engine = SyncEngine::new(config.sync.clone());
    let summary = sync_symbols(&engine, &client, &pool, &symbols).await?;

    let written: u64 = summary.synced.iter().map(|(_, report)| report.written).sum();
    info!(symbols = symbols.len(), written, failed = summary.failed.len(), "Stock run complete");

    if !summary.failed.is_empty() {
        let names: Vec<&str> = summary.failed.iter().map(|(symbol, _)| symbol.as_str()).collect();
        bail!("symbols failed: {}", names.join(", "));
    }
    Ok(())
}
