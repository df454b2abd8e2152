use anyhow::Result;
use common::config::{DatabaseConfig, PipelineConfig, StockConfig, SyncSettings, TwitterConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub twitter: TwitterConfig,
    pub stocks: StockConfig,
    pub sync: SyncSettings,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Layer `INGEST__SECTION__KEY` environment variables over the optional
    /// TOML file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
