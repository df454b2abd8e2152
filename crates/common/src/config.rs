use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ingest.db".to_string(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

/// Search API credentials and endpoint.
///
/// Either `bearer_token` or the `app_key`/`app_secret` pair must be present
/// for the tweet path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com".to_string(),
            bearer_token: None,
            app_key: None,
            app_secret: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub symbols: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            api_key: None,
            symbols: Vec::new(),
            timeout_secs: 30,
        }
    }
}

/// Pacing and retry policy applied by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Pause before every request after the first one of a run.
    pub request_interval_ms: u64,
    /// When a page reports this many calls left or fewer, wait for the window reset.
    pub quota_floor: u32,
    pub max_transient_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl SyncSettings {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_interval_ms: 1500,
            quota_floor: 5,
            max_transient_retries: 3,
            retry_base_ms: 1000,
            retry_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IANA zone whose calendar day a tweet is counted in.
    pub day_time_zone: Tz,
    pub metrics_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            day_time_zone: Tz::America__Chicago,
            metrics_path: None,
            log_dir: None,
        }
    }
}
