use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;

/// Name of one tracked search group within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupName(pub String);

impl GroupName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GroupName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticker symbol, upper-cased and restricted to `[A-Z0-9.-]{1,12}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let symbol = raw.trim().to_uppercase();
        let valid = !symbol.is_empty()
            && symbol.len() <= 12
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

        if valid {
            Ok(Self(symbol))
        } else {
            Err(crate::Error::Config(format!("invalid symbol: {:?}", raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A post as fetched from the search API, before cleansing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: i64,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub full_text: String,
    pub replied_to_id: Option<i64>,
    pub retweeted_id: Option<i64>,
}

impl Tweet {
    /// Neither a reply nor a retweet
    pub fn is_original(&self) -> bool {
        self.replied_to_id.is_none() && self.retweeted_id.is_none()
    }
}

/// A tweet as stored for analysis: replies carry their parent's text,
/// originals carry their retweet count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleansedTweet {
    pub id: i64,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub day: NaiveDate,
    pub full_text: String,
    pub retweets: i64,
    pub sentiment: Option<f64>,
}

/// One trading day of adjusted prices for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub symbol: String,
    pub day: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: i64,
    pub dividend_amount: f64,
    pub split_coefficient: f64,
}

/// Aggregated sentiment of one group on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub day: NaiveDate,
    pub group: GroupName,
    pub mean_sentiment: f64,
    pub record_count: i64,
}

/// Which raw records the cleanse and sentiment stages process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadType {
    /// Only raw records not processed by an earlier run
    Delta,
    /// Rebuild every derived table from all raw records
    Full,
}

impl FromStr for LoadType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delta" => Ok(LoadType::Delta),
            "full" => Ok(LoadType::Full),
            other => Err(format!("unknown load type: {}", other)),
        }
    }
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadType::Delta => write!(f, "DELTA"),
            LoadType::Full => write!(f, "FULL"),
        }
    }
}
