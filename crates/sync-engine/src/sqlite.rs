use crate::store::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{DailyBar, GroupName, Result, Symbol, Tweet};
use sqlx::SqlitePool;
use tracing::{debug, info};

const RAW_TWEETS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS raw_tweets (
        group_name TEXT NOT NULL,
        id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        full_text TEXT NOT NULL,
        replied_to_id INTEGER,
        retweeted_id INTEGER,
        processed INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (group_name, id)
    )
"#;

const DAILY_BARS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS daily_bars (
        symbol TEXT NOT NULL,
        day TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        adjusted_close REAL NOT NULL,
        volume INTEGER NOT NULL,
        dividend_amount REAL NOT NULL,
        split_coefficient REAL NOT NULL,
        PRIMARY KEY (symbol, day)
    )
"#;

/// Create the raw sync target tables if they don't exist yet
pub async fn install_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(RAW_TWEETS_TABLE).execute(pool).await?;
    sqlx::query(DAILY_BARS_TABLE).execute(pool).await?;

    info!("Raw tables ready");
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct RawTweetRow {
    id: i64,
    user_name: String,
    created_at: DateTime<Utc>,
    full_text: String,
    replied_to_id: Option<i64>,
    retweeted_id: Option<i64>,
}

impl From<RawTweetRow> for Tweet {
    fn from(row: RawTweetRow) -> Self {
        Tweet {
            id: row.id,
            user: row.user_name,
            created_at: row.created_at,
            full_text: row.full_text,
            replied_to_id: row.replied_to_id,
            retweeted_id: row.retweeted_id,
        }
    }
}

/// Raw posts of one group
#[derive(Clone)]
pub struct SqliteTweetStore {
    pool: SqlitePool,
    group: GroupName,
}

impl SqliteTweetStore {
    pub fn new(pool: SqlitePool, group: GroupName) -> Self {
        Self { pool, group }
    }

    pub fn group(&self) -> &GroupName {
        &self.group
    }

    /// Highest stored post id of the group
    pub async fn max_id(&self) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM raw_tweets WHERE group_name = ?")
            .bind(self.group.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Posts not handled by a cleanse pass yet, oldest first
    pub async fn unprocessed(&self) -> Result<Vec<Tweet>> {
        self.select("AND processed = 0").await
    }

    pub async fn mark_processed(&self, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE raw_tweets SET processed = 1 WHERE group_name = ? AND id = ?")
                .bind(self.group.as_str())
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Replies to any of `parents` that an earlier cleanse pass already handled
    pub async fn processed_replies_to(&self, parents: &[i64]) -> Result<Vec<Tweet>> {
        let mut replies = Vec::new();
        for parent in parents {
            let rows = sqlx::query_as::<_, RawTweetRow>(
                "SELECT id, user_name, created_at, full_text, replied_to_id, retweeted_id \
                 FROM raw_tweets \
                 WHERE group_name = ? AND processed = 1 AND retweeted_id IS NULL AND replied_to_id = ? \
                 ORDER BY id",
            )
            .bind(self.group.as_str())
            .bind(*parent)
            .fetch_all(&self.pool)
            .await?;
            replies.extend(rows.into_iter().map(Tweet::from));
        }
        Ok(replies)
    }

    /// Flag every post of the group as unprocessed again
    pub async fn reset_processed(&self) -> Result<u64> {
        let done = sqlx::query("UPDATE raw_tweets SET processed = 0 WHERE group_name = ?")
            .bind(self.group.as_str())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn select(&self, filter: &str) -> Result<Vec<Tweet>> {
        let sql = format!(
            "SELECT id, user_name, created_at, full_text, replied_to_id, retweeted_id \
             FROM raw_tweets WHERE group_name = ? {} ORDER BY id",
            filter
        );
        let rows = sqlx::query_as::<_, RawTweetRow>(&sql)
            .bind(self.group.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Tweet::from).collect())
    }
}

#[async_trait]
impl RecordStore<Tweet> for SqliteTweetStore {
    async fn upsert_ignoring_duplicates(&self, records: &[Tweet]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for tweet in records {
            let done = sqlx::query(
                "INSERT OR IGNORE INTO raw_tweets \
                 (group_name, id, user_name, created_at, full_text, replied_to_id, retweeted_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(self.group.as_str())
            .bind(tweet.id)
            .bind(&tweet.user)
            .bind(tweet.created_at)
            .bind(&tweet.full_text)
            .bind(tweet.replied_to_id)
            .bind(tweet.retweeted_id)
            .execute(&mut *tx)
            .await?;
            inserted += done.rows_affected();
        }

        tx.commit().await?;
        debug!(group = %self.group, offered = records.len(), inserted, "raw tweets stored");
        Ok(inserted)
    }

    async fn read_all(&self) -> Result<Vec<Tweet>> {
        self.select("").await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BarRow {
    symbol: String,
    day: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: f64,
    volume: i64,
    dividend_amount: f64,
    split_coefficient: f64,
}

impl From<BarRow> for DailyBar {
    fn from(row: BarRow) -> Self {
        DailyBar {
            symbol: row.symbol,
            day: row.day,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adjusted_close: row.adjusted_close,
            volume: row.volume,
            dividend_amount: row.dividend_amount,
            split_coefficient: row.split_coefficient,
        }
    }
}

/// Daily bars of one ticker symbol
#[derive(Clone)]
pub struct SqliteBarStore {
    pool: SqlitePool,
    symbol: Symbol,
}

impl SqliteBarStore {
    pub fn new(pool: SqlitePool, symbol: Symbol) -> Self {
        Self { pool, symbol }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Most recent stored trading day, the symbol's watermark
    pub async fn latest_day(&self) -> Result<Option<NaiveDate>> {
        let row: (Option<NaiveDate>,) = sqlx::query_as("SELECT MAX(day) FROM daily_bars WHERE symbol = ?")
            .bind(self.symbol.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl RecordStore<DailyBar> for SqliteBarStore {
    async fn upsert_ignoring_duplicates(&self, records: &[DailyBar]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for bar in records {
            let done = sqlx::query(
                "INSERT OR IGNORE INTO daily_bars \
                 (symbol, day, open, high, low, close, adjusted_close, volume, dividend_amount, split_coefficient) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(self.symbol.as_str())
            .bind(bar.day)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.adjusted_close)
            .bind(bar.volume)
            .bind(bar.dividend_amount)
            .bind(bar.split_coefficient)
            .execute(&mut *tx)
            .await?;
            inserted += done.rows_affected();
        }

        tx.commit().await?;
        debug!(symbol = %self.symbol, offered = records.len(), inserted, "daily bars stored");
        Ok(inserted)
    }

    async fn read_all(&self) -> Result<Vec<DailyBar>> {
        let rows = sqlx::query_as::<_, BarRow>(
            "SELECT symbol, day, open, high, low, close, adjusted_close, volume, dividend_amount, split_coefficient \
             FROM daily_bars WHERE symbol = ? ORDER BY day",
        )
        .bind(self.symbol.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DailyBar::from).collect())
    }
}
