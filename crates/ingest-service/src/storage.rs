use chrono::{DateTime, NaiveDate, Utc};
use common::config::DatabaseConfig;
use common::{CleansedTweet, DailySummary, GroupName, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const DERIVED_TABLES: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS cleansed_tweets (
        group_name TEXT NOT NULL,
        id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        day TEXT NOT NULL,
        full_text TEXT NOT NULL,
        retweets INTEGER NOT NULL DEFAULT 0,
        sentiment REAL,
        PRIMARY KEY (group_name, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS original_tweets (
        id INTEGER PRIMARY KEY,
        user_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        day TEXT NOT NULL,
        full_text TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_summary (
        day TEXT NOT NULL,
        group_name TEXT NOT NULL,
        mean_sentiment REAL NOT NULL,
        record_count INTEGER NOT NULL,
        PRIMARY KEY (day, group_name)
    )
    "#,
];

/// Open the pool, creating the database file when missing
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .await?;

    info!(url = %config.url, "SQLite pool created");
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct CleansedRow {
    id: i64,
    user_name: String,
    created_at: DateTime<Utc>,
    day: NaiveDate,
    full_text: String,
    retweets: i64,
    sentiment: Option<f64>,
}

impl From<CleansedRow> for CleansedTweet {
    fn from(row: CleansedRow) -> Self {
        CleansedTweet {
            id: row.id,
            user: row.user_name,
            created_at: row.created_at,
            day: row.day,
            full_text: row.full_text,
            retweets: row.retweets,
            sentiment: row.sentiment,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    day: NaiveDate,
    group_name: String,
    mean_sentiment: f64,
    record_count: i64,
}

/// Derived tables built from the raw sync targets
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Raw and derived tables
    pub async fn install_schema(&self) -> Result<()> {
        sync_engine::sqlite::install_schema(&self.pool).await?;
        for table in DERIVED_TABLES {
            sqlx::query(table).execute(&self.pool).await?;
        }
        info!("Derived tables ready");
        Ok(())
    }

    /// Drop every derived row ahead of a full rebuild
    pub async fn clear_cleansed(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cleansed_tweets").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM original_tweets").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM daily_summary").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Write cleansed rows of a group, replacing rows with the same id
    pub async fn put_cleansed(&self, group: &GroupName, tweets: &[CleansedTweet]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tweet in tweets {
            sqlx::query(
                "INSERT OR REPLACE INTO cleansed_tweets \
                 (group_name, id, user_name, created_at, day, full_text, retweets, sentiment) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(group.as_str())
            .bind(tweet.id)
            .bind(&tweet.user)
            .bind(tweet.created_at)
            .bind(tweet.day)
            .bind(&tweet.full_text)
            .bind(tweet.retweets)
            .bind(tweet.sentiment)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn put_originals(&self, tweets: &[CleansedTweet]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tweet in tweets {
            sqlx::query(
                "INSERT OR REPLACE INTO original_tweets (id, user_name, created_at, day, full_text) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(tweet.id)
            .bind(&tweet.user)
            .bind(tweet.created_at)
            .bind(tweet.day)
            .bind(&tweet.full_text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn original_text(&self, id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT full_text FROM original_tweets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// Set every cleansed row's retweet count to the number of raw retweets
    /// of it in the same group
    pub async fn recount_retweets(&self, group: &GroupName) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE cleansed_tweets SET retweets = ( \
                 SELECT COUNT(*) FROM raw_tweets r \
                 WHERE r.group_name = cleansed_tweets.group_name AND r.retweeted_id = cleansed_tweets.id \
             ) WHERE group_name = ?",
        )
        .bind(group.as_str())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    pub async fn cleansed_days(&self, group: &GroupName) -> Result<Vec<NaiveDate>> {
        let rows: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT DISTINCT day FROM cleansed_tweets WHERE group_name = ? ORDER BY day")
                .bind(group.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn cleansed_on(&self, group: &GroupName, day: NaiveDate) -> Result<Vec<CleansedTweet>> {
        let rows = sqlx::query_as::<_, CleansedRow>(
            "SELECT id, user_name, created_at, day, full_text, retweets, sentiment \
             FROM cleansed_tweets WHERE group_name = ? AND day = ? ORDER BY id",
        )
        .bind(group.as_str())
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CleansedTweet::from).collect())
    }

    pub async fn set_sentiment(&self, group: &GroupName, scores: &[(i64, f64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, score) in scores {
            sqlx::query("UPDATE cleansed_tweets SET sentiment = ? WHERE group_name = ? AND id = ?")
                .bind(*score)
                .bind(group.as_str())
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert or overwrite the summary row of `(day, group)`
    pub async fn upsert_summary(&self, summary: &DailySummary) -> Result<()> {
        sqlx::query(
            "INSERT INTO daily_summary (day, group_name, mean_sentiment, record_count) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (day, group_name) DO UPDATE SET \
                 mean_sentiment = excluded.mean_sentiment, \
                 record_count = excluded.record_count",
        )
        .bind(summary.day)
        .bind(summary.group.as_str())
        .bind(summary.mean_sentiment)
        .bind(summary.record_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn summaries(&self) -> Result<Vec<DailySummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT day, group_name, mean_sentiment, record_count FROM daily_summary ORDER BY day, group_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DailySummary {
                day: row.day,
                group: GroupName::new(row.group_name),
                mean_sentiment: row.mean_sentiment,
                record_count: row.record_count,
            })
            .collect())
    }
}
