use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, GroupName, Result};
use protocol::QueryFile;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Persisted checkpoint of one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupWatermark {
    pub cursor: Option<i64>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Where per-group watermarks live between runs
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, group: &GroupName) -> Result<GroupWatermark>;

    /// Persist one group's checkpoint; other groups are left as they are
    async fn save(&self, group: &GroupName, watermark: &GroupWatermark) -> Result<()>;
}

/// Watermarks kept inside the project's query file
pub struct QueryFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl QueryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<QueryFile> {
        let data = tokio::fs::read(&self.path).await?;
        QueryFile::from_slice(&data)
    }

    /// Replace the file through a sibling temp file and a rename
    async fn write(&self, file: &QueryFile) -> Result<()> {
        let data = file.to_pretty_json()?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for QueryFileStore {
    async fn load(&self, group: &GroupName) -> Result<GroupWatermark> {
        let file = self.read().await?;
        let query = file
            .group(group)
            .ok_or_else(|| Error::Config(format!("group {} is not in {}", group, self.path.display())))?;

        Ok(GroupWatermark {
            cursor: query.max_record,
            last_update: query.last_update,
        })
    }

    async fn save(&self, group: &GroupName, watermark: &GroupWatermark) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut file = self.read().await?;
        let at = watermark.last_update.unwrap_or_else(common::utils::now);
        file.record_progress(group, watermark.cursor, at)?;
        self.write(&file).await?;

        debug!(group = %group, cursor = ?watermark.cursor, "watermark saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const QUERY_FILE: &str = r#"{
        "SearchParameters": {"count": 100, "tweet_mode": "extended", "lang": "en"},
        "GroupQueries": {
            "Company": {"Query": "$ACME OR #acme", "MaxRecord": 1000, "LastUpdate": "2018-10-05 12:00:00"},
            "Product": {"Query": "acme rocket", "MaxRecord": "", "LastUpdate": ""}
        }
    }"#;

    fn store_in(dir: &tempfile::TempDir) -> QueryFileStore {
        let path = dir.path().join("acme.json");
        std::fs::write(&path, QUERY_FILE).unwrap();
        QueryFileStore::new(path)
    }

    #[tokio::test]
    async fn test_load_reads_group_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let company = store.load(&GroupName::new("Company")).await.unwrap();
        assert_eq!(company.cursor, Some(1000));
        assert_eq!(
            company.last_update,
            Some(Utc.with_ymd_and_hms(2018, 10, 5, 12, 0, 0).unwrap())
        );

        let product = store.load(&GroupName::new("Product")).await.unwrap();
        assert_eq!(product, GroupWatermark::default());
    }

    #[tokio::test]
    async fn test_save_updates_only_that_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let at = Utc.with_ymd_and_hms(2018, 10, 6, 8, 30, 0).unwrap();

        store
            .save(
                &GroupName::new("Product"),
                &GroupWatermark {
                    cursor: Some(1050),
                    last_update: Some(at),
                },
            )
            .await
            .unwrap();

        let product = store.load(&GroupName::new("Product")).await.unwrap();
        assert_eq!(product.cursor, Some(1050));
        assert_eq!(product.last_update, Some(at));

        let company = store.load(&GroupName::new("Company")).await.unwrap();
        assert_eq!(company.cursor, Some(1000));

        let file = store.read().await.unwrap();
        assert_eq!(file.search_parameters["tweet_mode"], "extended");
        assert!(!dir.path().join("acme.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_unknown_group_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let err = store.load(&GroupName::new("Missing")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = store
            .save(&GroupName::new("Missing"), &GroupWatermark::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueryFileStore::new(dir.path().join("absent.json"));

        let err = store.load(&GroupName::new("Company")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
