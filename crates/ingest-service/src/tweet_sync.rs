use crate::metrics::record_group_failure;
use common::utils::now;
use common::{GroupName, Result, Tweet};
use protocol::{GroupQuery, QueryFile};
use sync_engine::{GroupWatermark, PageSource, RecordStore, SyncEngine, SyncReport, WatermarkStore};
use tracing::{error, info, info_span, Instrument};

/// Result of downloading every group of a query file
#[derive(Debug, Default)]
pub struct TweetSyncSummary {
    pub synced: Vec<(GroupName, SyncReport<i64>)>,
    pub failed: Vec<(GroupName, String)>,
}

impl TweetSyncSummary {
    pub fn written(&self) -> u64 {
        self.synced.iter().map(|(_, report)| report.written).sum()
    }
}

/// Runs the engine once per group and checkpoints each group as it finishes
pub struct TweetSync<'a> {
    engine: &'a SyncEngine,
    watermarks: &'a dyn WatermarkStore,
}

impl<'a> TweetSync<'a> {
    pub fn new(engine: &'a SyncEngine, watermarks: &'a dyn WatermarkStore) -> Self {
        Self { engine, watermarks }
    }

    /// Sync every group of `file`.
    ///
    /// A failed group keeps its old watermark and the next group proceeds;
    /// only errors that would fail every group end the run early.
    pub async fn run<S, T>(
        &self,
        file: &QueryFile,
        mut source_for: impl FnMut(&GroupName, &GroupQuery) -> S,
        mut store_for: impl FnMut(&GroupName) -> T,
    ) -> Result<TweetSyncSummary>
    where
        S: PageSource<Record = Tweet>,
        T: RecordStore<Tweet>,
    {
        let mut summary = TweetSyncSummary::default();

        for (group, query) in file.groups() {
            let span = info_span!("group", group = %group);
            let source = source_for(&group, query);
            let store = store_for(&group);

            let outcome = self.sync_group(&group, &source, &store).instrument(span).await;
            match outcome {
                Ok(report) => summary.synced.push((group, report)),
                Err(e) if e.aborts_run() => {
                    error!(group = %group, error = %e, "aborting run");
                    record_group_failure(group.as_str(), "abort");
                    return Err(e);
                }
                Err(e) => {
                    error!(group = %group, error = %e, "group sync failed, continuing");
                    record_group_failure(group.as_str(), "upstream");
                    summary.failed.push((group, e.to_string()));
                }
            }
        }

        info!(
            synced = summary.synced.len(),
            failed = summary.failed.len(),
            written = summary.written(),
            "tweet download finished"
        );
        Ok(summary)
    }

    async fn sync_group<S, T>(&self, group: &GroupName, source: &S, store: &T) -> Result<SyncReport<i64>>
    where
        S: PageSource<Record = Tweet>,
        T: RecordStore<Tweet>,
    {
        let previous = self.watermarks.load(group).await?;
        let report = self.engine.sync(source, store, previous.cursor).await?;

        self.watermarks
            .save(
                group,
                &GroupWatermark {
                    cursor: report.watermark,
                    last_update: Some(now()),
                },
            )
            .await?;

        Ok(report)
    }
}
