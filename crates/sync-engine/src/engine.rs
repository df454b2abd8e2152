use crate::merge::{dedup_by_key, fresh_only};
use crate::record::{Cursor, Direction, KeyOf, Page, PageOrder, Record};
use crate::source::{FetchError, PageSource};
use crate::store::RecordStore;
use common::config::SyncSettings;
use common::utils::calculate_backoff_duration;
use common::{Error, Result};
use metrics::{counter, histogram};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Incremental fetch-and-merge driver.
///
/// Holds only its pacing policy; every run keeps its accumulators local, so
/// one engine serves any number of sources one after another.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    settings: SyncSettings,
}

/// Outcome of one sync run. The caller persists `watermark`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport<K> {
    pub previous_watermark: Option<K>,
    pub watermark: Option<K>,
    pub pages: u32,
    /// Records returned by the source, before deduplication
    pub fetched: usize,
    /// Rows the store actually inserted
    pub written: u64,
    pub rate_limit_waits: u32,
    pub transient_retries: u32,
    /// Total time spent sleeping (pacing, rate limits, backoff)
    pub paused: Duration,
    /// The walk stopped early after transient failures
    pub truncated: bool,
}

impl<K> SyncReport<K> {
    pub fn advanced(&self) -> bool
    where
        K: PartialEq,
    {
        self.watermark != self.previous_watermark
    }
}

/// Records gathered by a fetch loop, not yet written anywhere
#[derive(Debug, Clone)]
pub struct Collected<R> {
    pub records: Vec<R>,
    pub pages: u32,
    pub rate_limit_waits: u32,
    pub transient_retries: u32,
    pub paused: Duration,
    pub truncated: bool,
}

impl<R> Collected<R> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            pages: 0,
            rate_limit_waits: 0,
            transient_retries: 0,
            paused: Duration::ZERO,
            truncated: false,
        }
    }
}

/// A fetch loop stopped by a fatal error, with whatever it had gathered
#[derive(Debug)]
pub struct Aborted<R> {
    pub error: Error,
    pub collected: Vec<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// Hand everything to the store's ignore-on-conflict upsert
    Upsert,
    /// Read the stored rows first and write only unseen keys
    ReadCompare,
}

enum Stop {
    RetriesExhausted(String),
    Fatal(Error),
}

impl SyncEngine {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Fetch everything beyond `watermark` and upsert it into `store`
    pub async fn sync<S, T>(
        &self,
        source: &S,
        store: &T,
        watermark: Option<KeyOf<S::Record>>,
    ) -> Result<SyncReport<KeyOf<S::Record>>>
    where
        S: PageSource + ?Sized,
        T: RecordStore<S::Record> + ?Sized,
    {
        self.run(source, store, watermark, MergeMode::Upsert).await
    }

    /// Like `sync`, but compares against the stored rows in memory first
    pub async fn sync_merged<S, T>(
        &self,
        source: &S,
        store: &T,
        watermark: Option<KeyOf<S::Record>>,
    ) -> Result<SyncReport<KeyOf<S::Record>>>
    where
        S: PageSource + ?Sized,
        T: RecordStore<S::Record> + ?Sized,
    {
        self.run(source, store, watermark, MergeMode::ReadCompare).await
    }

    async fn run<S, T>(
        &self,
        source: &S,
        store: &T,
        watermark: Option<KeyOf<S::Record>>,
        mode: MergeMode,
    ) -> Result<SyncReport<KeyOf<S::Record>>>
    where
        S: PageSource + ?Sized,
        T: RecordStore<S::Record> + ?Sized,
    {
        let started = Instant::now();
        let source_name = source.name().to_string();

        let collected = match self.collect(source, watermark.clone()).await {
            Ok(collected) => collected,
            Err(aborted) => {
                counter!("ingest_sync_failures_total", "source" => source_name.clone()).increment(1);
                warn!(
                    source = %source_name,
                    discarded = aborted.collected.len(),
                    error = %aborted.error,
                    "sync aborted, nothing written"
                );
                return Err(aborted.error);
            }
        };

        let next = next_watermark(
            source.direction(),
            source.order(),
            watermark.clone(),
            &collected.records,
            collected.truncated,
        );

        let fetched = collected.records.len();
        let mut records = dedup_by_key(collected.records);

        if mode == MergeMode::ReadCompare && !records.is_empty() {
            let existing = store.read_all().await?;
            records = fresh_only(&existing, records);
        }

        let written = if records.is_empty() {
            0
        } else {
            store.upsert_ignoring_duplicates(&records).await?
        };

        counter!("ingest_records_written_total", "source" => source_name.clone()).increment(written);
        histogram!("ingest_sync_duration_seconds", "source" => source_name.clone())
            .record(started.elapsed().as_secs_f64());

        let report = SyncReport {
            previous_watermark: watermark,
            watermark: next,
            pages: collected.pages,
            fetched,
            written,
            rate_limit_waits: collected.rate_limit_waits,
            transient_retries: collected.transient_retries,
            paused: collected.paused,
            truncated: collected.truncated,
        };

        info!(
            source = %source_name,
            pages = report.pages,
            fetched = report.fetched,
            written = report.written,
            truncated = report.truncated,
            previous = ?report.previous_watermark,
            watermark = ?report.watermark,
            "sync finished"
        );

        Ok(report)
    }

    /// Run the fetch loop only. Nothing is written.
    ///
    /// On a fatal error the records gathered so far come back with the error;
    /// deciding whether to keep them is up to the caller.
    pub async fn collect<S>(
        &self,
        source: &S,
        watermark: Option<KeyOf<S::Record>>,
    ) -> std::result::Result<Collected<S::Record>, Aborted<S::Record>>
    where
        S: PageSource + ?Sized,
    {
        let order = source.order();
        let mut cursor = Cursor::starting_at(watermark);
        let mut run = Collected::new();
        let mut pending = Duration::ZERO;
        let mut first_request = true;

        loop {
            let pause = if first_request {
                pending
            } else {
                pending.max(self.settings.request_interval())
            };
            pause_for(pause, &mut run).await;
            first_request = false;
            pending = Duration::ZERO;

            let page = match self.fetch_with_retry(source, &cursor, &mut run).await {
                Ok(page) => page,
                Err(Stop::RetriesExhausted(reason)) => {
                    warn!(
                        source = source.name(),
                        position = ?cursor.position,
                        reason = %reason,
                        "transient failures exhausted retries, truncating run"
                    );
                    run.truncated = true;
                    break;
                }
                Err(Stop::Fatal(error)) => {
                    return Err(Aborted {
                        error,
                        collected: run.records,
                    });
                }
            };

            run.pages += 1;
            counter!("ingest_pages_fetched_total", "source" => source.name().to_string()).increment(1);

            if let Some(quota) = page.quota {
                if quota.remaining <= self.settings.quota_floor {
                    info!(
                        source = source.name(),
                        remaining = quota.remaining,
                        wait_secs = quota.reset_after.as_secs(),
                        "call allowance nearly used, waiting for window reset"
                    );
                    pending = quota.reset_after;
                }
            }

            let Some(next) = order.page_extreme(page.records.iter().map(Record::key)) else {
                debug!(source = source.name(), pages = run.pages, "empty page, walk complete");
                break;
            };

            let progressed = cursor
                .position
                .as_ref()
                .map_or(true, |position| order.moves_past(&next, position));

            debug!(
                source = source.name(),
                records = page.records.len(),
                next = ?next,
                "page fetched"
            );
            run.records.extend(page.records);

            if page.reached_end {
                break;
            }
            if !progressed {
                warn!(
                    source = source.name(),
                    position = ?cursor.position,
                    "source did not move past the cursor, stopping walk"
                );
                break;
            }
            cursor.position = Some(next);
        }

        Ok(run)
    }

    async fn fetch_with_retry<S>(
        &self,
        source: &S,
        cursor: &Cursor<KeyOf<S::Record>>,
        run: &mut Collected<S::Record>,
    ) -> std::result::Result<Page<S::Record>, Stop>
    where
        S: PageSource + ?Sized,
    {
        let mut failures = 0u32;

        loop {
            match source.fetch_page(cursor).await {
                Ok(page) => return Ok(page),
                Err(FetchError::RateLimited { retry_after }) => {
                    run.rate_limit_waits += 1;
                    counter!("ingest_rate_limit_waits_total", "source" => source.name().to_string())
                        .increment(1);
                    info!(
                        source = source.name(),
                        wait_ms = retry_after.as_millis() as u64,
                        "rate limited, retrying same cursor after wait"
                    );
                    pause_for(retry_after, run).await;
                }
                Err(FetchError::Transient(reason)) => {
                    if failures >= self.settings.max_transient_retries {
                        return Err(Stop::RetriesExhausted(reason));
                    }
                    let backoff = calculate_backoff_duration(
                        failures,
                        self.settings.retry_base_ms,
                        self.settings.retry_max_ms,
                    );
                    failures += 1;
                    run.transient_retries += 1;
                    warn!(
                        source = source.name(),
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = %reason,
                        "transient failure, retrying"
                    );
                    pause_for(backoff, run).await;
                }
                Err(FetchError::Fatal(error)) => return Err(Stop::Fatal(error)),
            }
        }
    }
}

async fn pause_for<R>(duration: Duration, run: &mut Collected<R>) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
    run.paused += duration;
}

/// Watermark to persist after a run.
///
/// A truncated walk that started away from the watermark left a gap right
/// behind it, so the watermark must stay put until a later run closes it.
fn next_watermark<R: Record>(
    direction: Direction,
    order: PageOrder,
    previous: Option<KeyOf<R>>,
    collected: &[R],
    truncated: bool,
) -> Option<KeyOf<R>> {
    if truncated && !direction.walks_away_from_watermark(order) {
        return previous;
    }
    let observed = direction.extreme(collected.iter().map(Record::key));
    direction.furthest(previous, observed)
}
