use crate::record::{Cursor, Direction, KeyOf, Page, PageOrder, Record};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a page request failed, as far as the engine cares
#[derive(Error, Debug)]
pub enum FetchError {
    /// Call allowance exhausted; the same request may be repeated after the wait
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Upstream hiccup (5xx, timeout); the same request may be repeated
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Authentication failure, malformed response, rejected request
    #[error("fatal upstream failure: {0}")]
    Fatal(#[from] common::Error),
}

/// Paginated upstream API seen through the cursor protocol.
///
/// For `Direction::Forward` a source returns only records whose key is
/// beyond `cursor.watermark`. With `PageOrder::NewestFirst` it further
/// returns only keys below `cursor.position`, with `OldestFirst` only keys
/// above it. An empty page ends the walk.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Record: Record;

    /// Label used in logs and metrics
    fn name(&self) -> &str;

    fn order(&self) -> PageOrder {
        PageOrder::NewestFirst
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    async fn fetch_page(
        &self,
        cursor: &Cursor<KeyOf<Self::Record>>,
    ) -> Result<Page<Self::Record>, FetchError>;
}
