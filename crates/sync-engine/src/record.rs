use chrono::NaiveDate;
use common::{DailyBar, Tweet};
use std::fmt::Debug;
use std::time::Duration;

/// A row the engine can merge: opaque apart from its primary key
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Ord + Clone + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

pub type KeyOf<R> = <R as Record>::Key;

impl Record for Tweet {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Record for DailyBar {
    type Key = NaiveDate;

    fn key(&self) -> NaiveDate {
        self.day
    }
}

/// Order in which a source returns records inside one page and across pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
    /// Highest key first; the walk continues below the smallest key seen
    NewestFirst,
    /// Lowest key first; the walk continues above the largest key seen
    OldestFirst,
}

impl PageOrder {
    /// Key the next request continues from
    pub fn page_extreme<K: Ord>(&self, keys: impl Iterator<Item = K>) -> Option<K> {
        match self {
            PageOrder::NewestFirst => keys.min(),
            PageOrder::OldestFirst => keys.max(),
        }
    }

    /// True when `next` lies strictly beyond `position` in walk order
    pub fn moves_past<K: Ord>(&self, next: &K, position: &K) -> bool {
        match self {
            PageOrder::NewestFirst => next < position,
            PageOrder::OldestFirst => next > position,
        }
    }
}

/// Which way the watermark advances between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Watermark is the highest key synced; runs fetch newer records
    Forward,
    /// Watermark is the lowest key synced; runs backfill older records
    Backward,
}

impl Direction {
    pub fn extreme<K: Ord>(&self, keys: impl Iterator<Item = K>) -> Option<K> {
        match self {
            Direction::Forward => keys.max(),
            Direction::Backward => keys.min(),
        }
    }

    /// The more advanced of two optional watermarks
    pub fn furthest<K: Ord>(&self, a: Option<K>, b: Option<K>) -> Option<K> {
        match (a, b) {
            (Some(a), Some(b)) => match self {
                Direction::Forward => Some(a.max(b)),
                Direction::Backward => Some(a.min(b)),
            },
            (a, None) => a,
            (None, b) => b,
        }
    }

    /// Whether a walk in `order` starts at the watermark and moves away from it.
    ///
    /// Only such walks leave no gap behind the watermark when they stop early.
    pub fn walks_away_from_watermark(&self, order: PageOrder) -> bool {
        matches!(
            (self, order),
            (Direction::Forward, PageOrder::OldestFirst) | (Direction::Backward, PageOrder::NewestFirst)
        )
    }
}

/// Position handed to a source for one page request.
///
/// `watermark` is the exclusive bound from the previous run. `position` is
/// the exclusive bound reached by this run's walk, `None` on the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor<K> {
    pub watermark: Option<K>,
    pub position: Option<K>,
}

impl<K> Cursor<K> {
    pub fn starting_at(watermark: Option<K>) -> Self {
        Self {
            watermark,
            position: None,
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.position.is_none()
    }
}

/// Remaining call allowance reported alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub remaining: u32,
    pub reset_after: Duration,
}

/// One batch of records from one API call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// Set by sources that know no further page exists
    pub reached_end: bool,
    pub quota: Option<RateQuota>,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records,
            reached_end: false,
            quota: None,
        }
    }

    pub fn last(records: Vec<R>) -> Self {
        Self {
            records,
            reached_end: true,
            quota: None,
        }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    pub fn with_quota(mut self, quota: RateQuota) -> Self {
        self.quota = Some(quota);
        self
    }
}
