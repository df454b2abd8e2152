use crate::record::{KeyOf, Record};
use async_trait::async_trait;
use common::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deduplicating destination of a sync
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Insert records whose key is not stored yet; stored rows are left
    /// untouched. Returns the number of rows inserted.
    async fn upsert_ignoring_duplicates(&self, records: &[R]) -> Result<u64>;

    async fn read_all(&self) -> Result<Vec<R>>;
}

/// In-process store, keyed and ordered by primary key
pub struct MemoryStore<R: Record> {
    rows: Mutex<BTreeMap<KeyOf<R>, R>>,
    write_calls: AtomicUsize,
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.lock();
            for record in records {
                rows.entry(record.key()).or_insert(record);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn get(&self, key: &KeyOf<R>) -> Option<R> {
        self.rows.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.rows.lock().values().cloned().collect()
    }

    /// Number of `upsert_ignoring_duplicates` calls received
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn upsert_ignoring_duplicates(&self, records: &[R]) -> Result<u64> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock();
        let mut inserted = 0;
        for record in records {
            if let std::collections::btree_map::Entry::Vacant(slot) = rows.entry(record.key()) {
                slot.insert(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn read_all(&self) -> Result<Vec<R>> {
        Ok(self.snapshot())
    }
}
