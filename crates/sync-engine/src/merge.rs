use crate::record::{KeyOf, Record};
use std::collections::BTreeSet;

/// Drop later records whose key already appeared; first occurrence wins
pub fn dedup_by_key<R: Record>(records: Vec<R>) -> Vec<R> {
    let mut seen: BTreeSet<KeyOf<R>> = BTreeSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

/// Records of `incoming` whose key is absent from `existing`, deduplicated
pub fn fresh_only<R: Record>(existing: &[R], incoming: Vec<R>) -> Vec<R> {
    let mut seen: BTreeSet<KeyOf<R>> = existing.iter().map(Record::key).collect();
    incoming
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}
