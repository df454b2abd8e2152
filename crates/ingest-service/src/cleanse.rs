use crate::storage::Storage;
use chrono::NaiveDate;
use chrono_tz::Tz;
use common::utils::local_day;
use common::{CleansedTweet, GroupName, LoadType, Result, Tweet};
use metrics::counter;
use std::collections::{BTreeMap, BTreeSet};
use sync_engine::sqlite::SqliteTweetStore;
use tracing::{debug, info};

/// Days that received new cleansed rows, per group
pub type TouchedDays = BTreeMap<GroupName, BTreeSet<NaiveDate>>;

/// Turns raw posts into the per-group cleansed tables
pub struct Cleanser {
    storage: Storage,
    zone: Tz,
}

impl Cleanser {
    pub fn new(storage: Storage, zone: Tz) -> Self {
        Self { storage, zone }
    }

    pub async fn run(&self, groups: &[GroupName], load_type: LoadType) -> Result<TouchedDays> {
        info!(%load_type, groups = groups.len(), "Cleansing raw tweets");

        let stores: Vec<SqliteTweetStore> = groups
            .iter()
            .map(|group| SqliteTweetStore::new(self.storage.pool().clone(), group.clone()))
            .collect();

        if load_type == LoadType::Full {
            self.storage.clear_cleansed().await?;
            for store in &stores {
                store.reset_processed().await?;
            }
        }

        let mut touched = TouchedDays::new();
        let mut pending = Vec::with_capacity(stores.len());
        let mut new_parents = Vec::new();

        // Originals of every group first, so replies can find parents across groups
        for store in &stores {
            let raw = store.unprocessed().await?;
            let (originals, others): (Vec<Tweet>, Vec<Tweet>) = raw.into_iter().partition(Tweet::is_original);

            let cleansed: Vec<CleansedTweet> = originals
                .iter()
                .map(|tweet| cleanse_original(tweet, self.zone))
                .collect();
            new_parents.extend(cleansed.iter().map(|row| row.id));

            self.storage.put_cleansed(store.group(), &cleansed).await?;
            self.storage.put_originals(&cleansed).await?;
            note_days(&mut touched, store.group(), &cleansed);

            debug!(group = %store.group(), originals = cleansed.len(), others = others.len(), "originals cleansed");
            pending.push((originals, others));
        }

        for (store, (originals, others)) in stores.iter().zip(pending) {
            let mut threaded = Vec::new();
            for reply in others.iter().filter(|t| t.retweeted_id.is_none()) {
                if let Some(row) = self.thread(reply).await? {
                    threaded.push(row);
                }
            }

            // Replies stored earlier without their parent's text; a full
            // rebuild has none
            let rethreaded = match load_type {
                LoadType::Delta => store.processed_replies_to(&new_parents).await?,
                LoadType::Full => Vec::new(),
            };
            for reply in &rethreaded {
                if let Some(row) = self.thread(reply).await? {
                    threaded.push(row);
                }
            }

            self.storage.put_cleansed(store.group(), &threaded).await?;
            note_days(&mut touched, store.group(), &threaded);
            self.storage.recount_retweets(store.group()).await?;

            let processed: Vec<i64> = originals.iter().chain(others.iter()).map(|t| t.id).collect();
            store.mark_processed(&processed).await?;

            let written = (originals.len() + threaded.len()) as u64;
            counter!("ingest_cleansed_rows_total", "group" => store.group().to_string()).increment(written);
            info!(
                group = %store.group(),
                processed = processed.len(),
                cleansed = written,
                replies = threaded.len(),
                rethreaded = rethreaded.len(),
                "group cleansed"
            );
        }

        Ok(touched)
    }

    async fn thread(&self, reply: &Tweet) -> Result<Option<CleansedTweet>> {
        let Some(parent_id) = reply.replied_to_id else {
            return Ok(None);
        };
        let parent_text = self.storage.original_text(parent_id).await?;
        Ok(Some(thread_reply(parent_text.as_deref(), reply, self.zone)))
    }
}

fn note_days(touched: &mut TouchedDays, group: &GroupName, rows: &[CleansedTweet]) {
    if rows.is_empty() {
        return;
    }
    touched
        .entry(group.clone())
        .or_default()
        .extend(rows.iter().map(|row| row.day));
}

fn strip_line_breaks(text: &str) -> String {
    text.replace(['\n', '\r'], "")
}

pub fn cleanse_original(tweet: &Tweet, zone: Tz) -> CleansedTweet {
    CleansedTweet {
        id: tweet.id,
        user: tweet.user.clone(),
        created_at: tweet.created_at,
        day: local_day(tweet.created_at, zone),
        full_text: strip_line_breaks(&tweet.full_text),
        retweets: 0,
        sentiment: None,
    }
}

/// Reply row carrying the text it answers in front of its own.
/// An unknown parent leaves the prefix empty.
pub fn thread_reply(parent_text: Option<&str>, reply: &Tweet, zone: Tz) -> CleansedTweet {
    let mut row = cleanse_original(reply, zone);
    row.full_text = format!("{}|| ->{}", parent_text.unwrap_or(""), row.full_text);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::memory_storage;
    use chrono::{TimeZone, Utc};
    use sync_engine::RecordStore;

    const CHICAGO: Tz = Tz::America__Chicago;

    fn raw(id: i64, hour: u32, text: &str) -> Tweet {
        Tweet {
            id,
            user: format!("user{}", id),
            created_at: Utc.with_ymd_and_hms(2018, 10, 6, hour, 0, 0).unwrap(),
            full_text: text.to_string(),
            replied_to_id: None,
            retweeted_id: None,
        }
    }

    fn reply(id: i64, parent: i64, text: &str) -> Tweet {
        Tweet {
            replied_to_id: Some(parent),
            ..raw(id, 12, text)
        }
    }

    fn retweet(id: i64, of: i64) -> Tweet {
        Tweet {
            retweeted_id: Some(of),
            ..raw(id, 12, "copied text")
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 10, d).unwrap()
    }

    async fn seed(storage: &Storage, group: &str, tweets: Vec<Tweet>) -> SqliteTweetStore {
        let store = SqliteTweetStore::new(storage.pool().clone(), GroupName::new(group));
        store.upsert_ignoring_duplicates(&tweets).await.unwrap();
        store
    }

    #[test]
    fn test_thread_reply_format() {
        let row = thread_reply(Some("great quarter"), &reply(2, 1, "agreed\n"), CHICAGO);
        assert_eq!(row.full_text, "great quarter|| ->agreed");
        assert_eq!(row.retweets, 0);

        let orphan = thread_reply(None, &reply(3, 9, "who said that"), CHICAGO);
        assert_eq!(orphan.full_text, "|| ->who said that");
    }

    #[test]
    fn test_day_uses_local_calendar() {
        // 03:00 UTC is still the previous evening in Chicago
        assert_eq!(cleanse_original(&raw(1, 3, "late"), CHICAGO).day, day(5));

        // 05:30 UTC on a daylight saving date is already 00:30 the next day
        let after_midnight = Tweet {
            created_at: Utc.with_ymd_and_hms(2018, 10, 6, 5, 30, 0).unwrap(),
            ..raw(2, 0, "early")
        };
        assert_eq!(cleanse_original(&after_midnight, CHICAGO).day, day(6));
    }

    #[tokio::test]
    async fn test_delta_cleanse_builds_derived_rows() {
        let storage = memory_storage().await;
        let company = seed(
            &storage,
            "Company",
            vec![
                raw(1, 15, "acme beats estimates"),
                reply(2, 1, "nice"),
                reply(3, 999, "orphan"),
                retweet(4, 1),
                retweet(5, 1),
            ],
        )
        .await;
        let product = seed(&storage, "Product", vec![reply(20, 1, "cross group reply")]).await;

        let groups = vec![GroupName::new("Company"), GroupName::new("Product")];
        let touched = Cleanser::new(storage.clone(), CHICAGO)
            .run(&groups, LoadType::Delta)
            .await
            .unwrap();

        let rows = storage.cleansed_on(company.group(), day(6)).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(rows[0].retweets, 2);
        assert_eq!(rows[1].full_text, "acme beats estimates|| ->nice");
        assert_eq!(rows[2].full_text, "|| ->orphan");

        let cross = storage.cleansed_on(product.group(), day(6)).await.unwrap();
        assert_eq!(cross[0].full_text, "acme beats estimates|| ->cross group reply");

        assert_eq!(touched[company.group()], BTreeSet::from([day(6)]));
        assert!(company.unprocessed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_delta_is_noop_and_full_rebuilds() {
        let storage = memory_storage().await;
        let company = seed(&storage, "Company", vec![raw(1, 15, "first"), retweet(2, 1)]).await;
        let groups = vec![GroupName::new("Company")];
        let cleanser = Cleanser::new(storage.clone(), CHICAGO);

        cleanser.run(&groups, LoadType::Delta).await.unwrap();
        let touched = cleanser.run(&groups, LoadType::Delta).await.unwrap();
        assert!(touched.is_empty());

        let rows = storage.cleansed_on(company.group(), day(6)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].retweets, 1);

        let touched = cleanser.run(&groups, LoadType::Full).await.unwrap();
        assert_eq!(touched[company.group()].len(), 1);

        let rows = storage.cleansed_on(company.group(), day(6)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].retweets, 1);
    }

    #[tokio::test]
    async fn test_reply_threaded_once_parent_arrives() {
        let storage = memory_storage().await;
        let company = seed(&storage, "Company", vec![reply(2, 1, "nice")]).await;
        let groups = vec![GroupName::new("Company")];
        let cleanser = Cleanser::new(storage.clone(), CHICAGO);

        cleanser.run(&groups, LoadType::Delta).await.unwrap();
        let rows = storage.cleansed_on(company.group(), day(6)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_text, "|| ->nice");

        company
            .upsert_ignoring_duplicates(&[raw(1, 11, "acme beats estimates")])
            .await
            .unwrap();
        let touched = cleanser.run(&groups, LoadType::Delta).await.unwrap();

        let rows = storage.cleansed_on(company.group(), day(6)).await.unwrap();
        let texts: Vec<(i64, &str)> = rows.iter().map(|r| (r.id, r.full_text.as_str())).collect();
        assert_eq!(
            texts,
            vec![(1, "acme beats estimates"), (2, "acme beats estimates|| ->nice")]
        );
        assert_eq!(touched[company.group()], BTreeSet::from([day(6)]));
        assert!(company.unprocessed().await.unwrap().is_empty());
    }
}
