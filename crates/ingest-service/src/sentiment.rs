use crate::storage::Storage;
use chrono::NaiveDate;
use common::{DailySummary, GroupName, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};
use vader_sentiment::SentimentIntensityAnalyzer;

/// Polarity of a text in `[-1, 1]`
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// VADER compound polarity
pub struct VaderScorer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl VaderScorer {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }
}

impl Default for VaderScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for VaderScorer {
    fn score(&self, text: &str) -> f64 {
        self.analyzer
            .polarity_scores(text)
            .get("compound")
            .copied()
            .unwrap_or(0.0)
    }
}

/// Scores cleansed rows and maintains the daily summary table
pub struct SentimentAnnotator {
    storage: Storage,
    scorer: Box<dyn SentimentScorer>,
}

impl SentimentAnnotator {
    pub fn new(storage: Storage, scorer: Box<dyn SentimentScorer>) -> Self {
        Self { storage, scorer }
    }

    /// Score `days` of `group`, or every cleansed day when `days` is `None`
    pub async fn annotate(&self, group: &GroupName, days: Option<&BTreeSet<NaiveDate>>) -> Result<Vec<DailySummary>> {
        let days: Vec<NaiveDate> = match days {
            Some(days) => days.iter().copied().collect(),
            None => self.storage.cleansed_days(group).await?,
        };

        let mut summaries = Vec::with_capacity(days.len());
        for day in days {
            let rows = self.storage.cleansed_on(group, day).await?;
            if rows.is_empty() {
                debug!(group = %group, %day, "no cleansed rows, summary skipped");
                continue;
            }

            let scores: Vec<(i64, f64)> = rows
                .iter()
                .map(|row| (row.id, self.scorer.score(&row.full_text)))
                .collect();
            self.storage.set_sentiment(group, &scores).await?;

            let total: f64 = scores.iter().map(|(_, score)| score).sum();
            let summary = DailySummary {
                day,
                group: group.clone(),
                mean_sentiment: total / scores.len() as f64,
                record_count: scores.len() as i64,
            };
            self.storage.upsert_summary(&summary).await?;
            summaries.push(summary);
        }

        info!(group = %group, days = summaries.len(), "sentiment updated");
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::memory_storage;
    use chrono::{TimeZone, Utc};
    use common::CleansedTweet;

    #[test]
    fn test_polarity_signs() {
        let scorer = VaderScorer::new();
        assert!(scorer.score("What a fantastic touchdown, so proud of this team") > 0.5);
        assert!(scorer.score("Horrible refs, disgusted and furious") < -0.5);
        assert!(scorer.score("I'm thrilled") > 0.0);
        assert_eq!(scorer.score("the meeting is at noon"), 0.0);
    }

    #[test]
    fn test_negation_and_booster() {
        let scorer = VaderScorer::new();
        assert!(scorer.score("not good") < 0.0);
        assert!(scorer.score("very good") > scorer.score("good"));
    }

    #[test]
    fn test_compound_stays_in_range() {
        let scorer = VaderScorer::new();
        let gushing = "great ".repeat(50);
        let score = scorer.score(&gushing);
        assert!(score > 0.9 && score <= 1.0);
    }

    struct Fixed(f64);

    impl SentimentScorer for Fixed {
        fn score(&self, text: &str) -> f64 {
            if text.contains("up") {
                self.0
            } else {
                -self.0
            }
        }
    }

    #[tokio::test]
    async fn test_annotate_writes_scores_and_replaces_summary() {
        let storage = memory_storage().await;
        let group = GroupName::new("Company");
        let day = NaiveDate::from_ymd_opt(2018, 10, 5).unwrap();
        let row = |id: i64, text: &str| CleansedTweet {
            id,
            user: "trader".to_string(),
            created_at: Utc.with_ymd_and_hms(2018, 10, 5, 18, 0, 0).unwrap(),
            day,
            full_text: text.to_string(),
            retweets: 0,
            sentiment: None,
        };
        storage
            .put_cleansed(&group, &[row(1, "up"), row(2, "up"), row(3, "flat")])
            .await
            .unwrap();

        let annotator = SentimentAnnotator::new(storage.clone(), Box::new(Fixed(0.6)));
        let summaries = annotator.annotate(&group, None).await.unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].record_count, 3);
        assert!((summaries[0].mean_sentiment - 0.2).abs() < 1e-9);

        let rows = storage.cleansed_on(&group, day).await.unwrap();
        assert_eq!(rows[2].sentiment, Some(-0.6));

        storage.put_cleansed(&group, &[row(4, "up")]).await.unwrap();
        annotator
            .annotate(&group, Some(&BTreeSet::from([day])))
            .await
            .unwrap();

        let stored = storage.summaries().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record_count, 4);
    }
}
