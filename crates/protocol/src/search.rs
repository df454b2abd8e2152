use chrono::{DateTime, Utc};
use common::{Error, Result, Tweet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Timestamp layout used by the search API, e.g. `Fri Oct 05 17:01:02 +0000 2018`
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Body of `GET /1.1/search/tweets.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub search_metadata: Option<SearchMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub max_id: Option<i64>,
    #[serde(default)]
    pub since_id: Option<i64>,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub created_at: String,
    pub user: StatusUser,
    /// Present with `tweet_mode=extended`
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub in_reply_to_status_id: Option<i64>,
    #[serde(default)]
    pub retweeted_status: Option<Box<Status>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUser {
    pub screen_name: String,
}

impl Status {
    fn body(&self) -> &str {
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

impl TryFrom<Status> for Tweet {
    type Error = Error;

    fn try_from(status: Status) -> Result<Self> {
        let created_at = DateTime::parse_from_str(&status.created_at, CREATED_AT_FORMAT)
            .map_err(|e| {
                Error::InvalidRecord(format!(
                    "status {} has unparseable created_at {:?}: {}",
                    status.id, status.created_at, e
                ))
            })?
            .with_timezone(&Utc);

        // Retweets carry the original post's text
        let (text, retweeted_id) = match &status.retweeted_status {
            Some(original) => (original.body(), Some(original.id)),
            None => (status.body(), None),
        };

        Ok(Tweet {
            id: status.id,
            user: status.user.screen_name.clone(),
            created_at,
            full_text: clean_text(text),
            replied_to_id: status.in_reply_to_status_id,
            retweeted_id,
        })
    }
}

/// Strip links and flatten characters that break the tabular store
pub fn clean_text(text: &str) -> String {
    static LINKS: OnceLock<Regex> = OnceLock::new();
    let links = LINKS.get_or_init(|| {
        Regex::new(r"https?://[A-Za-z0-9./]+").expect("link pattern is valid")
    });

    links
        .replace_all(text, "")
        .replace(['\n', '\t', '\u{2705}'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn status_json() -> serde_json::Value {
        serde_json::json!({
            "id": 1050,
            "created_at": "Fri Oct 05 17:01:02 +0000 2018",
            "user": { "screen_name": "da_fan" },
            "full_text": "Big win today!\nhttps://t.co/abc123 \u{2705}",
            "in_reply_to_status_id": null
        })
    }

    #[test]
    fn test_status_to_tweet() {
        let status: Status = serde_json::from_value(status_json()).unwrap();
        let tweet = Tweet::try_from(status).unwrap();

        assert_eq!(tweet.id, 1050);
        assert_eq!(tweet.user, "da_fan");
        assert_eq!(tweet.created_at, Utc.with_ymd_and_hms(2018, 10, 5, 17, 1, 2).unwrap());
        assert_eq!(tweet.full_text, "Big win today!   ");
        assert!(tweet.is_original());
    }

    #[test]
    fn test_retweet_uses_original_text() {
        let mut json = status_json();
        json["full_text"] = serde_json::json!("RT @team: truncated…");
        json["retweeted_status"] = serde_json::json!({
            "id": 900,
            "created_at": "Thu Oct 04 10:00:00 +0000 2018",
            "user": { "screen_name": "team" },
            "full_text": "Full original text"
        });

        let status: Status = serde_json::from_value(json).unwrap();
        let tweet = Tweet::try_from(status).unwrap();

        assert_eq!(tweet.full_text, "Full original text");
        assert_eq!(tweet.retweeted_id, Some(900));
        assert_eq!(tweet.replied_to_id, None);
    }

    #[test]
    fn test_reply_keeps_target() {
        let mut json = status_json();
        json["in_reply_to_status_id"] = serde_json::json!(1001);

        let status: Status = serde_json::from_value(json).unwrap();
        let tweet = Tweet::try_from(status).unwrap();
        assert_eq!(tweet.replied_to_id, Some(1001));
    }

    #[test]
    fn test_bad_timestamp_is_invalid_record() {
        let mut json = status_json();
        json["created_at"] = serde_json::json!("yesterday");

        let status: Status = serde_json::from_value(json).unwrap();
        assert!(matches!(Tweet::try_from(status), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("see http://x.co/a\tnow"), "see  now");
        assert_eq!(clean_text("plain"), "plain");
    }
}
