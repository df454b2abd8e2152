use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use common::{Error, GroupName, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Project query file: shared search parameters plus one query and one
/// watermark per group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFile {
    #[serde(rename = "SearchParameters", default)]
    pub search_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "GroupQueries", default)]
    pub group_queries: BTreeMap<String, GroupQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupQuery {
    #[serde(rename = "Query")]
    pub query: String,
    /// Highest post id already synced for the group
    #[serde(rename = "MaxRecord", default, deserialize_with = "lenient_id")]
    pub max_record: Option<i64>,
    #[serde(rename = "LastUpdate", default, deserialize_with = "lenient_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
}

impl QueryFile {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupName, &GroupQuery)> {
        self.group_queries
            .iter()
            .map(|(name, query)| (GroupName::new(name.clone()), query))
    }

    pub fn group(&self, group: &GroupName) -> Option<&GroupQuery> {
        self.group_queries.get(group.as_str())
    }

    /// Search parameters rendered as query-string pairs
    pub fn search_params(&self) -> Vec<(String, String)> {
        self.search_parameters
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    pub fn record_progress(
        &mut self,
        group: &GroupName,
        max_record: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = self
            .group_queries
            .get_mut(group.as_str())
            .ok_or_else(|| Error::Config(format!("group {} is not in the query file", group)))?;

        entry.max_record = max_record;
        entry.last_update = Some(at);
        Ok(())
    }
}

/// Accepts a number, a numeric string, an empty string or null
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("MaxRecord {} is not an integer", n))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("MaxRecord {:?} is not an integer", s))),
        Some(other) => Err(D::Error::custom(format!("unexpected MaxRecord {}", other))),
    }
}

/// Accepts RFC 3339 or the `YYYY-MM-DD HH:MM:SS[.ffffff]` form written by
/// earlier versions of the tool (taken as UTC)
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Some(Utc.from_utc_datetime(&naive)))
        .map_err(|e| D::Error::custom(format!("LastUpdate {:?}: {}", raw, e)))
}
