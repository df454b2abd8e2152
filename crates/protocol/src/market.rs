use chrono::NaiveDate;
use common::{DailyBar, Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DAILY_ADJUSTED_FUNCTION: &str = "TIME_SERIES_DAILY_ADJUSTED";
pub const DAILY_SERIES_KEY: &str = "Time Series (Daily)";

/// What the market-data API answered for a daily adjusted series request
#[derive(Debug, Clone, PartialEq)]
pub enum MarketReply {
    /// Bars in ascending day order
    Series(Vec<DailyBar>),
    /// The per-minute or per-day call allowance is used up
    Throttled(String),
    /// The request itself was rejected (unknown symbol, bad key)
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct RawBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. adjusted close")]
    adjusted_close: String,
    #[serde(rename = "6. volume")]
    volume: String,
    #[serde(rename = "7. dividend amount")]
    dividend_amount: String,
    #[serde(rename = "8. split coefficient")]
    split_coefficient: String,
}

/// Interpret a daily adjusted series body.
///
/// The API answers HTTP 200 for throttling and for rejected requests, so the
/// distinction is made on the body keys.
pub fn parse_daily_adjusted(symbol: &str, body: &serde_json::Value) -> Result<MarketReply> {
    if let Some(message) = body.get("Error Message").and_then(|v| v.as_str()) {
        return Ok(MarketReply::Rejected(message.to_string()));
    }

    if let Some(series) = body.get(DAILY_SERIES_KEY) {
        let raw: BTreeMap<String, RawBar> = serde_json::from_value(series.clone())?;
        let bars = raw
            .into_iter()
            .map(|(day, bar)| to_daily_bar(symbol, &day, bar))
            .collect::<Result<Vec<_>>>()?;
        return Ok(MarketReply::Series(bars));
    }

    for key in ["Note", "Information"] {
        if let Some(message) = body.get(key).and_then(|v| v.as_str()) {
            return Ok(MarketReply::Throttled(message.to_string()));
        }
    }

    Err(Error::Upstream(format!(
        "daily series for {} has no '{}' key",
        symbol, DAILY_SERIES_KEY
    )))
}

fn to_daily_bar(symbol: &str, day: &str, bar: RawBar) -> Result<DailyBar> {
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| Error::InvalidRecord(format!("bad trading day {:?}: {}", day, e)))?;

    Ok(DailyBar {
        symbol: symbol.to_string(),
        day,
        open: number(&bar.open)?,
        high: number(&bar.high)?,
        low: number(&bar.low)?,
        close: number(&bar.close)?,
        adjusted_close: number(&bar.adjusted_close)?,
        volume: bar
            .volume
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRecord(format!("bad volume {:?}", bar.volume)))?,
        dividend_amount: number(&bar.dividend_amount)?,
        split_coefficient: number(&bar.split_coefficient)?,
    })
}

fn number(raw: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidRecord(format!("bad price field {:?}", raw)))
}
