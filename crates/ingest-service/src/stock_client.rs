use crate::http::{status_error, transport_error};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::StockConfig;
use common::{DailyBar, Error, Result, Symbol};
use protocol::{parse_daily_adjusted, MarketReply, DAILY_ADJUSTED_FUNCTION};
use reqwest::Client;
use std::time::Duration;
use sync_engine::{Cursor, FetchError, Page, PageSource};
use tracing::{debug, warn};

/// The free tier throttles per minute
const THROTTLE_WAIT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct StockClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl StockClient {
    pub fn new(config: &StockConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("stocks.api_key must be set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Daily adjusted series of `symbol`, oldest first. `full_history`
    /// requests the whole series instead of the last hundred days.
    pub async fn daily_adjusted(
        &self,
        symbol: &Symbol,
        full_history: bool,
    ) -> std::result::Result<Vec<DailyBar>, FetchError> {
        let output_size = if full_history { "full" } else { "compact" };

        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", DAILY_ADJUSTED_FUNCTION),
                ("symbol", symbol.as_str()),
                ("outputsize", output_size),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(Error::Upstream(format!("market response: {}", e))))?;

        match parse_daily_adjusted(symbol.as_str(), &body)? {
            MarketReply::Series(bars) => Ok(bars),
            MarketReply::Throttled(note) => {
                warn!(symbol = %symbol, note = %note, "market data throttled");
                Err(FetchError::RateLimited {
                    retry_after: THROTTLE_WAIT,
                })
            }
            MarketReply::Rejected(message) => Err(FetchError::Fatal(Error::Upstream(format!(
                "{} rejected: {}",
                symbol, message
            )))),
        }
    }
}

/// Daily bars of one symbol. The API returns the whole window in one reply,
/// so every page is the last one.
pub struct DailyBarSource {
    client: StockClient,
    symbol: Symbol,
    full_history: bool,
}

impl DailyBarSource {
    pub fn new(client: StockClient, symbol: Symbol, full_history: bool) -> Self {
        Self {
            client,
            symbol,
            full_history,
        }
    }
}

#[async_trait]
impl PageSource for DailyBarSource {
    type Record = DailyBar;

    fn name(&self) -> &str {
        self.symbol.as_str()
    }

    async fn fetch_page(&self, cursor: &Cursor<NaiveDate>) -> std::result::Result<Page<DailyBar>, FetchError> {
        let bars = self.client.daily_adjusted(&self.symbol, self.full_history).await?;
        let total = bars.len();

        let mut fresh: Vec<DailyBar> = bars
            .into_iter()
            .filter(|bar| cursor.watermark.map_or(true, |watermark| bar.day > watermark))
            .collect();
        fresh.reverse();

        debug!(symbol = %self.symbol, total, fresh = fresh.len(), "daily series fetched");
        Ok(Page::last(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bar(close: &str) -> serde_json::Value {
        json!({
            "1. open": "100.0",
            "2. high": "110.0",
            "3. low": "99.0",
            "4. close": close,
            "5. adjusted close": close,
            "6. volume": "5000",
            "7. dividend amount": "0.0000",
            "8. split coefficient": "1.0000"
        })
    }

    fn series() -> serde_json::Value {
        json!({
            "Meta Data": {"2. Symbol": "ACME"},
            "Time Series (Daily)": {
                "2018-10-03": bar("101.0"),
                "2018-10-04": bar("102.0"),
                "2018-10-05": bar("103.0")
            }
        })
    }

    fn client(server: &MockServer) -> StockClient {
        StockClient::new(&StockConfig {
            base_url: server.uri(),
            api_key: Some("demo".to_string()),
            symbols: Vec::new(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 10, d).unwrap()
    }

    #[tokio::test]
    async fn test_bars_after_watermark_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "TIME_SERIES_DAILY_ADJUSTED"))
            .and(query_param("symbol", "ACME"))
            .and(query_param("outputsize", "compact"))
            .and(query_param("apikey", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(series()))
            .mount(&server)
            .await;

        let source = DailyBarSource::new(client(&server), Symbol::parse("acme").unwrap(), false);
        let page = source
            .fetch_page(&Cursor::starting_at(Some(day(3))))
            .await
            .unwrap();

        let days: Vec<NaiveDate> = page.records.iter().map(|b| b.day).collect();
        assert_eq!(days, vec![day(5), day(4)]);
        assert!(page.reached_end);
    }

    #[tokio::test]
    async fn test_first_load_requests_full_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("outputsize", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(series()))
            .expect(1)
            .mount(&server)
            .await;

        let source = DailyBarSource::new(client(&server), Symbol::parse("ACME").unwrap(), true);
        let page = source.fetch_page(&Cursor::starting_at(None)).await.unwrap();
        assert_eq!(page.records.len(), 3);
    }

    #[tokio::test]
    async fn test_note_reply_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Note": "Thank you for using our API! Our standard call frequency is 5 calls per minute."
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .daily_adjusted(&Symbol::parse("ACME").unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { retry_after } if retry_after == THROTTLE_WAIT));
    }

    #[tokio::test]
    async fn test_error_message_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Error Message": "Invalid API call."
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .daily_adjusted(&Symbol::parse("NOPE").unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Fatal(Error::Upstream(_))));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = StockConfig::default();
        assert!(matches!(StockClient::new(&config), Err(Error::Config(_))));
    }
}
