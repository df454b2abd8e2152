use crate::metrics::record_group_failure;
use crate::stock_client::{DailyBarSource, StockClient};
use chrono::NaiveDate;
use common::{Result, Symbol};
use sqlx::SqlitePool;
use sync_engine::sqlite::SqliteBarStore;
use sync_engine::{SyncEngine, SyncReport};
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct StockSyncSummary {
    pub synced: Vec<(Symbol, SyncReport<NaiveDate>)>,
    pub failed: Vec<(Symbol, String)>,
}

/// Bring every symbol's daily bars up to date
pub async fn sync_symbols(
    engine: &SyncEngine,
    client: &StockClient,
    pool: &SqlitePool,
    symbols: &[Symbol],
) -> Result<StockSyncSummary> {
    let mut summary = StockSyncSummary::default();

    for symbol in symbols {
        let store = SqliteBarStore::new(pool.clone(), symbol.clone());
        let outcome = async {
            let watermark = store.latest_day().await?;
            let source = DailyBarSource::new(client.clone(), symbol.clone(), watermark.is_none());
            engine.sync_merged(&source, &store, watermark).await
        }
        .await;

        match outcome {
            Ok(report) => {
                info!(symbol = %symbol, written = report.written, latest = ?report.watermark, "symbol synced");
                summary.synced.push((symbol.clone(), report));
            }
            Err(e) if e.aborts_run() => return Err(e),
            Err(e) => {
                error!(symbol = %symbol, error = %e, "symbol sync failed, continuing");
                record_group_failure(symbol.as_str(), "upstream");
                summary.failed.push((symbol.clone(), e.to_string()));
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::{StockConfig, SyncSettings};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use sync_engine::RecordStore;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bar(close: &str) -> serde_json::Value {
        json!({
            "1. open": "10.0",
            "2. high": "11.0",
            "3. low": "9.0",
            "4. close": close,
            "5. adjusted close": close,
            "6. volume": "100",
            "7. dividend amount": "0.0",
            "8. split coefficient": "1.0"
        })
    }

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sync_engine::sqlite::install_schema(&pool).await.unwrap();
        pool
    }

    fn engine() -> SyncEngine {
        SyncEngine::new(SyncSettings {
            request_interval_ms: 0,
            ..SyncSettings::default()
        })
    }

    #[tokio::test]
    async fn test_full_then_compact_load() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "ACME"))
            .and(query_param("outputsize", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Time Series (Daily)": {"2018-10-04": bar("10.5"), "2018-10-05": bar("10.7")}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "ACME"))
            .and(query_param("outputsize", "compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Time Series (Daily)": {
                    "2018-10-04": bar("99.0"),
                    "2018-10-05": bar("10.7"),
                    "2018-10-08": bar("11.2")
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StockClient::new(&StockConfig {
            base_url: server.uri(),
            api_key: Some("demo".to_string()),
            ..StockConfig::default()
        })
        .unwrap();
        let pool = pool().await;
        let symbols = vec![Symbol::parse("ACME").unwrap()];
        let engine = engine();

        let first = sync_symbols(&engine, &client, &pool, &symbols).await.unwrap();
        assert_eq!(first.synced[0].1.written, 2);

        let second = sync_symbols(&engine, &client, &pool, &symbols).await.unwrap();
        let report = &second.synced[0].1;
        assert_eq!(report.written, 1);
        assert_eq!(report.watermark, NaiveDate::from_ymd_opt(2018, 10, 8));

        let bars = SqliteBarStore::new(pool.clone(), symbols[0].clone())
            .read_all()
            .await
            .unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 10.5);
    }

    #[tokio::test]
    async fn test_rejected_symbol_does_not_stop_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "NOPE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Error Message": "Invalid API call."})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "ACME"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Time Series (Daily)": {"2018-10-05": bar("10.7")}
            })))
            .mount(&server)
            .await;

        let client = StockClient::new(&StockConfig {
            base_url: server.uri(),
            api_key: Some("demo".to_string()),
            ..StockConfig::default()
        })
        .unwrap();
        let pool = pool().await;
        let symbols = vec![Symbol::parse("NOPE").unwrap(), Symbol::parse("ACME").unwrap()];

        let summary = sync_symbols(&engine(), &client, &pool, &symbols).await.unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0.as_str(), "NOPE");
        assert_eq!(summary.synced[0].1.written, 1);
    }
}
