use chrono::Utc;
use common::Error;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use sync_engine::{FetchError, RateQuota};

/// Shortest wait honoured after a 429
const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Connection-level failures are worth repeating, anything else is not
pub fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        FetchError::Transient(e.to_string())
    } else {
        FetchError::Fatal(Error::Upstream(e.to_string()))
    }
}

/// Map a non-success response onto the engine's error classes
pub async fn status_error(response: Response) -> FetchError {
    let status = response.status();
    let retry_after = rate_limit_wait(response.headers());
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after: retry_after.unwrap_or(MIN_RATE_LIMIT_WAIT).max(MIN_RATE_LIMIT_WAIT),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Fatal(Error::AuthenticationFailed(format!("HTTP {}: {}", status, body)))
        }
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {}: {}", status, body)),
        _ => FetchError::Fatal(Error::Upstream(format!("HTTP {}: {}", status, body))),
    }
}

/// Wait implied by `x-rate-limit-reset` (epoch seconds) or `retry-after`
/// (seconds)
pub fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    if let Some(reset) = header_u64(headers, "x-rate-limit-reset") {
        let now = Utc::now().timestamp().max(0) as u64;
        return Some(Duration::from_secs(reset.saturating_sub(now)));
    }
    header_u64(headers, "retry-after").map(Duration::from_secs)
}

/// Call allowance advertised alongside a successful response
pub fn quota(headers: &HeaderMap) -> Option<RateQuota> {
    let remaining = header_u64(headers, "x-rate-limit-remaining")?;
    Some(RateQuota {
        remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        reset_after: rate_limit_wait(headers).unwrap_or(Duration::ZERO),
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
