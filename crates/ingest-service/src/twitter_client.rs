use crate::http::{quota, status_error, transport_error};
use async_trait::async_trait;
use common::config::TwitterConfig;
use common::{Error, GroupName, Result, Tweet};
use protocol::SearchResponse;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use sync_engine::{Cursor, FetchError, Page, PageSource, RateQuota};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SEARCH_PATH: &str = "/1.1/search/tweets.json";
const TOKEN_PATH: &str = "/oauth2/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Statuses of one search call plus the allowance left afterwards
#[derive(Debug)]
pub struct SearchPage {
    pub tweets: Vec<Tweet>,
    pub quota: Option<RateQuota>,
}

/// App-only client for the standard search API
#[derive(Clone)]
pub struct TwitterClient {
    client: Client,
    base_url: String,
    app_credentials: Option<(String, String)>,
    token: Arc<OnceCell<String>>,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;

        let token = Arc::new(OnceCell::new());
        if let Some(bearer) = &config.bearer_token {
            token
                .set(bearer.clone())
                .map_err(|_| Error::Internal("bearer token set twice".to_string()))?;
        }

        let app_credentials = match (&config.app_key, &config.app_secret) {
            (Some(key), Some(secret)) => Some((key.clone(), secret.clone())),
            _ => None,
        };

        if !token.initialized() && app_credentials.is_none() {
            return Err(Error::Config(
                "twitter.bearer_token or twitter.app_key/app_secret must be set".to_string(),
            ));
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_credentials,
            token,
        })
    }

    /// Bearer token, exchanged for the app credentials on first use
    async fn bearer(&self) -> std::result::Result<&str, FetchError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let (key, secret) = self.app_credentials.as_ref().ok_or_else(|| {
                    FetchError::Fatal(Error::Config("no app credentials configured".to_string()))
                })?;

                let response = self
                    .client
                    .post(format!("{}{}", self.base_url, TOKEN_PATH))
                    .basic_auth(key, Some(secret))
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
                    .body("grant_type=client_credentials")
                    .send()
                    .await
                    .map_err(transport_error)?;

                if !response.status().is_success() {
                    return Err(status_error(response).await);
                }

                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Fatal(Error::Upstream(format!("token response: {}", e))))?;
                if !body.token_type.eq_ignore_ascii_case("bearer") {
                    return Err(FetchError::Fatal(Error::AuthenticationFailed(format!(
                        "unexpected token type {}",
                        body.token_type
                    ))));
                }

                info!("Obtained app-only bearer token");
                Ok::<_, FetchError>(body.access_token)
            })
            .await?;
        Ok(token.as_str())
    }

    /// One call of the search endpoint.
    ///
    /// `since_id` and `max_id` are passed through as the API expects them:
    /// exclusive lower bound and inclusive upper bound.
    pub async fn search(
        &self,
        params: &[(String, String)],
        query: &str,
        since_id: Option<i64>,
        max_id: Option<i64>,
    ) -> std::result::Result<SearchPage, FetchError> {
        let bearer = self.bearer().await?;

        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, SEARCH_PATH))
            .bearer_auth(bearer)
            .query(params)
            .query(&[("q", query)]);
        if let Some(since_id) = since_id {
            request = request.query(&[("since_id", since_id)]);
        }
        if let Some(max_id) = max_id {
            request = request.query(&[("max_id", max_id)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let quota = quota(response.headers());
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(Error::Upstream(format!("search response: {}", e))))?;

        let tweets = body
            .statuses
            .into_iter()
            .map(Tweet::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchPage { tweets, quota })
    }
}

/// Search results of one group, walked newest first down to the watermark
pub struct TweetSearchSource {
    client: TwitterClient,
    group: GroupName,
    query: String,
    params: Vec<(String, String)>,
}

impl TweetSearchSource {
    pub fn new(client: TwitterClient, group: GroupName, query: String, params: Vec<(String, String)>) -> Self {
        Self {
            client,
            group,
            query,
            params,
        }
    }
}

#[async_trait]
impl PageSource for TweetSearchSource {
    type Record = Tweet;

    fn name(&self) -> &str {
        self.group.as_str()
    }

    async fn fetch_page(&self, cursor: &Cursor<i64>) -> std::result::Result<Page<Tweet>, FetchError> {
        let max_id = cursor.position.map(|position| position - 1);
        let page = self
            .client
            .search(&self.params, &self.query, cursor.watermark, max_id)
            .await?;

        debug!(group = %self.group, statuses = page.tweets.len(), ?max_id, "search page");

        let mut result = Page::new(page.tweets);
        result.quota = page.quota;
        Ok(result)
    }
}
