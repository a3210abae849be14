//! Message history over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::error::{ChatLinkError, Result};
use crate::models::{IncomingPage, MessagePage, PageRequest};
use crate::timeouts::ChatLinkTimeouts;

/// Delay used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound on how long a single `Retry-After` may defer a fetch.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Source of history pages for the paginator.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Fetch one page of `chat_id`'s history, newest-first.
    async fn fetch_page(&self, chat_id: i64, request: PageRequest) -> Result<MessagePage>;
}

/// `GET {api}/message/{chatId}/get?pageSize&pageNum&before`.
///
/// A 429 response is retried once after its `Retry-After` delay; a second
/// 429 fails with [`ChatLinkError::ServerRateLimited`].
#[derive(Clone)]
pub struct HttpHistoryClient {
    api_url: String,
    http_client: reqwest::Client,
}

impl HttpHistoryClient {
    pub fn new(api_url: impl Into<String>, timeouts: &ChatLinkTimeouts) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connection_timeout)
            .pool_idle_timeout(Duration::from_secs(90));
        if !ChatLinkTimeouts::is_no_timeout(timeouts.fetch_timeout) {
            builder = builder.timeout(timeouts.fetch_timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ChatLinkError::ConfigurationError(e.to_string()))?;
        Ok(Self::with_client(api_url, http_client))
    }

    pub fn with_client(api_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn page_url(&self, chat_id: i64) -> String {
        format!("{}/message/{}/get", self.api_url, chat_id)
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryClient {
    async fn fetch_page(&self, chat_id: i64, request: PageRequest) -> Result<MessagePage> {
        let url = self.page_url(chat_id);
        let mut rate_limited = false;
        let start = Instant::now();

        loop {
            debug!(
                "[chat-link] GET {} (pageNum={}, pageSize={}, before={})",
                url, request.page_num, request.page_size, request.before
            );
            let response = self
                .http_client
                .get(&url)
                .query(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ChatLinkError::TimeoutError(e.to_string())
                    } else {
                        ChatLinkError::FetchFailed(e.to_string())
                    }
                })?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(response.headers());
                if rate_limited {
                    return Err(ChatLinkError::ServerRateLimited { retry_after });
                }
                rate_limited = true;
                warn!(
                    "[chat-link] History fetch for chat {} rate limited, retrying in {:?}",
                    chat_id, retry_after
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ChatLinkError::ServerError {
                    status_code: status.as_u16(),
                    message,
                });
            }

            let page = response
                .json::<IncomingPage>()
                .await
                .map_err(|e| ChatLinkError::FetchFailed(format!("Invalid history response: {}", e)))?
                .into_page(chat_id);
            debug!(
                "[chat-link] Fetched {} message(s) for chat {} in {:?} (hasNext={})",
                page.content.len(),
                chat_id,
                start.elapsed(),
                page.has_next
            );
            return Ok(page);
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values fall back to the
/// default delay.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .min(MAX_RETRY_AFTER)
}
