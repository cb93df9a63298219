use crate::types::{FetchConfig, IngestError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Shared HTTP client for feeds and article pages.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET `url` and return the body as text, retrying transient failures
    /// with exponential backoff. Client errors (4xx) are not retried.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IngestError::General(format!("Unsupported URL scheme: {}", url)));
        }

        let start_time = Instant::now();
        let mut backoff = self.backoff_policy();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(
                        "Fetched {} ({} bytes) in {}ms",
                        url,
                        body.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(body);
                }
                Err(e) => {
                    let retryable = is_retryable(&e);
                    last_error = Some(e);

                    if !retryable || attempt == self.config.max_retries {
                        break;
                    }
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => break,
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| IngestError::General("Unknown error".to_string()));
        warn!("Giving up on {}: {}", url, error);
        Err(error)
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(IngestError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_body_size_mb {
                return Err(IngestError::General(format!("Response too large: {}MB", size_mb)));
            }
        }

        Ok(response.text().await?)
    }

    fn backoff_policy(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let delay = self.config.retry_delay_seconds.max(1);
        ExponentialBackoff {
            current_interval: Duration::from_secs(delay),
            initial_interval: Duration::from_secs(delay),
            max_interval: Duration::from_secs(delay * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(delay * 60)),
            ..Default::default()
        }
    }
}

fn is_retryable(error: &IngestError) -> bool {
    match error {
        IngestError::Http(e) => match e.status() {
            Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            None => e.is_timeout() || e.is_connect() || e.is_request(),
        },
        IngestError::Status { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}
