use crate::scrapers::traits::{FetchError, PageFetcher};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Plain HTTP page fetcher, for pages that render listings server side
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Launch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        debug!("Fetching URL: {}", url);

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    waited_ms: self.timeout.as_millis() as u64,
                }
            } else {
                FetchError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned status: {}", url, status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|e| FetchError::Content {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!("Downloaded {} bytes of HTML", html.len());
        Ok(html)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_navigation_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let url = Url::parse("http://127.0.0.1:9/s/nowhere/homes").unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Navigation { .. } | FetchError::Timeout { .. }
        ));
    }
}
