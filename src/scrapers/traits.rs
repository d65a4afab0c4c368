use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Reasons a single results page could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to start fetcher: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out after {waited_ms}ms waiting for {url}")]
    Timeout { url: String, waited_ms: u64 },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("could not read content of {url}: {message}")]
    Content { url: String, message: String },
}

/// Common trait for everything that can turn a results page URL into markup.
/// The run loop only sees this, so browser and plain HTTP sources are interchangeable.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load the page and return its rendered HTML
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;

    /// Load a single listing's own page
    async fn fetch_detail(&self, url: &Url) -> Result<String, FetchError> {
        self.fetch(url).await
    }

    /// Get the name of the fetcher backend
    fn source_name(&self) -> &'static str;
}
