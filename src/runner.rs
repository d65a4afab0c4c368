use crate::models::Listing;
use crate::scrapers::{DetailExtractor, FetchError, ListingExtractor, PageFetcher, SearchQuery};
use anyhow::{Context, Result};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Page count used when the operator gives none
pub const DEFAULT_PAGES: u32 = 5;

/// What to do when a results page cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PageFailurePolicy {
    /// Log the failure and continue with the next page
    #[default]
    Skip,
    /// Stop the run and report the failure
    Abort,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub pages: u32,
    pub policy: PageFailurePolicy,
    /// Extra attempts per page after the first failure
    pub retries: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive pages
    pub page_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGES,
            policy: PageFailurePolicy::Skip,
            retries: 0,
            retry_delay: Duration::from_secs(2),
            page_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of a run, listings in page order
#[derive(Debug, Default)]
pub struct RunReport {
    pub listings: Vec<Listing>,
    pub pages_scraped: u32,
    pub skipped_pages: Vec<u32>,
}

/// A run stopped by the abort policy, carrying everything collected before the failed page
#[derive(Debug, Error)]
#[error("Aborting run at page {page}")]
pub struct RunAborted {
    pub page: u32,
    #[source]
    pub cause: FetchError,
    pub partial: RunReport,
}

/// Separate an aborted run's partial report from its error, so the collected
/// listings can still be saved. Any other error is passed through.
pub fn keep_partial(result: Result<RunReport>) -> Result<(RunReport, Option<RunAborted>)> {
    match result {
        Ok(report) => Ok((report, None)),
        Err(err) => match err.downcast::<RunAborted>() {
            Ok(mut aborted) => {
                let partial = std::mem::take(&mut aborted.partial);
                Ok((partial, Some(aborted)))
            }
            Err(err) => Err(err),
        },
    }
}

/// Walks the results pages one at a time and collects their listings
pub struct Runner<F: PageFetcher> {
    fetcher: F,
    extractor: ListingExtractor,
    details: Option<DetailExtractor>,
    config: RunnerConfig,
}

impl<F: PageFetcher> Runner<F> {
    pub fn new(fetcher: F, extractor: ListingExtractor, config: RunnerConfig) -> Self {
        Self {
            fetcher,
            extractor,
            details: None,
            config,
        }
    }

    /// Also visit every listing's own page and attach its details
    pub fn with_details(mut self, details: DetailExtractor) -> Self {
        self.details = Some(details);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn run(&self, query: &SearchQuery) -> Result<RunReport> {
        let pages = self.config.pages;
        let mut report = RunReport::default();

        info!(
            "Scraping {} page(s) for '{}' via {}",
            pages,
            query.describe(),
            self.fetcher.source_name()
        );

        for page in 1..=pages {
            if page > 1 && !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }

            let url = query
                .page_url(page)
                .with_context(|| format!("Failed to build URL for page {}", page))?;
            info!("📄 Page {}/{}: {}", page, pages, url);

            match self.fetch_with_retries(&url).await {
                Ok(html) => {
                    let listings = self.extractor.extract(&html, &url);
                    info!("Found {} listings on page {}", listings.len(), page);
                    let listings = match &self.details {
                        Some(details) => self.attach_details(details, listings).await,
                        None => listings,
                    };
                    report.pages_scraped += 1;
                    report.listings.extend(listings);
                }
                Err(e) => match self.config.policy {
                    PageFailurePolicy::Skip => {
                        warn!("Skipping page {}: {}", page, e);
                        report.skipped_pages.push(page);
                    }
                    PageFailurePolicy::Abort => {
                        warn!(
                            "Aborting at page {} with {} listings collected: {}",
                            page,
                            report.listings.len(),
                            e
                        );
                        return Err(RunAborted {
                            page,
                            cause: e,
                            partial: report,
                        }
                        .into());
                    }
                },
            }
        }

        info!(
            "✅ Collected {} listings from {} page(s), {} skipped",
            report.listings.len(),
            report.pages_scraped,
            report.skipped_pages.len()
        );

        Ok(report)
    }

    /// Detail failures never drop a listing; it is kept without details
    async fn attach_details(
        &self,
        details: &DetailExtractor,
        mut listings: Vec<Listing>,
    ) -> Vec<Listing> {
        for listing in listings.iter_mut() {
            let url = match listing.url.as_deref().map(Url::parse) {
                Some(Ok(url)) => url,
                Some(Err(e)) => {
                    warn!("Skipping details for unparsable URL: {}", e);
                    continue;
                }
                None => continue,
            };

            if !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }

            match self.fetcher.fetch_detail(&url).await {
                Ok(html) => {
                    let found = details.extract(&html);
                    debug!("Details for {}: {:?}", url, found);
                    listing.details = Some(found);
                }
                Err(e) => warn!("Could not load details for {}: {}", url, e),
            }
        }

        listings
    }

    async fn fetch_with_retries(&self, url: &Url) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(html) => return Ok(html),
                Err(e) if attempt < self.config.retries => {
                    attempt += 1;
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.config.retries + 1,
                        url,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
