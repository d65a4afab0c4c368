use crate::scrapers::traits::{FetchError, PageFetcher};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DISMISS_POPUPS_JS: &str = r#"
    (() => {
        const labels = ['got it', 'accept', 'ok'];
        const buttons = Array.from(document.querySelectorAll('button'));
        const button = buttons.find(b => labels.includes(b.innerText.trim().toLowerCase()));
        if (button) { button.click(); return true; }
        return false;
    })()
"#;

const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight); true";

/// Settings for the headless Chrome instance
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome binary to launch; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    pub window_size: (u32, u32),
    /// Selector whose presence means the listings have rendered
    pub ready_selector: String,
    /// Selector whose presence means a listing's own page has rendered
    pub detail_ready_selector: String,
    /// Upper bound for navigation and for the ready selector to appear
    pub timeout: Duration,
    /// Extra settle time after the listings appear
    pub render_wait: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_size: (1920, 1080),
            ready_selector: "div[itemprop='itemListElement']".to_string(),
            detail_ready_selector: "h1".to_string(),
            timeout: Duration::from_secs(30),
            render_wait: Duration::from_millis(1500),
        }
    }
}

/// Page fetcher backed by headless Chrome.
///
/// Owns the browser process; dropping the fetcher shuts Chrome down, so the
/// child process is released on every exit path. The CDP calls block, so each
/// page load runs on tokio's blocking pool.
pub struct BrowserFetcher {
    browser: Browser,
    settings: BrowserSettings,
}

impl BrowserFetcher {
    /// Launch Chrome with the given settings
    pub fn launch(settings: BrowserSettings) -> Result<Self, FetchError> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(false)
            .window_size(Some(settings.window_size))
            .path(settings.chrome_path.clone())
            .idle_browser_timeout(settings.timeout * 2)
            .build()
            .map_err(|e| FetchError::Launch(format!("bad launch options: {}", e)))?;

        let browser = Browser::new(options).map_err(|e| FetchError::Launch(e.to_string()))?;

        Ok(Self { browser, settings })
    }

    async fn fetch_in_tab(&self, url: &Url, ready_selector: &str) -> Result<String, FetchError> {
        let browser = self.browser.clone();
        let settings = self.settings.clone();
        let target = url.clone();
        let ready_selector = ready_selector.to_string();

        run_blocking(url, move || {
            load_in_new_tab(&browser, &settings, &target, &ready_selector)
        })
        .await
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self.fetch_in_tab(url, &self.settings.ready_selector).await
    }

    async fn fetch_detail(&self, url: &Url) -> Result<String, FetchError> {
        self.fetch_in_tab(url, &self.settings.detail_ready_selector)
            .await
    }

    fn source_name(&self) -> &'static str {
        "headless-chrome"
    }
}

/// Run a blocking browser job off the async workers
async fn run_blocking<T, F>(url: &Url, job: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| FetchError::Content {
            url: url.to_string(),
            message: format!("browser task failed: {}", e),
        })?
}

fn load_in_new_tab(
    browser: &Browser,
    settings: &BrowserSettings,
    url: &Url,
    ready_selector: &str,
) -> Result<String, FetchError> {
    let tab = browser.new_tab().map_err(|e| FetchError::Navigation {
        url: url.to_string(),
        message: format!("could not open tab: {}", e),
    })?;

    let result = load(&tab, settings, url, ready_selector);

    if let Err(e) = tab.close(true) {
        warn!("Failed to close tab for {}: {}", url, e);
    }

    result
}

fn load(
    tab: &Arc<Tab>,
    settings: &BrowserSettings,
    url: &Url,
    ready_selector: &str,
) -> Result<String, FetchError> {
    let target = url.as_str();
    tab.set_default_timeout(settings.timeout);

    tab.navigate_to(target).map_err(|e| FetchError::Navigation {
        url: target.to_string(),
        message: e.to_string(),
    })?;
    tab.wait_until_navigated()
        .map_err(|e| wait_error(target, e, settings.timeout))?;

    match tab.evaluate(DISMISS_POPUPS_JS, false) {
        Ok(result) => {
            if result.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                debug!("Dismissed popup on {}", target);
            }
        }
        Err(e) => debug!("Popup check failed on {}: {}", target, e),
    }

    tab.wait_for_element_with_custom_timeout(ready_selector, settings.timeout)
        .map_err(|e| wait_error(target, e, settings.timeout))?;

    // Lazy loaded cards only render once scrolled into view
    if let Err(e) = tab.evaluate(SCROLL_TO_BOTTOM_JS, false) {
        debug!("Scroll failed on {}: {}", target, e);
    }
    thread::sleep(settings.render_wait);

    let html = tab.get_content().map_err(|e| FetchError::Content {
        url: target.to_string(),
        message: e.to_string(),
    })?;
    debug!("Downloaded {} bytes of HTML from {}", html.len(), target);

    Ok(html)
}

/// A wait that ran out of time is a timeout; anything else broke the page load
fn wait_error(url: &str, err: anyhow::Error, waited: Duration) -> FetchError {
    if err.downcast_ref::<headless_chrome::util::Timeout>().is_some() {
        FetchError::Timeout {
            url: url.to_string(),
            waited_ms: waited.as_millis() as u64,
        }
    } else {
        FetchError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://www.airbnb.com/s/Lisbon/homes").unwrap()
    }

    #[test]
    fn test_default_settings_wait_for_listing_cards() {
        let settings = BrowserSettings::default();
        assert!(settings.headless);
        assert_eq!(settings.ready_selector, "div[itemprop='itemListElement']");
        assert_eq!(settings.detail_ready_selector, "h1");
        assert!(settings.render_wait < settings.timeout);
    }

    #[test]
    fn test_wait_timeout_is_reported_as_timeout() {
        let err = wait_error(
            url().as_str(),
            anyhow::Error::new(headless_chrome::util::Timeout),
            Duration::from_secs(30),
        );
        assert!(matches!(err, FetchError::Timeout { waited_ms: 30_000, .. }));
    }

    #[test]
    fn test_other_wait_failures_are_navigation_errors() {
        let err = wait_error(
            url().as_str(),
            anyhow::anyhow!("connection to browser closed"),
            Duration::from_secs(30),
        );
        match err {
            FetchError::Navigation { message, .. } => {
                assert!(message.contains("connection to browser closed"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_job_result_passes_through() {
        let html = run_blocking(&url(), || Ok::<_, FetchError>("<html></html>".to_string()))
            .await
            .unwrap();
        assert_eq!(html, "<html></html>");
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_content_error() {
        let err = run_blocking::<String, _>(&url(), || panic!("tab crashed"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Content { .. }));
    }

    #[tokio::test]
    #[ignore = "needs a local Chrome install and network access"]
    async fn test_fetch_live_results_page() {
        let fetcher = BrowserFetcher::launch(BrowserSettings::default()).unwrap();
        let url = crate::scrapers::SearchQuery::for_location("Lisbon")
            .unwrap()
            .page_url(1)
            .unwrap();

        let html = fetcher.fetch(&url).await.unwrap();
        assert!(html.contains("itemListElement"));
    }
}
