use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stay_scout::input::{prompt_non_empty, prompt_page_count};
use stay_scout::output::{self, OutputFormat, OutputOptions, DEFAULT_PREFIX};
use stay_scout::runner::{
    keep_partial, PageFailurePolicy, RunReport, Runner, RunnerConfig, DEFAULT_PAGES,
};
use stay_scout::scrapers::types::DEFAULT_PAGE_SIZE;
use stay_scout::scrapers::{
    BrowserFetcher, BrowserSettings, DetailExtractor, HttpFetcher, ListingExtractor,
    ListingSelectors, PageFetcher, SearchParams, SearchQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetcherKind {
    /// Render pages in headless Chrome
    Browser,
    /// Plain HTTP GET, no JavaScript
    Http,
}

#[derive(Parser)]
#[command(name = "stay-scout")]
#[command(about = "Scrape search result listings into a timestamped CSV file", long_about = None)]
struct Cli {
    /// City or area to search, prompted for when missing
    #[arg(short, long, env = "SCOUT_LOCATION")]
    location: Option<String>,

    /// Complete search URL to page through instead of a location
    #[arg(long, conflicts_with = "location")]
    url: Option<String>,

    /// Number of result pages, prompted for when missing
    #[arg(short, long)]
    pages: Option<u32>,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    #[arg(long, value_enum, default_value_t = FetcherKind::Browser)]
    fetcher: FetcherKind,

    #[arg(long, value_enum, default_value_t = PageFailurePolicy::Skip)]
    policy: PageFailurePolicy,

    #[arg(long, default_value_t = 0)]
    retries: u32,

    #[arg(long, default_value_t = 2000)]
    retry_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    page_delay_ms: u64,

    #[arg(long, default_value_t = 1500)]
    render_wait_ms: u64,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Show the browser window
    #[arg(long, default_value_t = false)]
    headful: bool,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Also open every listing's own page for guests, rooms and stay price
    /// (written to JSON output only)
    #[arg(long, default_value_t = false)]
    details: bool,

    /// JSON file overriding the listing selectors
    #[arg(long)]
    selectors: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Single ASCII character, or "tab"
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,

    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Never prompt; fail when no location is given
    #[arg(long, default_value_t = false)]
    no_prompt: bool,
}

fn parse_delimiter(raw: &str) -> Result<u8, String> {
    match raw {
        "tab" | "\\t" => Ok(b'\t'),
        _ => match raw.as_bytes() {
            [byte] if byte.is_ascii() && *byte != b'"' && *byte != b'\n' => Ok(*byte),
            _ => Err(format!("'{}' is not a single ASCII delimiter", raw)),
        },
    }
}

fn resolve_search(cli: &Cli) -> Result<(SearchQuery, u32)> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let mut params = SearchParams {
        location: cli.location.clone(),
        search_url: cli.url.clone(),
        page_size: cli.page_size,
        ..Default::default()
    };

    if params.location.is_none() && params.search_url.is_none() {
        if cli.no_prompt {
            bail!("No location given; pass --location or --url");
        }
        params.location = Some(prompt_non_empty(
            &mut input,
            &mut output,
            "Enter the location to search: ",
        )?);
    }

    let pages = match cli.pages {
        Some(pages) => pages,
        None if cli.no_prompt => DEFAULT_PAGES,
        None => prompt_page_count(&mut input, &mut output, DEFAULT_PAGES)?,
    };

    let query = params.into_query().context("Invalid search")?;
    Ok((query, pages))
}

async fn scrape<F: PageFetcher>(
    fetcher: F,
    extractor: ListingExtractor,
    details: Option<DetailExtractor>,
    config: RunnerConfig,
    query: &SearchQuery,
) -> Result<RunReport> {
    let runner = Runner::new(fetcher, extractor, config);
    let runner = match details {
        Some(details) => runner.with_details(details),
        None => runner,
    };
    runner.run(query).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("🏠 Stay Scout - listing scraper");
    info!("==============================");

    let (query, pages) = resolve_search(&cli)?;

    let selectors = match &cli.selectors {
        Some(path) => ListingSelectors::from_json_file(path)?,
        None => ListingSelectors::default(),
    };
    let extractor = ListingExtractor::new(&selectors)?;
    let details = if cli.details {
        if cli.format != OutputFormat::Json {
            warn!("Listing details are only written with --format json");
        }
        Some(DetailExtractor::new(&selectors.details)?)
    } else {
        None
    };

    let config = RunnerConfig {
        pages,
        policy: cli.policy,
        retries: cli.retries,
        retry_delay: Duration::from_millis(cli.retry_delay_ms),
        page_delay: Duration::from_millis(cli.page_delay_ms),
    };
    let timeout = Duration::from_secs(cli.timeout_secs);

    let result = if pages == 0 {
        info!("Page count is 0, nothing to fetch");
        Ok(RunReport::default())
    } else {
        match cli.fetcher {
            FetcherKind::Browser => {
                let settings = BrowserSettings {
                    headless: !cli.headful,
                    chrome_path: cli.chrome_path.clone(),
                    ready_selector: selectors.container.clone(),
                    timeout,
                    render_wait: Duration::from_millis(cli.render_wait_ms),
                    ..Default::default()
                };
                let fetcher =
                    BrowserFetcher::launch(settings).context("Failed to launch Chrome browser")?;
                scrape(fetcher, extractor, details, config, &query).await
            }
            FetcherKind::Http => {
                let fetcher = HttpFetcher::new(timeout)?;
                scrape(fetcher, extractor, details, config, &query).await
            }
        }
    };
    let (report, aborted) = keep_partial(result)?;

    let options = OutputOptions {
        dir: cli.output_dir.clone(),
        prefix: cli.prefix.clone(),
        format: cli.format,
        delimiter: cli.delimiter,
    };
    let path = output::save(&report.listings, &options, Local::now())?;

    println!();
    println!("Scraped {} listings", report.listings.len());
    println!("   Pages scraped: {}", report.pages_scraped);
    if !report.skipped_pages.is_empty() {
        println!("   Pages skipped: {:?}", report.skipped_pages);
    }
    println!("   Output: {}", path.display());

    if let Some(aborted) = aborted {
        return Err(anyhow::Error::new(aborted)
            .context(format!("Partial results saved to {}", path.display())));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(","), Ok(b','));
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("\"").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["stay-scout", "--location", "Lisbon"]).unwrap();
        assert_eq!(cli.location.as_deref(), Some("Lisbon"));
        assert_eq!(cli.pages, None);
        assert_eq!(cli.fetcher, FetcherKind::Browser);
        assert_eq!(cli.policy, PageFailurePolicy::Skip);
        assert_eq!(cli.delimiter, b',');
        assert_eq!(cli.format, OutputFormat::Csv);
        assert!(!cli.details);
    }

    #[test]
    fn test_location_and_url_conflict() {
        let result = Cli::try_parse_from([
            "stay-scout",
            "--location",
            "Lisbon",
            "--url",
            "https://www.airbnb.com/s/Lisbon/homes",
        ]);
        assert!(result.is_err());
    }
}
