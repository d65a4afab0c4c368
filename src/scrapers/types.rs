use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Search results site used when only a location is given
pub const DEFAULT_BASE_URL: &str = "https://www.airbnb.com/s/";

/// Listings the site shows per results page
pub const DEFAULT_PAGE_SIZE: u32 = 18;

/// Query parameter carrying the pagination offset
pub const OFFSET_PARAM: &str = "items_offset";

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("location must not be empty")]
    EmptyLocation,
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Search parameters for listing scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// City or area to search in, used as a URL path segment
    pub location: Option<String>,
    /// Complete search URL, takes precedence over `location`
    pub search_url: Option<String>,
    /// Base of the search URL built from `location`
    pub base_url: String,
    /// Listings per results page, drives the pagination offset
    pub page_size: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            location: None,
            search_url: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchParams {
    pub fn into_query(self) -> Result<SearchQuery, QueryError> {
        let target = match (self.search_url, self.location) {
            (Some(url), _) => SearchTarget::Url(parse_url(&url)?),
            (None, Some(location)) => {
                let location = location.trim();
                if location.is_empty() {
                    return Err(QueryError::EmptyLocation);
                }
                SearchTarget::Location {
                    base: parse_url(&self.base_url)?,
                    location: location.to_string(),
                }
            }
            (None, None) => return Err(QueryError::EmptyLocation),
        };

        Ok(SearchQuery {
            target,
            page_size: self.page_size.max(1),
        })
    }
}

#[derive(Debug, Clone)]
enum SearchTarget {
    Location { base: Url, location: String },
    Url(Url),
}

/// A validated search that can produce the URL of any results page
#[derive(Debug, Clone)]
pub struct SearchQuery {
    target: SearchTarget,
    page_size: u32,
}

impl SearchQuery {
    pub fn for_location(location: &str) -> Result<Self, QueryError> {
        SearchParams {
            location: Some(location.to_string()),
            ..Default::default()
        }
        .into_query()
    }

    pub fn for_search_url(url: &str) -> Result<Self, QueryError> {
        SearchParams {
            search_url: Some(url.to_string()),
            ..Default::default()
        }
        .into_query()
    }

    /// URL of the 1-based results page `page`
    pub fn page_url(&self, page: u32) -> Result<Url, QueryError> {
        if page == 0 {
            return Err(QueryError::InvalidPage);
        }
        let offset = (page - 1) as u64 * self.page_size as u64;

        let mut url = match &self.target {
            SearchTarget::Location { base, location } => {
                let mut url = base.clone();
                url.path_segments_mut()
                    .map_err(|_| QueryError::InvalidUrl {
                        url: base.to_string(),
                        reason: "cannot hold path segments".to_string(),
                    })?
                    .pop_if_empty()
                    .push(location)
                    .push("homes");
                url
            }
            SearchTarget::Url(url) => url.clone(),
        };

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != OFFSET_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(OFFSET_PARAM, &offset.to_string());

        Ok(url)
    }

    /// Short human readable label for logs
    pub fn describe(&self) -> String {
        match &self.target {
            SearchTarget::Location { location, .. } => location.clone(),
            SearchTarget::Url(url) => url.to_string(),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, QueryError> {
    Url::parse(raw.trim()).map_err(|e| QueryError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
