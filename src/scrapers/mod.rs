pub mod browser;
pub mod details;
pub mod extractor;
pub mod http;
pub mod traits;
pub mod types;

pub use browser::{BrowserFetcher, BrowserSettings};
pub use details::{DetailExtractor, DetailSelectors};
pub use extractor::{ListingExtractor, ListingSelectors};
pub use http::HttpFetcher;
pub use traits::{FetchError, PageFetcher};
pub use types::{QueryError, SearchParams, SearchQuery};
