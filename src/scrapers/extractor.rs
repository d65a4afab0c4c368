use crate::models::Listing;
use crate::scrapers::details::DetailSelectors;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// CSS selector for one field, optionally reading an attribute instead of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub css: String,
    #[serde(default)]
    pub attr: Option<String>,
}

impl FieldSelector {
    fn text(css: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: None,
        }
    }

    fn attr(css: &str, attr: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: Some(attr.to_string()),
        }
    }
}

/// Where each listing field lives in the results page markup.
///
/// The defaults match the current search results markup. Class names on the
/// site change often, so the whole set can be replaced from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Repeated element wrapping one listing
    pub container: String,
    pub title: FieldSelector,
    pub url: FieldSelector,
    pub price: FieldSelector,
    /// Text carrying both the rating and the review count
    pub rating: FieldSelector,
    pub property_type: FieldSelector,
    pub amenities: FieldSelector,
    /// Used only when detail pages are scraped
    pub details: DetailSelectors,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            container: "div[itemprop='itemListElement']".to_string(),
            title: FieldSelector::attr("meta[itemprop='name']", "content"),
            url: FieldSelector::attr("meta[itemprop='url']", "content"),
            price: FieldSelector::text("span._tyxjp1"),
            rating: FieldSelector::text("span[class*='r1dxllyb']"),
            property_type: FieldSelector::text("div[class*='t1jojoys']"),
            amenities: FieldSelector::text("div[class*='f15liw5s']"),
            details: DetailSelectors::default(),
        }
    }
}

impl ListingSelectors {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selectors file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse selectors file: {}", path.display()))
    }
}

struct CompiledField {
    selector: Selector,
    attr: Option<String>,
}

impl CompiledField {
    fn compile(name: &str, field: &FieldSelector) -> Result<Self> {
        Ok(Self {
            selector: compile_selector(name, &field.css)?,
            attr: field.attr.clone(),
        })
    }

    fn first(&self, listing: ElementRef) -> Option<String> {
        let found = listing.select(&self.selector).next()?;
        self.read(found)
    }

    fn all(&self, listing: ElementRef) -> Vec<String> {
        listing
            .select(&self.selector)
            .filter_map(|found| self.read(found))
            .collect()
    }

    fn read(&self, found: ElementRef) -> Option<String> {
        match &self.attr {
            Some(attr) => found.value().attr(attr).map(collapse_whitespace),
            None => Some(collapse_whitespace(&found.text().collect::<Vec<_>>().join(" "))),
        }
    }
}

/// Turns a rendered results page into listing records
pub struct ListingExtractor {
    container: Selector,
    title: CompiledField,
    url: CompiledField,
    price: CompiledField,
    rating: CompiledField,
    property_type: CompiledField,
    amenities: CompiledField,
}

impl ListingExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            container: compile_selector("container", &selectors.container)?,
            title: CompiledField::compile("title", &selectors.title)?,
            url: CompiledField::compile("url", &selectors.url)?,
            price: CompiledField::compile("price", &selectors.price)?,
            rating: CompiledField::compile("rating", &selectors.rating)?,
            property_type: CompiledField::compile("property_type", &selectors.property_type)?,
            amenities: CompiledField::compile("amenities", &selectors.amenities)?,
        })
    }

    /// Extract every listing on the page.
    ///
    /// Fields are read independently, so a listing missing its price still
    /// produces a record. Containers where no field at all could be read are
    /// skipped.
    pub fn extract(&self, html: &str, page_url: &Url) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for (idx, container) in document.select(&self.container).enumerate() {
            let listing = self.extract_one(container, page_url);
            if listing.is_blank() {
                debug!("Skipped listing {}: no readable fields", idx);
                continue;
            }
            debug!("Processing: {:?}", listing.title);
            listings.push(listing);
        }

        listings
    }

    fn extract_one(&self, container: ElementRef, page_url: &Url) -> Listing {
        let (rating, reviews) = match self.rating.first(container) {
            Some(text) => parse_rating(&text),
            None => (None, None),
        };

        let amenities = {
            let found = self.amenities.all(container);
            if found.is_empty() {
                None
            } else {
                Some(
                    found
                        .iter()
                        .flat_map(|text| text.split('·'))
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
        };

        Listing {
            title: self.title.first(container),
            url: self
                .url
                .first(container)
                .map(|raw| normalize_url(&raw, page_url)),
            price: self.price.first(container),
            rating,
            reviews,
            property_type: self.property_type.first(container),
            amenities,
            details: None,
        }
    }
}

fn compile_selector(name: &str, css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid {} selector '{}': {:?}", name, css, e))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+[.,]\d+").expect("valid regex"))
}

fn reviews_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\((\d[\d,]*)\)|(\d[\d,]*)\s+reviews?").expect("valid regex")
    })
}

/// Split rating text such as `4.85 (123)` into rating and review count.
///
/// The review count is removed before the rating is looked for, so a count
/// alone (`3 reviews`, `New · 2 reviews`) never reads as a rating. The rating
/// is the first decimal number left, and only counts on the 0-5 scale.
pub fn parse_rating(text: &str) -> (Option<f32>, Option<u32>) {
    let reviews = reviews_re().captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
    });

    let without_reviews = reviews_re().replace_all(text, " ");
    let rating = decimal_re()
        .find(&without_reviews)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f32>().ok())
        .filter(|value| (0.0..=5.0).contains(value));

    (rating, reviews)
}

/// Make a listing link absolute, resolving it against the results page
pub fn normalize_url(raw: &str, page_url: &Url) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if raw.starts_with("//") {
        return format!("https:{}", raw);
    }
    if raw.starts_with('/') {
        return page_url
            .join(raw)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| raw.to_string());
    }

    let host = raw.split('/').next().unwrap_or("");
    if host.contains('.') && !host.contains(' ') {
        format!("https://{}", raw)
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://www.airbnb.com/s/Lisbon/homes?items_offset=0").unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
        <div itemprop="itemListElement">
            <meta itemprop="name" content="Sunny loft in  Alfama">
            <meta itemprop="url" content="www.airbnb.com/rooms/111?adults=2">
            <div class="t1jojoys dir">Entire loft in Lisbon</div>
            <span class="_tyxjp1">€95</span>
            <span class="r1dxllyb dir">4.87 (212)</span>
            <div class="f15liw5s">Wifi · Kitchen · Washer</div>
        </div>
        <div itemprop="itemListElement">
            <meta itemprop="name" content="Room near the river">
            <meta itemprop="url" content="/rooms/222">
            <div class="t1jojoys">Private room</div>
            <span class="r1dxllyb">New</span>
        </div>
        <div itemprop="itemListElement">
            <p>advert</p>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extracts_all_fields() {
        let extractor = ListingExtractor::new(&ListingSelectors::default()).unwrap();
        let listings = extractor.extract(PAGE, &page_url());

        assert_eq!(listings.len(), 2);
        let first = &listings[0];
        assert_eq!(first.title.as_deref(), Some("Sunny loft in Alfama"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.airbnb.com/rooms/111?adults=2")
        );
        assert_eq!(first.price.as_deref(), Some("€95"));
        assert_eq!(first.rating, Some(4.87));
        assert_eq!(first.reviews, Some(212));
        assert_eq!(first.property_type.as_deref(), Some("Entire loft in Lisbon"));
        assert_eq!(
            first.amenities,
            Some(vec![
                "Wifi".to_string(),
                "Kitchen".to_string(),
                "Washer".to_string()
            ])
        );
    }

    #[test]
    fn test_missing_price_keeps_record() {
        let extractor = ListingExtractor::new(&ListingSelectors::default()).unwrap();
        let listings = extractor.extract(PAGE, &page_url());

        let second = &listings[1];
        assert_eq!(second.title.as_deref(), Some("Room near the river"));
        assert_eq!(second.url.as_deref(), Some("https://www.airbnb.com/rooms/222"));
        assert!(second.price.is_none());
        assert!(second.rating.is_none());
        assert!(second.reviews.is_none());
        assert!(second.amenities.is_none());
    }

    #[test]
    fn test_page_without_listings() {
        let extractor = ListingExtractor::new(&ListingSelectors::default()).unwrap();
        let listings = extractor.extract("<html><body></body></html>", &page_url());
        assert!(listings.is_empty());
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let selectors = ListingSelectors {
            container: "div[".to_string(),
            ..Default::default()
        };
        let err = ListingExtractor::new(&selectors).err().unwrap();
        assert!(err.to_string().contains("container"));
    }

    #[test]
    fn test_selectors_from_partial_json() {
        let json = r#"{ "price": { "css": "span.price" } }"#;
        let selectors: ListingSelectors = serde_json::from_str(json).unwrap();
        assert_eq!(selectors.price, FieldSelector::text("span.price"));
        assert_eq!(selectors.container, ListingSelectors::default().container);
        assert_eq!(selectors.details, DetailSelectors::default());
    }

    #[test]
    fn test_parse_rating_formats() {
        assert_eq!(parse_rating("4.85 (123)"), (Some(4.85), Some(123)));
        assert_eq!(
            parse_rating("4.92 out of 5 average rating, 1,204 reviews"),
            (Some(4.92), Some(1204))
        );
        assert_eq!(parse_rating("4,7 (18)"), (Some(4.7), Some(18)));
        assert_eq!(parse_rating("New"), (None, None));
        assert_eq!(parse_rating("(40)"), (None, Some(40)));
        assert_eq!(parse_rating("4.92 (1,204)"), (Some(4.92), Some(1204)));
    }

    #[test]
    fn test_review_count_alone_is_not_a_rating() {
        assert_eq!(parse_rating("1,204 reviews"), (None, Some(1204)));
        assert_eq!(parse_rating("3 reviews"), (None, Some(3)));
        assert_eq!(parse_rating("New · 2 reviews"), (None, Some(2)));
        assert_eq!(parse_rating("1 review"), (None, Some(1)));
        assert_eq!(parse_rating("Rated 5 stars"), (None, None));
    }

    #[test]
    fn test_normalize_url() {
        let base = page_url();
        assert_eq!(
            normalize_url("https://example.com/a", &base),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("//www.airbnb.com/rooms/1", &base),
            "https://www.airbnb.com/rooms/1"
        );
        assert_eq!(
            normalize_url("/rooms/1", &base),
            "https://www.airbnb.com/rooms/1"
        );
        assert_eq!(
            normalize_url("www.airbnb.com/rooms/1", &base),
            "https://www.airbnb.com/rooms/1"
        );
        assert_eq!(normalize_url("", &base), "");
    }
}
