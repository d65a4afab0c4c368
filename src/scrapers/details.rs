use crate::models::ListingDetails;
use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Where the detail page fields live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    pub name: String,
    /// Items of the "4 guests · 2 bedrooms · 3 beds · 1 bath" overview
    pub overview_items: String,
    pub total_price: String,
    /// Booking sidebar, searched for "N nights"
    pub booking: String,
    /// Reviews section, searched for the "Location 4.9" category score
    pub reviews: String,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            name: "h1".to_string(),
            overview_items: "div[data-section-id^='OVERVIEW_DEFAULT'] ol li".to_string(),
            total_price: "div[data-section-id='BOOK_IT_SIDEBAR'] span._tyxjp1".to_string(),
            booking: "div[data-section-id='BOOK_IT_SIDEBAR']".to_string(),
            reviews: "div[data-section-id^='REVIEWS_DEFAULT']".to_string(),
        }
    }
}

/// Reads a listing's own page into `ListingDetails`, one field at a time
pub struct DetailExtractor {
    name: Selector,
    overview_items: Selector,
    total_price: Selector,
    booking: Selector,
    reviews: Selector,
}

impl DetailExtractor {
    pub fn new(selectors: &DetailSelectors) -> Result<Self> {
        Ok(Self {
            name: compile("name", &selectors.name)?,
            overview_items: compile("overview_items", &selectors.overview_items)?,
            total_price: compile("total_price", &selectors.total_price)?,
            booking: compile("booking", &selectors.booking)?,
            reviews: compile("reviews", &selectors.reviews)?,
        })
    }

    pub fn extract(&self, html: &str) -> ListingDetails {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut details = ListingDetails {
            name: first_text(root, &self.name),
            total_price: first_text(root, &self.total_price),
            ..Default::default()
        };

        for item in root.select(&self.overview_items) {
            let text = element_text(item).to_lowercase();
            let number = first_number(&text);
            if text.contains("guest") {
                details.guests = number.map(|n| n as u32);
            } else if text.contains("bedroom") {
                details.bedrooms = number.map(|n| n as u32);
            } else if text.contains("bath") {
                details.baths = number;
            } else if text.contains("bed") {
                details.beds = number.map(|n| n as u32);
            }
        }

        details.nights = first_text(root, &self.booking).and_then(|text| {
            nights_re()
                .captures(&text)
                .and_then(|caps| caps[1].parse::<u32>().ok())
        });

        let reviews_text = first_text(root, &self.reviews).unwrap_or_else(|| element_text(root));
        details.location_rating = location_re()
            .captures(&reviews_text)
            .and_then(|caps| caps[1].replace(',', ".").parse::<f32>().ok());

        details.price_per_night = price_per_night(details.total_price.as_deref(), details.nights);
        details
    }
}

/// Whole-unit nightly price; `None` unless both the total and a non-zero
/// night count are known
pub fn price_per_night(total_price: Option<&str>, nights: Option<u32>) -> Option<u64> {
    let digits: String = total_price?.chars().filter(|c| c.is_ascii_digit()).collect();
    let total = digits.parse::<u64>().ok()?;
    match nights? {
        0 => None,
        n => Some(total / n as u64),
    }
}

fn compile(name: &str, css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid {} selector '{}': {:?}", name, css, e))
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(root: ElementRef, selector: &Selector) -> Option<String> {
    root.select(selector).next().map(element_text)
}

fn first_number(text: &str) -> Option<f32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d*\.?\d+").expect("valid regex"))
        .find(text)
        .and_then(|m| m.as_str().parse::<f32>().ok())
}

fn nights_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s+nights?").expect("valid regex"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)location\s*(\d+[.,]\d+)").expect("valid regex"))
}
