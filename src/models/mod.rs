use serde::{Deserialize, Serialize};

/// Text written in place of a field that could not be extracted
pub const PLACEHOLDER: &str = "N/A";

/// Separator used when amenities are flattened into a single column
pub const AMENITY_SEPARATOR: &str = "; ";

/// Output column order
pub const COLUMNS: [&str; 7] = [
    "title",
    "url",
    "price",
    "rating",
    "reviews",
    "property_type",
    "amenities",
];

/// One listing scraped from a search results page.
///
/// Every field is optional: `None` means the field could not be read from the
/// listing markup, while `Some("")` means the element was there but empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub title: Option<String>,
    pub url: Option<String>,
    /// Price exactly as displayed, currency symbol included
    pub price: Option<String>,
    pub rating: Option<f32>,
    pub reviews: Option<u32>,
    pub property_type: Option<String>,
    pub amenities: Option<Vec<String>>,
    /// Read from the listing's own page when detail scraping is enabled.
    /// Only JSON output carries it; the delimited columns stay fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ListingDetails>,
}

/// Fields only shown on a listing's detail page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub name: Option<String>,
    pub guests: Option<u32>,
    pub bedrooms: Option<u32>,
    pub beds: Option<u32>,
    pub baths: Option<f32>,
    /// Price for the whole stay, as displayed
    pub total_price: Option<String>,
    pub nights: Option<u32>,
    /// Whole-currency-unit nightly price derived from `total_price / nights`
    pub price_per_night: Option<u64>,
    pub location_rating: Option<f32>,
}

impl Listing {
    /// True when nothing at all could be read from the listing
    pub fn is_blank(&self) -> bool {
        self.title.is_none()
            && self.url.is_none()
            && self.price.is_none()
            && self.rating.is_none()
            && self.reviews.is_none()
            && self.property_type.is_none()
            && self.amenities.is_none()
            && self.details.is_none()
    }

    /// Render the listing as one output row, in `COLUMNS` order
    pub fn to_row(&self) -> [String; 7] {
        [
            text_or_placeholder(self.title.as_deref()),
            text_or_placeholder(self.url.as_deref()),
            text_or_placeholder(self.price.as_deref()),
            self.rating
                .map(|r| r.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            self.reviews
                .map(|r| r.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            text_or_placeholder(self.property_type.as_deref()),
            match &self.amenities {
                Some(items) => items.join(AMENITY_SEPARATOR),
                None => PLACEHOLDER.to_string(),
            },
        ]
    }
}

fn text_or_placeholder(value: Option<&str>) -> String {
    value.unwrap_or(PLACEHOLDER).to_string()
}
