use serde::{Deserialize, Serialize};

pub const DEFAULT_RATING: &str = "No rating";
pub const DEFAULT_REVIEW_COUNT: &str = "0";
pub const DEFAULT_AVAILABILITY: &str = "Unknown";
pub const DEFAULT_DISCOUNT: &str = "No discount";
/// Link value used when an item carries no link node.
pub const PLACEHOLDER_LINK: &str = "#";

/// One product extracted from a listing page.
///
/// `name` and `price` are never empty; every other field falls back to a
/// documented default when the markup does not carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: String,
    pub link: String,
    pub image: String,
    pub rating: String,
    pub review_count: String,
    pub availability: String,
    pub is_prime: bool,
    pub discount: String,
}

impl ProductRecord {
    /// Builds a record with the required fields set and every optional
    /// field at its default.
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            link: PLACEHOLDER_LINK.to_string(),
            image: String::new(),
            rating: DEFAULT_RATING.to_string(),
            review_count: DEFAULT_REVIEW_COUNT.to_string(),
            availability: DEFAULT_AVAILABILITY.to_string(),
            is_prime: false,
            discount: DEFAULT_DISCOUNT.to_string(),
        }
    }

    /// Key used to recognise the same product seen on two pages.
    pub fn dedup_key(&self) -> String {
        if self.link == PLACEHOLDER_LINK {
            format!("{}\u{1f}{}", self.name, self.price)
        } else {
            self.link.clone()
        }
    }
}

/// Records extracted from a single listing page, in document order.
/// An empty page means the listings are exhausted.
pub type PageResult = Vec<ProductRecord>;

/// Parameters of one scrape invocation. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub search_term: String,
    pub max_products: usize,
    pub start_page: u32,
    pub max_pages: u32,
}

impl ScrapeRequest {
    pub fn new(search_term: impl Into<String>, max_products: usize, max_pages: u32) -> Self {
        Self {
            search_term: search_term.into(),
            max_products,
            start_page: 1,
            max_pages,
        }
    }

    pub fn starting_at(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }

    /// Last page number this request may fetch, inclusive.
    pub fn last_page(&self) -> u32 {
        self.start_page.saturating_add(self.max_pages.saturating_sub(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.search_term.trim().is_empty() {
            return Err("search term must not be empty".to_string());
        }
        if self.max_products == 0 {
            return Err("max_products must be greater than zero".to_string());
        }
        if self.start_page == 0 {
            return Err("start_page must be at least 1".to_string());
        }
        if self.max_pages == 0 {
            return Err("max_pages must be at least 1".to_string());
        }
        Ok(())
    }
}
