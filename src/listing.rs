use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::{SelectorConfig, SiteConfig};
use crate::error::ConfigError;
use crate::models::{PageResult, ProductRecord};

fn compile(field: &'static str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::Selector {
        field,
        selector: selector.to_string(),
    })
}

/// Finds the result-container nodes of one listing page.
#[derive(Debug, Clone)]
pub struct ListingParser {
    item: Selector,
}

impl ListingParser {
    pub fn new(selectors: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            item: compile("item", &selectors.item)?,
        })
    }

    pub fn parse_document(body: &str) -> Html {
        Html::parse_document(body)
    }

    /// Item nodes in document order. An empty result means the listings
    /// are exhausted; it is never an error.
    pub fn items<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.item).collect()
    }
}

/// Maps one item node to a `ProductRecord`.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    origin: Url,
    link: Selector,
    name: Selector,
    price: Selector,
    image: Selector,
    rating: Selector,
    review_count: Selector,
    availability: Selector,
    prime: Selector,
    discount: Selector,
}

impl FieldExtractor {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        let origin = Url::parse(&site.origin)
            .map_err(|e| ConfigError::Invalid(format!("site.origin {}: {}", site.origin, e)))?;
        let s = &site.selectors;

        Ok(Self {
            origin,
            link: compile("link", &s.link)?,
            name: compile("name", &s.name)?,
            price: compile("price", &s.price)?,
            image: compile("image", &s.image)?,
            rating: compile("rating", &s.rating)?,
            review_count: compile("review_count", &s.review_count)?,
            availability: compile("availability", &s.availability)?,
            prime: compile("prime", &s.prime)?,
            discount: compile("discount", &s.discount)?,
        })
    }

    /// Returns `None` when the name or the price is missing, which is normal
    /// for sponsored and ad slots in a result grid.
    pub fn extract(&self, item: ElementRef<'_>) -> Option<ProductRecord> {
        let name = select_text(item, &self.name)?;
        let price = select_text(item, &self.price)?;

        let mut record = ProductRecord::new(name, price);

        if let Some(href) = item
            .select(&self.link)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
        {
            record.link = self.normalize_link(href);
        }
        if let Some(src) = item
            .select(&self.image)
            .next()
            .and_then(|img| img.value().attr("src"))
        {
            record.image = src.trim().to_string();
        }
        if let Some(rating) = select_text(item, &self.rating) {
            record.rating = rating;
        }
        if let Some(count) = select_text(item, &self.review_count) {
            record.review_count = count;
        }
        if let Some(availability) = select_text(item, &self.availability) {
            record.availability = availability;
        }
        record.is_prime = item.select(&self.prime).next().is_some();
        if let Some(discount) = select_text(item, &self.discount) {
            record.discount = discount;
        }

        Some(record)
    }

    /// Root-relative hrefs are resolved against the site origin; anything
    /// else is kept verbatim.
    pub fn normalize_link(&self, href: &str) -> String {
        if !href.starts_with('/') {
            return href.to_string();
        }
        match self.origin.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.origin.as_str().trim_end_matches('/'), href),
        }
    }
}

fn select_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = item.select(selector).next()?;
    let text: String = element.text().collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// What one page yielded: how many item nodes matched and which of them
/// became records.
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    pub item_count: usize,
    pub records: PageResult,
}

impl PageScan {
    pub fn skipped(&self) -> usize {
        self.item_count - self.records.len()
    }
}

/// Parser and extractor bundled for a whole page body.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    parser: ListingParser,
    fields: FieldExtractor,
}

impl ListingExtractor {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            parser: ListingParser::new(&site.selectors)?,
            fields: FieldExtractor::new(site)?,
        })
    }

    pub fn scan(&self, body: &str) -> PageScan {
        let document = ListingParser::parse_document(body);
        let items = self.parser.items(&document);

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.fields.extract(*item) {
                Some(record) => records.push(record),
                None => log::debug!("Skipping item {}: missing name or price", index + 1),
            }
        }

        PageScan {
            item_count: items.len(),
            records,
        }
    }
}
