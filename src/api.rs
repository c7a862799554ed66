use actix_web::{web, HttpResponse, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use crate::config::{ScrapeDefaults, ScraperConfig};
use crate::error::ScrapeError;
use crate::fetcher::{HttpFetcher, PageSource};
use crate::models::{ProductRecord, ScrapeRequest};
use crate::pagination::ProductScraper;

pub struct AppState<S = HttpFetcher> {
    pub scraper: ProductScraper<S>,
    pub defaults: ScrapeDefaults,
    /// Bounds how often scrapes are started across all callers.
    pub limiter: DefaultDirectRateLimiter,
}

impl<S: PageSource> AppState<S> {
    pub fn new(scraper: ProductScraper<S>, config: &ScraperConfig) -> Self {
        let per_minute =
            NonZeroU32::new(config.server.max_scrapes_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            scraper,
            defaults: config.defaults.clone(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, alias = "start_page")]
    pub page: Option<u32>,
    #[serde(default, alias = "max_products")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub products: Vec<ProductRecord>,
    pub page: u32,
    pub limit: usize,
    pub has_more: bool,
}

impl ScrapeResponse {
    /// The controller may overshoot `limit` by part of a page; the envelope
    /// never does.
    pub fn new(mut products: Vec<ProductRecord>, page: u32, limit: usize) -> Self {
        products.truncate(limit);
        let has_more = products.len() == limit;
        Self {
            products,
            page,
            limit,
            has_more,
        }
    }
}

fn error_body(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

pub fn configure<S: PageSource + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health_check))
        .route("/scrape", web::get().to(scrape_handler::<S>));
}

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "listing-scraper"
    })))
}

pub async fn scrape_handler<S: PageSource + 'static>(
    state: web::Data<AppState<S>>,
    query: web::Query<ScrapeQuery>,
) -> Result<HttpResponse> {
    let search_term = match query.query.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => term.to_string(),
        _ => return Ok(HttpResponse::BadRequest().json(error_body("Query is required"))),
    };

    let page = query.page.unwrap_or(state.defaults.start_page);
    let limit = query.limit.unwrap_or(state.defaults.max_products);
    let max_pages = query.max_pages.unwrap_or(state.defaults.max_pages);

    let request = ScrapeRequest::new(search_term, limit, max_pages).starting_at(page);
    if let Err(message) = request.validate() {
        return Ok(HttpResponse::BadRequest().json(error_body(message)));
    }

    if state.limiter.check().is_err() {
        log::warn!("Rejecting scrape for '{}': rate limit exceeded", request.search_term);
        return Ok(HttpResponse::TooManyRequests().json(error_body(
            "Too many scrape requests, please try again later",
        )));
    }

    log::info!(
        "Received scrape request for '{}' (page {}, limit {})",
        request.search_term,
        page,
        limit
    );

    match state.scraper.scrape(&request).await {
        Ok(records) => Ok(HttpResponse::Ok().json(ScrapeResponse::new(records, page, limit))),
        Err(e) => {
            log::error!("Scraping failed: {}", e);
            Ok(error_response(&e))
        }
    }
}

fn error_response(error: &ScrapeError) -> HttpResponse {
    match error {
        ScrapeError::InvalidRequest(_) => HttpResponse::BadRequest().json(error_body(error.to_string())),
        ScrapeError::NoResults {
            pages_attempted,
            pages_blocked,
        } => HttpResponse::NotFound().json(serde_json::json!({
            "error": error.to_string(),
            "pagesAttempted": pages_attempted,
            "pagesBlocked": pages_blocked,
        })),
        ScrapeError::Network(_) => {
            HttpResponse::ServiceUnavailable().json(error_body(error.to_string()))
        }
        ScrapeError::Config(_) => {
            HttpResponse::InternalServerError().json(error_body("Internal server error"))
        }
    }
}
