use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use listing_scraper::api::{self, AppState};
use listing_scraper::export;
use listing_scraper::{HttpFetcher, ProductScraper, ScrapeRequest, ScraperConfig};

#[derive(Parser)]
#[command(
    name = "listing-scraper",
    about = "Polite, resilient product scraper for paginated search listings",
    version
)]
struct Cli {
    /// Path to a TOML config file. Falls back to $SCRAPER_CONFIG, then defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve,

    /// Scrape one search term and write the products to a JSON file.
    Scrape {
        /// Search term, e.g. "laptop".
        term: String,

        #[arg(long)]
        max_products: Option<usize>,

        #[arg(long)]
        max_pages: Option<u32>,

        #[arg(long)]
        start_page: Option<u32>,

        /// Output file. Defaults to results_<timestamp>.json.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ScraperConfig::load(path)?,
        None => ScraperConfig::from_env()?,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Scrape {
            term,
            max_products,
            max_pages,
            start_page,
            output,
        } => {
            let request = ScrapeRequest::new(
                term,
                max_products.unwrap_or(config.defaults.max_products),
                max_pages.unwrap_or(config.defaults.max_pages),
            )
            .starting_at(start_page.unwrap_or(config.defaults.start_page));

            scrape_once(&config, &request, output).await
        }
    }
}

async fn serve(config: ScraperConfig) -> Result<()> {
    let scraper = ProductScraper::new(&config).context("Failed to create scraper")?;
    let state = web::Data::new(AppState::new(scraper, &config));

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .context("PORT must be a valid number")?;

    log::info!("🚀 Starting listing scraper for {}", config.site.origin);
    log::info!("🌐 Server running at http://{}:{}", host, port);
    log::info!("🔎 Try http://{}:{}/scrape?query=laptop", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(api::configure::<HttpFetcher>)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}

async fn scrape_once(
    config: &ScraperConfig,
    request: &ScrapeRequest,
    output: Option<PathBuf>,
) -> Result<()> {
    log::info!("Starting scrape for search term: {}", request.search_term);

    let scraper = ProductScraper::new(config).context("Failed to create scraper")?;
    let outcome = scraper
        .scrape_with_stats(request)
        .await
        .with_context(|| format!("Scrape failed for '{}'", request.search_term))?;

    let path = output.unwrap_or_else(|| export::default_output_path(chrono::Local::now()));
    export::write_json(&path, &outcome.records)?;

    log::info!(
        "Successfully scraped {} products ({} pages attempted, {} failed, {} blocked)",
        outcome.records.len(),
        outcome.stats.pages_attempted,
        outcome.stats.pages_failed,
        outcome.stats.pages_blocked
    );

    if let Some(first) = outcome.records.first() {
        log::info!("First product details:");
        if let serde_json::Value::Object(fields) = serde_json::to_value(first)? {
            for (key, value) in fields {
                log::info!("{}: {}", key, value);
            }
        }
    }

    Ok(())
}
