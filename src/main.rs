use anyhow::Context;
use souk_scout::api::{handle_query, QueryRequest, QueryResponse};
use souk_scout::config::AppConfig;
use souk_scout::logging::init_logging;
use souk_scout::normalize::Gazetteer;
use souk_scout::orchestrator::{IngestRequest, Orchestrator};
use souk_scout::scrapers::{HttpFetcher, PolitenessDelay};
use souk_scout::store::ListingStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.log_level);

    info!("🏠 Souk Scout - listing ingestion");
    info!("==================================");

    let store = Arc::new(ListingStore::load_snapshot(&config.snapshot_path).await?);
    let fetcher = Arc::new(HttpFetcher::new(config.request_timeout(), &config.user_agent)?);
    let delay = Arc::new(PolitenessDelay::new(config.delay_base(), config.delay_jitter()));

    let orchestrator = Orchestrator::with_default_sources(
        store.clone(),
        fetcher,
        delay,
        Arc::new(Gazetteer::marrakech()),
    )
    .concurrent_sources(config.concurrent_sources)
    .deactivate_missing(config.deactivate_missing);

    let request = IngestRequest {
        source: config.source.clone(),
        city: config.city.clone(),
        property_type: Some(config.property_type.clone()),
        max_pages: config.max_pages,
    };

    info!("Starting scrape of {} in {} ({} pages max)", request.source, request.city, request.max_pages);
    let result = match config.run_deadline() {
        Some(deadline) => orchestrator.run_with_deadline(&request, deadline).await,
        None => orchestrator.run(&request).await,
    };

    // Persist whatever was merged, even when the run was cut short
    store.save_snapshot(&config.snapshot_path).await?;
    let response = result?;

    println!();
    println!("Run {} ({})", response.log_id, response.timestamp);
    for source in &response.results {
        println!(
            "  {:<8} found {:>4}  new {:>4}  updated {:>4}  errors {}",
            source.source,
            source.found,
            source.added,
            source.updated,
            source.errors.len()
        );
        for error in &source.errors {
            println!("           - {}", error);
        }
    }
    println!(
        "  total    found {:>4}  new {:>4}  updated {:>4}  errors {}",
        response.summary.total_found,
        response.summary.new_listings,
        response.summary.updated_listings,
        response.summary.error_count
    );

    if let QueryResponse::Stats(stats) = handle_query(
        &store,
        QueryRequest::Stats {
            city: config.city.clone(),
        },
    )
    .await
    {
        println!();
        println!(
            "{}: {} active listings, avg {} MAD, median {} MAD, {} MAD/m²",
            stats.city, stats.total_listings, stats.avg_price, stats.median_price, stats.avg_price_per_sqm
        );
        for group in &stats.by_property_type {
            println!(
                "   {:<10} {:>4} listings  avg {} MAD  {} MAD/m²",
                group.key, group.count, group.avg_price, group.avg_price_per_sqm
            );
        }
    }

    Ok(())
}
