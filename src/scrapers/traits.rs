use crate::models::{Candidate, Source};
use crate::scrapers::types::{ScrapeBatch, SearchParams};
use async_trait::async_trait;

/// Common contract for all marketplace adapters.
///
/// Failures are reported in-band through [`ScrapeBatch::errors`], so neither
/// method returns a `Result`.
#[async_trait]
pub trait ScraperTrait: Send + Sync {
    /// Walk the paginated listing index and collect candidates
    async fn scrape_listings(&self, params: &SearchParams) -> ScrapeBatch;

    /// Fetch one listing's detail page. `None` on any failure.
    async fn scrape_details(&self, listing_url: &str) -> Option<Candidate>;

    /// Which marketplace this adapter covers
    fn source(&self) -> Source;

    /// Get the name of the scraper source
    fn source_name(&self) -> &'static str {
        self.source().as_str()
    }
}
