use crate::error::PipelineError;
use crate::models::{ScrapeLog, ScrapeLogPatch, ScrapeStatus};
use crate::normalize::Gazetteer;
use crate::scrapers::{
    AvitoScraper, DelayStrategy, MubawabScraper, PageFetcher, ScrapeBatch, ScraperTrait, SearchParams,
};
use crate::store::{ListingStore, MergeCounts};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

pub const MAX_PAGES_LIMIT: u32 = 50;

/// Trigger for one scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Marketplace name or "all"
    pub source: String,
    pub city: String,
    /// Category hint passed to adapters; "all" or absent browses everything
    #[serde(default)]
    pub property_type: Option<String>,
    pub max_pages: u32,
}

/// Per-source outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source: String,
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub total_found: usize,
    pub new_listings: usize,
    pub updated_listings: usize,
    pub error_count: usize,
}

impl IngestSummary {
    fn from_results(results: &[SourceResult]) -> Self {
        Self {
            total_found: results.iter().map(|r| r.found).sum(),
            new_listings: results.iter().map(|r| r.added).sum(),
            updated_listings: results.iter().map(|r| r.updated).sum(),
            error_count: results.iter().map(|r| r.errors.len()).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub log_id: String,
    pub summary: IngestSummary,
    pub results: Vec<SourceResult>,
    pub timestamp: DateTime<Utc>,
}

/// Runs adapters against the store and owns every scrape log it opens
pub struct Orchestrator {
    store: Arc<ListingStore>,
    scrapers: Vec<Arc<dyn ScraperTrait>>,
    concurrent_sources: bool,
    deactivate_missing: bool,
}

impl Orchestrator {
    pub fn new(store: Arc<ListingStore>) -> Self {
        Self {
            store,
            scrapers: Vec::new(),
            concurrent_sources: false,
            deactivate_missing: false,
        }
    }

    /// Orchestrator with the Mubawab and Avito adapters registered
    pub fn with_default_sources(
        store: Arc<ListingStore>,
        fetcher: Arc<dyn PageFetcher>,
        delay: Arc<dyn DelayStrategy>,
        gazetteer: Arc<Gazetteer>,
    ) -> Self {
        let mut orchestrator = Self::new(store);
        orchestrator.register(Arc::new(MubawabScraper::build(
            fetcher.clone(),
            delay.clone(),
            gazetteer.clone(),
        )));
        orchestrator.register(Arc::new(AvitoScraper::build(fetcher, delay, gazetteer)));
        orchestrator
    }

    pub fn register(&mut self, scraper: Arc<dyn ScraperTrait>) {
        self.scrapers.push(scraper);
    }

    /// Run different sources at the same time. Pages of one source stay sequential.
    pub fn concurrent_sources(mut self, enabled: bool) -> Self {
        self.concurrent_sources = enabled;
        self
    }

    /// After a source was scraped to its last page without errors, mark its
    /// listings for the city that were not seen as inactive
    pub fn deactivate_missing(mut self, enabled: bool) -> Self {
        self.deactivate_missing = enabled;
        self
    }

    pub fn store(&self) -> &Arc<ListingStore> {
        &self.store
    }

    pub fn list_sources(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.source_name()).collect()
    }

    pub async fn run(&self, request: &IngestRequest) -> Result<IngestResponse, PipelineError> {
        self.run_until(request, std::future::pending::<()>()).await
    }

    pub async fn run_with_deadline(
        &self,
        request: &IngestRequest,
        deadline: Duration,
    ) -> Result<IngestResponse, PipelineError> {
        self.run_until(request, tokio::time::sleep(deadline)).await
    }

    /// Run until done or until `cancel` resolves.
    ///
    /// Sources merged before cancellation stay merged; the log is closed as
    /// failed either way so it never stays `running`.
    pub async fn run_until<F>(&self, request: &IngestRequest, cancel: F) -> Result<IngestResponse, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let scrapers = self.select_scrapers(request)?;
        let params = SearchParams {
            city: request.city.trim().to_string(),
            category: request
                .property_type
                .as_ref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty() && t != "all"),
            max_pages: request.max_pages,
        };

        let log = ScrapeLog::start(request.source.trim().to_lowercase(), params.city.clone());
        let log_id = log.id.clone();
        self.store.add_scrape_log(log).await;
        info!("Scrape run {} started: {} in {}", log_id, request.source, params.city);

        let results = Mutex::new(Vec::new());
        let outcome = tokio::select! {
            _ = self.scrape_sources(&scrapers, &params, &log_id, &results) => Ok(()),
            _ = cancel => Err(PipelineError::Cancelled),
        };

        let results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        let summary = IngestSummary::from_results(&results);
        let mut errors: Vec<String> = results.iter().flat_map(|r| r.errors.iter().cloned()).collect();

        let status = match &outcome {
            Ok(()) => ScrapeStatus::Completed,
            Err(e) => {
                error!("Scrape run {} aborted: {}", log_id, e);
                errors.push(e.to_string());
                ScrapeStatus::Failed
            }
        };
        self.store
            .update_scrape_log(
                &log_id,
                ScrapeLogPatch {
                    status: Some(status),
                    completed_at: Some(Utc::now()),
                    total_found: Some(summary.total_found),
                    new_listings: Some(summary.new_listings),
                    updated_listings: Some(summary.updated_listings),
                    errors: Some(errors),
                },
            )
            .await;
        outcome?;

        info!(
            "Scrape run {} completed: {} found, {} new, {} updated, {} errors",
            log_id, summary.total_found, summary.new_listings, summary.updated_listings, summary.error_count
        );

        Ok(IngestResponse {
            log_id,
            summary,
            results,
            timestamp: Utc::now(),
        })
    }

    fn select_scrapers(&self, request: &IngestRequest) -> Result<Vec<Arc<dyn ScraperTrait>>, PipelineError> {
        if request.city.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("city is required".to_string()));
        }
        if request.max_pages == 0 || request.max_pages > MAX_PAGES_LIMIT {
            return Err(PipelineError::InvalidRequest(format!(
                "maxPages must be between 1 and {}",
                MAX_PAGES_LIMIT
            )));
        }

        let wanted = request.source.trim().to_lowercase();
        let selected: Vec<_> = self
            .scrapers
            .iter()
            .filter(|s| wanted == "all" || s.source_name() == wanted)
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(PipelineError::UnknownSource(request.source.clone()));
        }
        Ok(selected)
    }

    async fn scrape_sources(
        &self,
        scrapers: &[Arc<dyn ScraperTrait>],
        params: &SearchParams,
        log_id: &str,
        results: &Mutex<Vec<SourceResult>>,
    ) {
        if self.concurrent_sources {
            join_all(
                scrapers
                    .iter()
                    .map(|scraper| self.scrape_source(scraper.as_ref(), params, log_id, results)),
            )
            .await;
        } else {
            for scraper in scrapers {
                self.scrape_source(scraper.as_ref(), params, log_id, results).await;
            }
        }
    }

    async fn scrape_source(
        &self,
        scraper: &dyn ScraperTrait,
        params: &SearchParams,
        log_id: &str,
        results: &Mutex<Vec<SourceResult>>,
    ) {
        let ScrapeBatch {
            listings,
            total_found: found,
            errors,
            exhausted,
        } = scraper.scrape_listings(params).await;
        let seen: HashSet<String> = listings.iter().map(|c| c.id.clone()).collect();
        let clean = errors.is_empty();

        let slot = {
            let mut results = lock(results);
            results.push(SourceResult {
                source: scraper.source_name().to_string(),
                found,
                errors,
                ..Default::default()
            });
            results.len() - 1
        };

        // Counts land in the result right after each merge, so a cancelled
        // run reports exactly what reached the store
        let mut counts = MergeCounts::default();
        for candidate in listings {
            counts.record(self.store.merge(candidate).await);
            let mut results = lock(results);
            results[slot].added = counts.added;
            results[slot].updated = counts.updated;
        }
        info!(
            "{}: {} found, {} added, {} updated",
            scraper.source_name(),
            found,
            counts.added,
            counts.updated
        );

        if self.deactivate_missing {
            if exhausted && clean && found > 0 {
                self.store
                    .deactivate_missing(scraper.source(), &params.city, &seen)
                    .await;
            } else {
                warn!("{}: skipping deactivation, scan was partial", scraper.source_name());
            }
        }

        let patch = {
            let results = lock(results);
            let summary = IngestSummary::from_results(&results);
            ScrapeLogPatch {
                total_found: Some(summary.total_found),
                new_listings: Some(summary.new_listings),
                updated_listings: Some(summary.updated_listings),
                errors: Some(results.iter().flat_map(|r| r.errors.iter().cloned()).collect()),
                ..Default::default()
            }
        };
        self.store.update_scrape_log(log_id, patch).await;
    }
}

fn lock(results: &Mutex<Vec<SourceResult>>) -> MutexGuard<'_, Vec<SourceResult>> {
    results.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, CandidateBuilder, Source};
    use crate::scrapers::ScrapeBatch;
    use async_trait::async_trait;

    struct StaticScraper {
        source: Source,
        batch: ScrapeBatch,
    }

    impl StaticScraper {
        fn new(source: Source, ids: &[&str], errors: &[&str]) -> Self {
            let listings: Vec<Candidate> = ids
                .iter()
                .map(|id| {
                    let mut b = CandidateBuilder::new(source);
                    b.id = Some(id.to_string());
                    b.title = Some(format!("Riad {}", id));
                    b.city = Some("Marrakech".to_string());
                    b.price = 1_000_000;
                    b.build().unwrap()
                })
                .collect();
            Self {
                source,
                batch: ScrapeBatch {
                    total_found: listings.len(),
                    listings,
                    errors: errors.iter().map(|e| e.to_string()).collect(),
                    exhausted: true,
                },
            }
        }
    }

    #[async_trait]
    impl ScraperTrait for StaticScraper {
        async fn scrape_listings(&self, _params: &SearchParams) -> ScrapeBatch {
            self.batch.clone()
        }
        async fn scrape_details(&self, _url: &str) -> Option<Candidate> {
            None
        }
        fn source(&self) -> Source {
            self.source
        }
    }

    struct HangingScraper;

    #[async_trait]
    impl ScraperTrait for HangingScraper {
        async fn scrape_listings(&self, _params: &SearchParams) -> ScrapeBatch {
            std::future::pending::<()>().await;
            ScrapeBatch::default()
        }
        async fn scrape_details(&self, _url: &str) -> Option<Candidate> {
            None
        }
        fn source(&self) -> Source {
            Source::Avito
        }
    }

    fn request(source: &str) -> IngestRequest {
        IngestRequest {
            source: source.to_string(),
            city: "Marrakech".to_string(),
            property_type: Some("all".to_string()),
            max_pages: 2,
        }
    }

    fn orchestrator(store: Arc<ListingStore>) -> Orchestrator {
        let mut o = Orchestrator::new(store);
        o.register(Arc::new(StaticScraper::new(Source::Mubawab, &["m1", "m2"], &["page 2: timeout"])));
        o.register(Arc::new(StaticScraper::new(Source::Avito, &["a1"], &[])));
        o
    }

    #[tokio::test]
    async fn run_sums_sources_and_completes_log() {
        let store = Arc::new(ListingStore::new());
        let response = orchestrator(store.clone()).run(&request("all")).await.unwrap();

        assert_eq!(response.results.len(), 2);
        assert_eq!(
            response.summary,
            IngestSummary {
                total_found: 3,
                new_listings: 3,
                updated_listings: 0,
                error_count: 1
            }
        );

        let logs = store.get_scrape_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, response.log_id);
        assert_eq!(logs[0].status, ScrapeStatus::Completed);
        assert_eq!(logs[0].new_listings, 3);
        assert_eq!(logs[0].errors, vec!["page 2: timeout"]);
        assert!(logs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn single_source_and_rerun_updates() {
        let store = Arc::new(ListingStore::new());
        let o = orchestrator(store.clone()).concurrent_sources(true);

        let first = o.run(&request("Avito")).await.unwrap();
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.summary.new_listings, 1);

        let second = o.run(&request("all")).await.unwrap();
        assert_eq!(second.summary.new_listings, 2);
        assert_eq!(second.summary.updated_listings, 1);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn malformed_requests_fail_before_logging() {
        let store = Arc::new(ListingStore::new());
        let o = orchestrator(store.clone());

        assert!(matches!(o.run(&request("leboncoin")).await, Err(PipelineError::UnknownSource(_))));

        let mut bad = request("all");
        bad.max_pages = 0;
        assert!(matches!(o.run(&bad).await, Err(PipelineError::InvalidRequest(_))));

        let mut bad = request("all");
        bad.city = " ".to_string();
        assert!(matches!(o.run(&bad).await, Err(PipelineError::InvalidRequest(_))));

        assert!(store.get_scrape_logs().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_marks_log_failed_and_keeps_merged_sources() {
        let store = Arc::new(ListingStore::new());
        let mut o = Orchestrator::new(store.clone());
        o.register(Arc::new(StaticScraper::new(Source::Mubawab, &["m1"], &[])));
        o.register(Arc::new(HangingScraper));

        let result = o
            .run_with_deadline(&request("all"), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let logs = store.get_scrape_logs().await;
        assert_eq!(logs[0].status, ScrapeStatus::Failed);
        assert_eq!(logs[0].new_listings, 1);
        assert!(logs[0].errors.iter().any(|e| e.contains("cancelled")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn deactivation_pass_is_opt_in() {
        let store = Arc::new(ListingStore::new());
        orchestrator(store.clone()).run(&request("avito")).await.unwrap();

        let mut o = Orchestrator::new(store.clone()).deactivate_missing(true);
        o.register(Arc::new(StaticScraper::new(Source::Avito, &["a2"], &[])));
        o.run(&request("avito")).await.unwrap();

        let a1 = store
            .get_listings()
            .await
            .into_iter()
            .find(|l| l.id == "a1")
            .unwrap();
        assert!(!a1.is_active);
    }

    #[tokio::test]
    async fn cancelled_mid_merge_log_matches_store() {
        let store = Arc::new(ListingStore::new());
        let ids: Vec<String> = (0..300).map(|i| format!("m{}", i)).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut o = Orchestrator::new(store.clone());
        o.register(Arc::new(StaticScraper::new(Source::Mubawab, &ids, &[])));
        o.register(Arc::new(HangingScraper));

        let watcher = store.clone();
        let result = o
            .run_until(&request("all"), async move {
                while watcher.is_empty().await {
                    tokio::task::yield_now().await;
                }
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let logs = store.get_scrape_logs().await;
        assert_eq!(logs[0].status, ScrapeStatus::Failed);
        assert!(logs[0].new_listings > 0);
        assert_eq!(logs[0].new_listings, store.len().await);
    }
}
