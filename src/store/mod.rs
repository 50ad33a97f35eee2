mod query;

pub use query::{ListingPage, ListingQuery, StoreSummary, DEFAULT_PAGE_SIZE};

use crate::models::{Candidate, Listing, ScrapeLog, ScrapeLogPatch, Source};
use crate::normalize::same_city;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of one `add_listings` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCounts {
    pub added: usize,
    pub updated: usize,
}

impl MergeCounts {
    pub fn record(&mut self, merged: Merged) {
        match merged {
            Merged::Added => self.added += 1,
            Merged::Updated => self.updated += 1,
        }
    }
}

/// What a single merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merged {
    Added,
    Updated,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    listings: Vec<Listing>,
    logs: Vec<ScrapeLog>,
}

/// Listings keyed by id plus scrape-log history. Listings are only written
/// through merges, each under the write lock.
#[derive(Debug, Default)]
pub struct ListingStore {
    listings: RwLock<HashMap<String, Listing>>,
    logs: RwLock<Vec<ScrapeLog>>,
}

impl ListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_listings(&self) -> Vec<Listing> {
        self.listings.read().await.values().cloned().collect()
    }

    /// Case-insensitive city match, active or not
    pub async fn get_listings_by_city(&self, city: &str) -> Vec<Listing> {
        let city = city.trim();
        self.listings
            .read()
            .await
            .values()
            .filter(|l| same_city(&l.city, city))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Listing> {
        self.listings.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listings.read().await.is_empty()
    }

    /// Merge candidates by id: insert unseen ones, refresh known ones
    pub async fn add_listings(&self, candidates: Vec<Candidate>) -> MergeCounts {
        let mut counts = MergeCounts::default();
        for candidate in candidates {
            counts.record(self.merge(candidate).await);
        }
        counts
    }

    /// Insert-or-update one candidate under the write lock. Once this returns
    /// the listing is in the store; nothing after the lock is an await point.
    pub async fn merge(&self, candidate: Candidate) -> Merged {
        let now = Utc::now();
        let mut listings = self.listings.write().await;
        match listings.get_mut(&candidate.id) {
            Some(existing) => {
                existing.apply(candidate, now);
                Merged::Updated
            }
            None => {
                debug!("New listing {}", candidate.id);
                let listing = Listing::from_candidate(candidate, now);
                listings.insert(listing.id.clone(), listing);
                Merged::Added
            }
        }
    }

    /// Mark one listing inactive. Returns false for unknown ids.
    pub async fn deactivate(&self, id: &str) -> bool {
        let mut listings = self.listings.write().await;
        match listings.get_mut(id) {
            Some(listing) => {
                listing.is_active = false;
                listing.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Deactivate active listings of `source` in `city` whose id is not in `seen`
    pub async fn deactivate_missing(&self, source: Source, city: &str, seen: &HashSet<String>) -> usize {
        let now = Utc::now();
        let city = city.trim();
        let mut listings = self.listings.write().await;
        let mut count = 0;

        for listing in listings.values_mut() {
            if listing.is_active
                && listing.source == source
                && same_city(&listing.city, city)
                && !seen.contains(&listing.id)
            {
                listing.is_active = false;
                listing.updated_at = now;
                count += 1;
            }
        }

        if count > 0 {
            info!("Deactivated {} {} listings in {} not seen in the last run", count, source, city);
        }
        count
    }

    /// Filter, sort newest first, then paginate
    pub async fn query(&self, query: &ListingQuery) -> ListingPage {
        let mut matches: Vec<Listing> = self
            .listings
            .read()
            .await
            .values()
            .filter(|l| query.matches(l))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len();
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let listings = matches.into_iter().skip(query.offset).take(limit).collect();

        ListingPage {
            listings,
            total,
            offset: query.offset,
            limit,
        }
    }

    pub async fn summary(&self) -> StoreSummary {
        let listings = self.listings.read().await;

        let cities: BTreeSet<String> = listings.values().map(|l| l.city.clone()).collect();
        let sources: BTreeSet<Source> = listings.values().map(|l| l.source).collect();
        let property_types: BTreeSet<_> = listings.values().map(|l| l.property_type).collect();

        StoreSummary {
            total_listings: listings.len(),
            active_listings: listings.values().filter(|l| l.is_active).count(),
            cities: cities.into_iter().collect(),
            sources: sources.into_iter().collect(),
            property_types: property_types.into_iter().collect(),
            last_scraped_at: listings.values().map(|l| l.scraped_at).max(),
        }
    }

    pub async fn add_scrape_log(&self, log: ScrapeLog) {
        let mut logs = self.logs.write().await;
        match logs.iter_mut().find(|l| l.id == log.id) {
            Some(existing) => *existing = log,
            None => logs.push(log),
        }
    }

    /// Apply a patch to a stored log and return the result
    pub async fn update_scrape_log(&self, id: &str, patch: ScrapeLogPatch) -> Option<ScrapeLog> {
        let mut logs = self.logs.write().await;
        let log = logs.iter_mut().find(|l| l.id == id)?;
        patch.apply_to(log);
        Some(log.clone())
    }

    /// All logs in the order runs were started
    pub async fn get_scrape_logs(&self) -> Vec<ScrapeLog> {
        self.logs.read().await.clone()
    }

    /// Write listings and logs to a JSON file
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut listings = self.get_listings().await;
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = Snapshot {
            listings,
            logs: self.get_scrape_logs().await,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

        info!("💾 Saved {} listings to {}", snapshot.listings.len(), path.display());
        Ok(())
    }

    /// Load a snapshot written by [`save_snapshot`](Self::save_snapshot).
    /// A missing file yields an empty store.
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Malformed snapshot {}", path.display()))?;

        info!("Loaded {} listings from {}", snapshot.listings.len(), path.display());
        Ok(Self {
            listings: RwLock::new(snapshot.listings.into_iter().map(|l| (l.id.clone(), l)).collect()),
            logs: RwLock::new(snapshot.logs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateBuilder, PropertyType, ScrapeStatus};
    use std::sync::Arc;

    fn candidate(id: &str, city: &str, price: i64) -> Candidate {
        let mut b = CandidateBuilder::new(Source::Avito);
        b.id = Some(id.to_string());
        b.title = Some(format!("Appartement {}", id));
        b.city = Some(city.to_string());
        b.neighborhood = Some("Guéliz".to_string());
        b.property_type = Some(PropertyType::Apartment);
        b.price = price;
        b.surface_total = 100;
        b.build().unwrap()
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let store = ListingStore::new();
        let batch = vec![candidate("a", "Marrakech", 1000), candidate("b", "Marrakech", 2000)];

        let first = store.add_listings(batch.clone()).await;
        assert_eq!(first, MergeCounts { added: 2, updated: 0 });

        let second = store.add_listings(batch).await;
        assert_eq!(second, MergeCounts { added: 0, updated: 2 });
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn update_keeps_first_seen_and_reactivates() {
        let store = ListingStore::new();
        store.add_listings(vec![candidate("a", "Marrakech", 1000)]).await;
        let before = store.get("a").await.unwrap();
        assert!(store.deactivate("a").await);

        store.add_listings(vec![candidate("a", "Marrakech", 1500)]).await;
        let after = store.get("a").await.unwrap();

        assert_eq!(after.scraped_at, before.scraped_at);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.price, 1500);
        assert!(after.is_active);
    }

    #[tokio::test]
    async fn concurrent_merges_of_same_id_never_duplicate() {
        let store = Arc::new(ListingStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add_listings(vec![candidate("same", "Marrakech", 1000)]).await
            }));
        }

        let mut added = 0;
        let mut updated = 0;
        for handle in handles {
            let counts = handle.await.unwrap();
            added += counts.added;
            updated += counts.updated;
        }

        assert_eq!(added, 1);
        assert_eq!(updated, 7);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let store = ListingStore::new();
        store
            .add_listings(vec![
                candidate("a", "Marrakech", 1000),
                candidate("b", "marrakech", 2000),
                candidate("c", "Marrakech", 3000),
                candidate("d", "Agadir", 2500),
            ])
            .await;

        let page = store
            .query(&ListingQuery {
                city: Some("MARRAKECH".to_string()),
                min_price: Some(1500),
                ..Default::default()
            })
            .await;
        assert_eq!(page.total, 2);
        assert!(page.listings.iter().all(|l| l.price >= 1500));

        let page = store
            .query(&ListingQuery {
                neighborhood: Some("gué".to_string()),
                max_price: Some(2500),
                offset: 1,
                limit: Some(1),
                ..Default::default()
            })
            .await;
        assert_eq!(page.total, 3);
        assert_eq!(page.listings.len(), 1);

        store.deactivate("a").await;
        let page = store.query(&ListingQuery::for_city("Marrakech")).await;
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn reconciliation_only_touches_matching_source_and_city() {
        let store = ListingStore::new();
        store
            .add_listings(vec![
                candidate("a", "Marrakech", 1000),
                candidate("b", "Marrakech", 2000),
                candidate("c", "Agadir", 2000),
            ])
            .await;

        let seen: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(store.deactivate_missing(Source::Avito, "Marrakech", &seen).await, 1);
        assert_eq!(store.deactivate_missing(Source::Mubawab, "Agadir", &seen).await, 0);
        assert!(!store.get("b").await.unwrap().is_active);
        assert!(store.get("c").await.unwrap().is_active);
    }

    #[tokio::test]
    async fn scrape_logs_are_patched_in_place() {
        let store = ListingStore::new();
        let log = ScrapeLog::start("all", "Marrakech");
        let id = log.id.clone();
        store.add_scrape_log(log).await;

        let updated = store
            .update_scrape_log(
                &id,
                ScrapeLogPatch {
                    status: Some(ScrapeStatus::Completed),
                    new_listings: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ScrapeStatus::Completed);
        assert_eq!(updated.new_listings, 4);
        assert_eq!(store.get_scrape_logs().await, vec![updated]);
        assert!(store.update_scrape_log("missing", ScrapeLogPatch::default()).await.is_none());
    }

    #[tokio::test]
    async fn summary_lists_distinct_values() {
        let store = ListingStore::new();
        assert_eq!(store.summary().await.last_scraped_at, None);

        store
            .add_listings(vec![candidate("a", "Marrakech", 1000), candidate("b", "Agadir", 2000)])
            .await;
        let summary = store.summary().await;

        assert_eq!(summary.cities, vec!["Agadir", "Marrakech"]);
        assert_eq!(summary.sources, vec![Source::Avito]);
        assert_eq!(summary.property_types, vec![PropertyType::Apartment]);
        assert!(summary.last_scraped_at.is_some());
    }

    #[tokio::test]
    async fn city_filters_fold_accented_letters() {
        let store = ListingStore::new();
        store
            .add_listings(vec![candidate("a", "Salé", 1000), candidate("b", "Fès", 2000)])
            .await;

        assert_eq!(store.get_listings_by_city("SALÉ").await.len(), 1);
        assert_eq!(store.get_listings_by_city(" salé ").await.len(), 1);
        assert_eq!(store.query(&ListingQuery::for_city("FÈS")).await.total, 1);
        assert_eq!(store.get_listings_by_city("Sale").await.len(), 0);

        let deactivated = store.deactivate_missing(Source::Avito, "SALÉ", &HashSet::new()).await;
        assert_eq!(deactivated, 1);
        assert!(!store.get("a").await.unwrap().is_active);
        assert!(store.get("b").await.unwrap().is_active);
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = std::env::temp_dir().join(format!("souk-scout-test-{}", std::process::id()));
        let path = dir.join("store.json");

        let store = ListingStore::new();
        store.add_listings(vec![candidate("a", "Marrakech", 1000)]).await;
        store.add_scrape_log(ScrapeLog::start("avito", "Marrakech")).await;
        store.save_snapshot(&path).await.unwrap();

        let loaded = ListingStore::load_snapshot(&path).await.unwrap();
        assert_eq!(loaded.get("a").await, store.get("a").await);
        assert_eq!(loaded.get_scrape_logs().await.len(), 1);

        let empty = ListingStore::load_snapshot(dir.join("missing.json")).await.unwrap();
        assert!(empty.is_empty().await);

        let _ = std::fs::remove_dir_all(dir);
    }
}
