use crate::models::{Candidate, CandidateBuilder, Source};
use crate::normalize::{
    absolute_url, canonical_url, classify_property_type, classify_transaction_type, derive_id,
    detect_amenities, infer_neighborhood, parse_count, parse_price, parse_surface,
    source_native_id, Gazetteer,
};
use crate::scrapers::delay::DelayStrategy;
use crate::scrapers::extract::{CardSelector, FieldExtractor};
use crate::scrapers::fetch::PageFetcher;
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::{ScrapeBatch, SearchParams};
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extractors for one listing card on an index page
#[derive(Debug, Clone, Default)]
pub struct CardFields {
    pub title: FieldExtractor,
    pub price: FieldExtractor,
    pub location: FieldExtractor,
    pub details: FieldExtractor,
    pub image: FieldExtractor,
    pub link: FieldExtractor,
}

/// Extractors for a listing detail page
#[derive(Debug, Clone, Default)]
pub struct DetailFields {
    pub title: FieldExtractor,
    pub price: FieldExtractor,
    pub location: FieldExtractor,
    pub description: FieldExtractor,
    pub details: FieldExtractor,
    pub images: FieldExtractor,
}

/// Everything site-specific about a marketplace
pub trait SiteLayout: Send + Sync {
    fn source(&self) -> Source;

    /// Root used to resolve relative links
    fn base_url(&self) -> &str;

    /// Listing-index URL for a 1-based page number
    fn page_url(&self, params: &SearchParams, page: u32) -> String;

    fn cards(&self) -> &CardSelector;

    fn card_fields(&self) -> &CardFields;

    fn detail_fields(&self) -> &DetailFields;
}

enum PageOutcome {
    /// No cards at all: pagination is over
    End,
    Cards {
        seen: usize,
        candidates: Vec<Candidate>,
        errors: Vec<String>,
    },
}

/// Adapter for any marketplace described by a [`SiteLayout`]. Fetching,
/// termination, error collection and politeness are shared here.
pub struct MarketplaceScraper<L: SiteLayout> {
    layout: L,
    fetcher: Arc<dyn PageFetcher>,
    delay: Arc<dyn DelayStrategy>,
    gazetteer: Arc<Gazetteer>,
}

impl<L: SiteLayout> MarketplaceScraper<L> {
    pub fn new(
        layout: L,
        fetcher: Arc<dyn PageFetcher>,
        delay: Arc<dyn DelayStrategy>,
        gazetteer: Arc<Gazetteer>,
    ) -> Self {
        Self {
            layout,
            fetcher,
            delay,
            gazetteer,
        }
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    fn parse_page(&self, html: &str, params: &SearchParams, page: u32) -> PageOutcome {
        let document = Html::parse_document(html);
        let cards = self.layout.cards().select(&document);
        if cards.is_empty() {
            return PageOutcome::End;
        }

        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        for (idx, card) in cards.iter().enumerate() {
            match self.parse_card(*card, params) {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => debug!("Dropped incomplete card {} on page {}", idx, page),
                Err(e) => {
                    warn!("{}: card {} on page {}: {}", self.layout.source(), idx, page, e);
                    errors.push(format!("page {} card {}: {}", page, idx, e));
                }
            }
        }

        PageOutcome::Cards {
            seen: cards.len(),
            candidates,
            errors,
        }
    }

    fn parse_card(&self, card: ElementRef<'_>, params: &SearchParams) -> Result<Option<Candidate>, String> {
        let fields = self.layout.card_fields();

        let title = fields.title.extract(card).unwrap_or_default();
        let price_text = fields.price.extract(card).unwrap_or_default();
        let price = parse_price(&price_text);
        if title.is_empty() || price <= 0 {
            return Ok(None);
        }

        let href = fields
            .link
            .extract(card)
            .ok_or_else(|| format!("listing '{}' has no link", title))?;
        let location = fields.location.extract(card).unwrap_or_default();
        let details = fields.details.extract(card).unwrap_or_default();

        let mut builder = self.identity(&href);
        builder.property_type = Some(classify_property_type(&title));
        builder.transaction_type = Some(classify_transaction_type(&title, &price_text));
        builder.neighborhood = Some(infer_neighborhood(&self.gazetteer, &location, &params.city));
        builder.city = Some(params.city.clone());
        builder.address = (!location.is_empty()).then(|| location.clone());
        builder.price = price;
        // Some sites only mention the surface in the title ("Villa 450 m²")
        builder.surface_total = match parse_surface(&details) {
            0 => parse_surface(&title),
            surface => surface,
        };
        builder.bedrooms = parse_count(&details, &["chambre", "ch."]);
        builder.bathrooms = parse_count(&details, &["salle", "sdb"]);
        let amenities = detect_amenities(&format!("{} {}", title, details));
        builder.has_pool = amenities.pool;
        builder.has_garage = amenities.garage;
        builder.has_terrace = amenities.terrace;
        builder.images = fields
            .image
            .extract(card)
            .map(|src| vec![absolute_url(self.layout.base_url(), &src)])
            .unwrap_or_default();
        builder.title = Some(title);

        Ok(builder.build())
    }

    fn parse_detail(&self, url: &str, html: &str) -> Option<Candidate> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let fields = self.layout.detail_fields();

        let title = fields.title.extract(root)?;
        let price_text = fields.price.extract(root).unwrap_or_default();
        let location = fields.location.extract(root).unwrap_or_default();
        let description = fields.description.extract(root).unwrap_or_default();
        let details = fields.details.extract(root).unwrap_or_default();
        let city = location
            .rsplit(',')
            .next()
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        let mut builder = self.identity(url);
        builder.property_type = Some(classify_property_type(&title));
        builder.transaction_type = Some(classify_transaction_type(&title, &price_text));
        builder.neighborhood = Some(infer_neighborhood(&self.gazetteer, &location, &city));
        builder.city = Some(city);
        builder.address = (!location.is_empty()).then(|| location.clone());
        builder.price = parse_price(&price_text);
        builder.surface_total = parse_surface(&details);
        builder.bedrooms = parse_count(&details, &["chambre", "ch."]);
        builder.bathrooms = parse_count(&details, &["salle", "sdb"]);
        builder.floors = parse_count(&details, &["étage", "etage", "niveau"]);
        let amenities = detect_amenities(&format!("{} {} {}", title, details, description));
        builder.has_pool = amenities.pool;
        builder.has_garage = amenities.garage;
        builder.has_terrace = amenities.terrace;
        builder.description = Some(description);
        builder.images = fields
            .images
            .extract_all(root)
            .iter()
            .map(|src| absolute_url(self.layout.base_url(), src))
            .collect();
        builder.title = Some(title);

        builder.build()
    }

    /// Builder seeded with url, source id and the stable listing id
    fn identity(&self, href: &str) -> CandidateBuilder {
        let source = self.layout.source();
        let url = absolute_url(self.layout.base_url(), href);
        let source_id = source_native_id(&url);
        let identifier = source_id.clone().unwrap_or_else(|| canonical_url(&url));

        let mut builder = CandidateBuilder::new(source);
        builder.id = Some(derive_id(source, &identifier));
        builder.source_id = Some(source_id.unwrap_or(identifier));
        builder.url = Some(url);
        builder
    }
}

#[async_trait]
impl<L: SiteLayout> ScraperTrait for MarketplaceScraper<L> {
    async fn scrape_listings(&self, params: &SearchParams) -> ScrapeBatch {
        let source = self.layout.source();
        info!("Starting {} scrape for {} (max {} pages)", source, params.city, params.max_pages);

        let mut batch = ScrapeBatch::default();
        for page in 1..=params.max_pages {
            if page > 1 {
                self.delay.pause().await;
            }

            let url = self.layout.page_url(params, page);
            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("{} page {} failed: {}", source, page, e);
                    batch.errors.push(format!("page {}: {}", page, e));
                    continue;
                }
            };

            match self.parse_page(&html, params, page) {
                PageOutcome::End => {
                    info!("{} page {} has no listings, stopping", source, page);
                    batch.exhausted = true;
                    break;
                }
                PageOutcome::Cards {
                    seen,
                    candidates,
                    errors,
                } => {
                    debug!("{} page {}: {} cards, {} accepted", source, page, seen, candidates.len());
                    for candidate in candidates {
                        batch.push(candidate);
                    }
                    batch.errors.extend(errors);
                }
            }
        }

        info!(
            "{} scrape finished: {} listings, {} errors",
            source,
            batch.total_found,
            batch.errors.len()
        );
        batch
    }

    async fn scrape_details(&self, listing_url: &str) -> Option<Candidate> {
        let url = absolute_url(self.layout.base_url(), listing_url);
        match self.fetcher.fetch(&url).await {
            Ok(html) => self.parse_detail(&url, &html),
            Err(e) => {
                warn!("Detail fetch failed: {}", e);
                None
            }
        }
    }

    fn source(&self) -> Source {
        self.layout.source()
    }
}
