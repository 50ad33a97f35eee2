use crate::models::Source;
use crate::normalize::Gazetteer;
use crate::scrapers::delay::DelayStrategy;
use crate::scrapers::extract::{CardSelector, FieldExtractor};
use crate::scrapers::fetch::PageFetcher;
use crate::scrapers::pager::{CardFields, DetailFields, MarketplaceScraper, SiteLayout};
use crate::scrapers::types::SearchParams;
use std::sync::Arc;

pub const MUBAWAB_BASE_URL: &str = "https://www.mubawab.ma";

/// Mubawab scraper
pub type MubawabScraper = MarketplaceScraper<MubawabLayout>;

impl MubawabScraper {
    pub fn build(
        fetcher: Arc<dyn PageFetcher>,
        delay: Arc<dyn DelayStrategy>,
        gazetteer: Arc<Gazetteer>,
    ) -> Self {
        MarketplaceScraper::new(MubawabLayout::new(), fetcher, delay, gazetteer)
    }
}

/// URL scheme and markup of mubawab.ma.
///
/// Index pages look like `/fr/st/marrakech/riads-a-vendre:p:2`.
pub struct MubawabLayout {
    base_url: String,
    cards: CardSelector,
    fields: CardFields,
    detail: DetailFields,
}

impl MubawabLayout {
    pub fn new() -> Self {
        Self::with_base_url(MUBAWAB_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cards: CardSelector::new(&[
                "div.listingBox",
                "li.listingBox",
                "div.adlist > div[linkref]",
                "div[class*='listingBox']",
            ]),
            fields: CardFields {
                title: FieldExtractor::new()
                    .text("h2.listingTit a")
                    .text("h2.listingTit")
                    .text("h3.titleAd")
                    .text(".title"),
                price: FieldExtractor::new()
                    .text("span.priceTag")
                    .text("div.priceBar span")
                    .text(".price"),
                location: FieldExtractor::new()
                    .text("span.listingH3")
                    .text("h3.listingH3")
                    .text(".location"),
                details: FieldExtractor::new()
                    .text("div.adDetails")
                    .text("h4.listingH4")
                    .text(".details"),
                image: FieldExtractor::new()
                    .attr("img", "data-url")
                    .attr("img", "data-src")
                    .attr("img", "src"),
                link: FieldExtractor::new()
                    .own_attr("linkref")
                    .attr("h2.listingTit a", "href")
                    .attr("a", "href"),
            },
            detail: DetailFields {
                title: FieldExtractor::new().text("h1.searchTitle").text("h1"),
                price: FieldExtractor::new()
                    .text("h3.orangeTit")
                    .text("div.mainInfoProp h3")
                    .text(".price"),
                location: FieldExtractor::new()
                    .text("h3.greyTit")
                    .text("div.mainInfoProp h3.greyTit")
                    .text(".location"),
                description: FieldExtractor::new()
                    .text("div.blockProp p")
                    .text("div.description")
                    .text(".description"),
                details: FieldExtractor::new()
                    .text("div.adDetails")
                    .text("div.catNav")
                    .text(".details"),
                images: FieldExtractor::new()
                    .attr("div.flipsnap img", "src")
                    .attr("div.photo-gallery img", "src")
                    .attr("img.slide", "src"),
            },
        }
    }

    fn category_slug(category: Option<&str>) -> &'static str {
        match category.map(|c| c.trim().to_lowercase()).as_deref() {
            Some("riad") => "riads-a-vendre",
            Some("dar") | Some("maison") => "maisons-a-vendre",
            Some("apartment") | Some("appartement") => "appartements-a-vendre",
            Some("villa") => "villas-et-maisons-de-luxe-a-vendre",
            Some("terrain") => "terrains-a-vendre",
            Some("commerce") => "locaux-commerciaux-a-vendre",
            _ => "immobilier-a-vendre",
        }
    }
}

impl Default for MubawabLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteLayout for MubawabLayout {
    fn source(&self) -> Source {
        Source::Mubawab
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_url(&self, params: &SearchParams, page: u32) -> String {
        let city = params.city.trim().to_lowercase().replace(' ', "-");
        let slug = Self::category_slug(params.category.as_deref());
        if page <= 1 {
            format!("{}/fr/st/{}/{}", self.base_url, city, slug)
        } else {
            format!("{}/fr/st/{}/{}:p:{}", self.base_url, city, slug, page)
        }
    }

    fn cards(&self) -> &CardSelector {
        &self.cards
    }

    fn card_fields(&self) -> &CardFields {
        &self.fields
    }

    fn detail_fields(&self) -> &DetailFields {
        &self.detail
    }
}
