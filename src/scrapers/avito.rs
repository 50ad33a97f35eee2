use crate::models::Source;
use crate::normalize::Gazetteer;
use crate::scrapers::delay::DelayStrategy;
use crate::scrapers::extract::{CardSelector, FieldExtractor};
use crate::scrapers::fetch::PageFetcher;
use crate::scrapers::pager::{CardFields, DetailFields, MarketplaceScraper, SiteLayout};
use crate::scrapers::types::SearchParams;
use std::sync::Arc;

pub const AVITO_BASE_URL: &str = "https://www.avito.ma";

/// Avito scraper
pub type AvitoScraper = MarketplaceScraper<AvitoLayout>;

impl AvitoScraper {
    pub fn build(
        fetcher: Arc<dyn PageFetcher>,
        delay: Arc<dyn DelayStrategy>,
        gazetteer: Arc<Gazetteer>,
    ) -> Self {
        MarketplaceScraper::new(AvitoLayout::new(), fetcher, delay, gazetteer)
    }
}

/// URL scheme and markup of avito.ma.
///
/// Index pages look like `/fr/marrakech/maisons_et_villas-%C3%A0_vendre?o=2`.
/// Cards are anchors whose href ends in `_<id>.htm`.
pub struct AvitoLayout {
    base_url: String,
    cards: CardSelector,
    fields: CardFields,
    detail: DetailFields,
}

impl AvitoLayout {
    pub fn new() -> Self {
        Self::with_base_url(AVITO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cards: CardSelector::new(&[
                "div.sc-1nre5ec-1 > a",
                "a.sc-1jge648-0",
                "div[class*='listing'] a[href$='.htm']",
                "div.oan-item",
                "article.listing",
            ]),
            fields: CardFields {
                title: FieldExtractor::new()
                    .text("p[title]")
                    .text("h3 span")
                    .text("h3")
                    .text(".title"),
                price: FieldExtractor::new()
                    .text("p.sc-1x0vz2r-0 span[dir='auto']")
                    .text("span[class*='price']")
                    .text(".price"),
                location: FieldExtractor::new()
                    .text("div.sc-1x0vz2r-0 p")
                    .text("span[class*='location']")
                    .text(".location"),
                details: FieldExtractor::new()
                    .text("div[title='Surface totale']")
                    .text("div.sc-b57yxx-2")
                    .text(".details"),
                image: FieldExtractor::new()
                    .attr("img", "src")
                    .attr("img", "data-src"),
                link: FieldExtractor::new()
                    .own_attr("href")
                    .attr("a[href$='.htm']", "href")
                    .attr("a", "href"),
            },
            detail: DetailFields {
                title: FieldExtractor::new().text("h1"),
                price: FieldExtractor::new()
                    .text("p.sc-1x0vz2r-0.lnEFFR")
                    .text("div[class*='price'] p")
                    .text(".price"),
                location: FieldExtractor::new()
                    .text("span.sc-1x0vz2r-0.iotEHk")
                    .text("div[class*='location']")
                    .text(".location"),
                description: FieldExtractor::new()
                    .text("div.sc-ij98yj-0 p")
                    .text("div[class*='description']")
                    .text(".description"),
                details: FieldExtractor::new()
                    .text("div.sc-1g3sn3w-3")
                    .text("ul[class*='params']")
                    .text(".details"),
                images: FieldExtractor::new()
                    .attr("div.picture img", "src")
                    .attr("div[class*='gallery'] img", "src")
                    .attr("img", "src"),
            },
        }
    }

    fn category_slug(category: Option<&str>) -> &'static str {
        match category.map(|c| c.trim().to_lowercase()).as_deref() {
            Some("riad") | Some("dar") | Some("maison") | Some("villa") => "maisons_et_villas",
            Some("apartment") | Some("appartement") => "appartements",
            Some("terrain") => "terrains_et_fermes",
            Some("commerce") => "magasins_et_commerces",
            _ => "immobilier",
        }
    }
}

impl Default for AvitoLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteLayout for AvitoLayout {
    fn source(&self) -> Source {
        Source::Avito
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_url(&self, params: &SearchParams, page: u32) -> String {
        let city = params.city.trim().to_lowercase().replace(' ', "_");
        let slug = Self::category_slug(params.category.as_deref());
        format!("{}/fr/{}/{}-%C3%A0_vendre?o={}", self.base_url, city, slug, page.max(1))
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
