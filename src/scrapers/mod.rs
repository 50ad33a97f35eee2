pub mod avito;
pub mod delay;
pub mod extract;
pub mod fetch;
pub mod mubawab;
pub mod pager;
pub mod traits;
pub mod types;

pub use avito::AvitoScraper;
pub use delay::{DelayStrategy, NoDelay, PolitenessDelay};
pub use fetch::{FixtureFetcher, HttpFetcher, PageFetcher};
pub use mubawab::MubawabScraper;
pub use pager::{MarketplaceScraper, SiteLayout};
pub use traits::ScraperTrait;
pub use types::{ScrapeBatch, SearchParams};
