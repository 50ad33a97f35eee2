use crate::models::{Listing, PropertyType, Source};
use crate::normalize::same_city;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Filters for reading listings. Only active listings are ever returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    pub city: Option<String>,
    /// Case-insensitive substring
    pub neighborhood: Option<String>,
    pub property_type: Option<PropertyType>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub source: Option<Source>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ListingQuery {
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if !listing.is_active {
            return false;
        }
        if let Some(city) = &self.city {
            if !same_city(&listing.city, city) {
                return false;
            }
        }
        if let Some(neighborhood) = &self.neighborhood {
            if !listing
                .neighborhood
                .to_lowercase()
                .contains(&neighborhood.trim().to_lowercase())
            {
                return false;
            }
        }
        if self.property_type.is_some_and(|t| t != listing.property_type) {
            return false;
        }
        if self.min_price.is_some_and(|min| listing.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| listing.price > max) {
            return false;
        }
        if self.source.is_some_and(|s| s != listing.source) {
            return false;
        }
        true
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    /// Matches before offset/limit were applied
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Distinct values across the whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub total_listings: usize,
    pub active_listings: usize,
    pub cities: Vec<String>,
    pub sources: Vec<Source>,
    pub property_types: Vec<PropertyType>,
    pub last_scraped_at: Option<DateTime<Utc>>,
}
