use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

/// Source of the property listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mubawab,
    Avito,
    /// Entered by hand during a field audit
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mubawab => "mubawab",
            Source::Avito => "avito",
            Source::Manual => "manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mubawab" => Ok(Source::Mubawab),
            "avito" => Ok(Source::Avito),
            "manual" => Ok(Source::Manual),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Riad,
    Dar,
    Apartment,
    Villa,
    Terrain,
    Commerce,
    Other,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Riad => "riad",
            PropertyType::Dar => "dar",
            PropertyType::Apartment => "apartment",
            PropertyType::Villa => "villa",
            PropertyType::Terrain => "terrain",
            PropertyType::Commerce => "commerce",
            PropertyType::Other => "other",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "riad" => Ok(PropertyType::Riad),
            "dar" => Ok(PropertyType::Dar),
            "apartment" => Ok(PropertyType::Apartment),
            "villa" => Ok(PropertyType::Villa),
            "terrain" => Ok(PropertyType::Terrain),
            "commerce" => Ok(PropertyType::Commerce),
            "other" => Ok(PropertyType::Other),
            other => Err(format!("unknown property type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Sale,
    Rent,
}

/// Canonical property advertisement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub source: Source,
    pub source_id: String,
    pub url: String,

    pub title: String,
    pub description: String,
    pub property_type: PropertyType,
    pub transaction_type: TransactionType,

    pub city: String,
    pub neighborhood: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Whole MAD
    pub price: i64,
    pub currency: String,
    pub price_per_sqm: Option<i64>,

    pub surface_total: i64,
    pub surface_habitable: Option<i64>,
    pub surface_terrain: Option<i64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub floors: Option<u32>,
    pub has_pool: bool,
    pub has_garage: bool,
    pub has_terrace: bool,

    pub legal_status: Option<String>,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub is_active: bool,
    pub scraped_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Build a fresh listing from an accepted candidate
    pub fn from_candidate(candidate: Candidate, now: DateTime<Utc>) -> Self {
        let mut listing = Self {
            id: candidate.id.clone(),
            source: candidate.source,
            source_id: String::new(),
            url: String::new(),
            title: String::new(),
            description: String::new(),
            property_type: PropertyType::Other,
            transaction_type: TransactionType::Sale,
            city: String::new(),
            neighborhood: String::new(),
            address: None,
            latitude: None,
            longitude: None,
            price: 0,
            currency: String::new(),
            price_per_sqm: None,
            surface_total: 0,
            surface_habitable: None,
            surface_terrain: None,
            bedrooms: None,
            bathrooms: None,
            floors: None,
            has_pool: false,
            has_garage: false,
            has_terrace: false,
            legal_status: None,
            condition: None,
            images: Vec::new(),
            is_active: true,
            scraped_at: now,
            updated_at: now,
            posted_at: None,
        };
        listing.apply(candidate, now);
        listing.scraped_at = now;
        listing
    }

    /// Overwrite mutable fields from a re-scraped candidate.
    /// `id`, `source` and `scraped_at` are never touched.
    pub fn apply(&mut self, candidate: Candidate, now: DateTime<Utc>) {
        self.source_id = candidate.source_id;
        self.url = candidate.url;
        self.title = candidate.title;
        if !candidate.description.is_empty() || self.description.is_empty() {
            self.description = candidate.description;
        }
        self.property_type = candidate.property_type;
        self.transaction_type = candidate.transaction_type;
        self.city = candidate.city;
        self.neighborhood = candidate.neighborhood;
        self.address = candidate.address.or(self.address.take());
        self.latitude = candidate.latitude.or(self.latitude);
        self.longitude = candidate.longitude.or(self.longitude);
        self.price = candidate.price;
        self.currency = candidate.currency;
        self.price_per_sqm = candidate.price_per_sqm;
        self.surface_total = candidate.surface_total;
        self.surface_habitable = candidate.surface_habitable.or(self.surface_habitable);
        self.surface_terrain = candidate.surface_terrain.or(self.surface_terrain);
        self.bedrooms = candidate.bedrooms.or(self.bedrooms);
        self.bathrooms = candidate.bathrooms.or(self.bathrooms);
        self.floors = candidate.floors.or(self.floors);
        self.has_pool = candidate.has_pool;
        self.has_garage = candidate.has_garage;
        self.has_terrace = candidate.has_terrace;
        self.legal_status = candidate.legal_status.or(self.legal_status.take());
        self.condition = candidate.condition.or(self.condition.take());
        if !candidate.images.is_empty() {
            self.images = candidate.images;
        }
        self.posted_at = candidate.posted_at.or(self.posted_at);
        self.is_active = true;
        self.updated_at = now;
    }
}

/// A listing as produced by an adapter, before it is merged into the store.
///
/// Only `Candidate`s that went through [`CandidateBuilder::build`] exist, so
/// every candidate has a non-empty title and a positive price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub source: Source,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub property_type: PropertyType,
    pub transaction_type: TransactionType,
    pub city: String,
    pub neighborhood: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: i64,
    pub currency: String,
    pub price_per_sqm: Option<i64>,
    pub surface_total: i64,
    pub surface_habitable: Option<i64>,
    pub surface_terrain: Option<i64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub floors: Option<u32>,
    pub has_pool: bool,
    pub has_garage: bool,
    pub has_terrace: bool,
    pub legal_status: Option<String>,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Field-by-field accumulator used while parsing a listing card
#[derive(Debug, Clone, Default)]
pub struct CandidateBuilder {
    pub id: Option<String>,
    pub source: Option<Source>,
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<PropertyType>,
    pub transaction_type: Option<TransactionType>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: i64,
    pub surface_total: i64,
    pub surface_habitable: Option<i64>,
    pub surface_terrain: Option<i64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub floors: Option<u32>,
    pub has_pool: bool,
    pub has_garage: bool,
    pub has_terrace: bool,
    pub legal_status: Option<String>,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl CandidateBuilder {
    pub fn new(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    /// Validate completeness and produce a candidate.
    ///
    /// Returns `None` when the title is blank, the price is not positive, or
    /// no identity was derived. This is routine filtering, not an error.
    pub fn build(self) -> Option<Candidate> {
        let title = self.title.map(|t| t.trim().to_string()).unwrap_or_default();
        if title.is_empty() || self.price <= 0 {
            return None;
        }
        let id = self.id.filter(|id| !id.is_empty())?;
        let source = self.source?;

        let price_per_sqm = if self.surface_total > 0 {
            Some((self.price as f64 / self.surface_total as f64).round() as i64)
        } else {
            None
        };

        Some(Candidate {
            id,
            source,
            source_id: self.source_id.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            title,
            description: self.description.unwrap_or_default(),
            property_type: self.property_type.unwrap_or(PropertyType::Other),
            transaction_type: self.transaction_type.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            neighborhood: self.neighborhood.unwrap_or_default(),
            address: self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            price: self.price,
            currency: "MAD".to_string(),
            price_per_sqm,
            surface_total: self.surface_total.max(0),
            surface_habitable: self.surface_habitable,
            surface_terrain: self.surface_terrain,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            floors: self.floors,
            has_pool: self.has_pool,
            has_garage: self.has_garage,
            has_terrace: self.has_terrace,
            legal_status: self.legal_status,
            condition: self.condition,
            images: self.images,
            posted_at: self.posted_at,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Running,
    Completed,
    Failed,
}

/// One record per ingestion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeLog {
    pub id: String,
    /// Single marketplace name or "all"
    pub source: String,
    pub city: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScrapeStatus,
    pub total_found: usize,
    pub new_listings: usize,
    pub updated_listings: usize,
    pub errors: Vec<String>,
}

impl ScrapeLog {
    pub fn start(source: impl Into<String>, city: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: format!(
                "scrape_{}_{}",
                started_at.timestamp_millis(),
                LOG_SEQ.fetch_add(1, Ordering::Relaxed)
            ),
            source: source.into(),
            city: city.into(),
            started_at,
            completed_at: None,
            status: ScrapeStatus::Running,
            total_found: 0,
            new_listings: 0,
            updated_listings: 0,
            errors: Vec::new(),
        }
    }
}

/// Partial update applied to a stored scrape log
#[derive(Debug, Clone, Default)]
pub struct ScrapeLogPatch {
    pub status: Option<ScrapeStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_found: Option<usize>,
    pub new_listings: Option<usize>,
    pub updated_listings: Option<usize>,
    pub errors: Option<Vec<String>>,
}

impl ScrapeLogPatch {
    pub fn apply_to(self, log: &mut ScrapeLog) {
        if let Some(status) = self.status {
            log.status = status;
        }
        if let Some(at) = self.completed_at {
            log.completed_at = Some(at);
        }
        if let Some(n) = self.total_found {
            log.total_found = n;
        }
        if let Some(n) = self.new_listings {
            log.new_listings = n;
        }
        if let Some(n) = self.updated_listings {
            log.updated_listings = n;
        }
        if let Some(errors) = self.errors {
            log.errors = errors;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CandidateBuilder {
        let mut b = CandidateBuilder::new(Source::Mubawab);
        b.id = Some("mubawab_abc".to_string());
        b.title = Some("Riad à vendre".to_string());
        b.price = 1_500_000;
        b
    }

    #[test]
    fn build_rejects_missing_title_or_price() {
        let mut no_title = builder();
        no_title.title = Some("   ".to_string());
        assert!(no_title.build().is_none());

        let mut no_price = builder();
        no_price.price = 0;
        assert!(no_price.build().is_none());
    }

    #[test]
    fn build_computes_rounded_price_per_sqm() {
        let mut b = builder();
        b.surface_total = 120;
        let candidate = b.build().unwrap();
        assert_eq!(candidate.price_per_sqm, Some(12_500));

        let mut b = builder();
        b.price = 1000;
        b.surface_total = 3;
        assert_eq!(b.build().unwrap().price_per_sqm, Some(333));

        assert_eq!(builder().build().unwrap().price_per_sqm, None);
    }

    #[test]
    fn apply_preserves_identity_and_first_seen() {
        let first = Utc::now() - chrono::Duration::days(3);
        let mut listing = Listing::from_candidate(builder().build().unwrap(), first);

        let mut b = builder();
        b.price = 1_200_000;
        b.title = Some("Riad rénové".to_string());
        let later = Utc::now();
        listing.apply(b.build().unwrap(), later);

        assert_eq!(listing.id, "mubawab_abc");
        assert_eq!(listing.scraped_at, first);
        assert_eq!(listing.updated_at, later);
        assert_eq!(listing.price, 1_200_000);
        assert_eq!(listing.title, "Riad rénové");
    }

    #[test]
    fn source_parses_case_insensitively() {
        assert_eq!("Avito".parse::<Source>(), Ok(Source::Avito));
        assert!("leboncoin".parse::<Source>().is_err());
    }
}
