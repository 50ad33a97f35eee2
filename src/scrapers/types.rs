use crate::models::Candidate;
use serde::{Deserialize, Serialize};

/// Search parameters for one adapter run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// City to search in
    pub city: String,
    /// Site category to browse ("riad", "villa", ...). `None` browses everything for sale.
    pub category: Option<String>,
    /// Upper bound on listing-index pages requested
    pub max_pages: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            city: "Marrakech".to_string(),
            category: None,
            max_pages: 3,
        }
    }
}

/// What an adapter hands back to the orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBatch {
    pub listings: Vec<Candidate>,
    pub total_found: usize,
    pub errors: Vec<String>,
    /// Pagination reached an empty page before `max_pages`
    #[serde(default)]
    pub exhausted: bool,
}

impl ScrapeBatch {
    pub fn push(&mut self, candidate: Candidate) {
        self.listings.push(candidate);
        self.total_found = self.listings.len();
    }
}
