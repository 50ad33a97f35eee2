use crate::models::{Listing, ScrapeLog};
use crate::orchestrator::{IngestRequest, IngestResponse, Orchestrator};
use crate::stats::{calculate_market_stats, MarketStats};
use crate::store::{ListingQuery, ListingStore, StoreSummary};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Read-side requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum QueryRequest {
    Stats { city: String },
    Logs,
    Summary,
    Listings(ListingQuery),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsResponse {
    pub listings: Vec<Listing>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    /// Present when the query names a city
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MarketStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Stats(MarketStats),
    Logs(Vec<ScrapeLog>),
    Summary(StoreSummary),
    Listings(ListingsResponse),
}

/// Envelope for ingestion triggers: either the run result or a failure message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub async fn trigger_ingestion(orchestrator: &Orchestrator, request: &IngestRequest) -> ApiResult<IngestResponse> {
    match orchestrator.run(request).await {
        Ok(response) => ApiResult::ok(response),
        Err(e) => {
            error!("Ingestion request failed: {}", e);
            ApiResult::failure(e.to_string())
        }
    }
}

pub async fn handle_query(store: &ListingStore, request: QueryRequest) -> QueryResponse {
    match request {
        QueryRequest::Stats { city } => QueryResponse::Stats(calculate_market_stats(store, &city).await),
        QueryRequest::Logs => QueryResponse::Logs(store.get_scrape_logs().await),
        QueryRequest::Summary => QueryResponse::Summary(store.summary().await),
        QueryRequest::Listings(query) => {
            let page = store.query(&query).await;
            let stats = match query.city.as_deref() {
                Some(city) => Some(calculate_market_stats(store, city).await),
                None => None,
            };
            QueryResponse::Listings(ListingsResponse {
                listings: page.listings,
                total: page.total,
                offset: page.offset,
                limit: page.limit,
                stats,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateBuilder, Source};
    use std::sync::Arc;

    #[test]
    fn query_requests_parse_from_action_json() {
        let stats: QueryRequest = serde_json::from_str(r#"{"action":"stats","city":"Marrakech"}"#).unwrap();
        assert!(matches!(stats, QueryRequest::Stats { ref city } if city == "Marrakech"));

        let listings: QueryRequest =
            serde_json::from_str(r#"{"action":"listings","city":"Marrakech","minPrice":1500,"limit":10}"#).unwrap();
        match listings {
            QueryRequest::Listings(q) => {
                assert_eq!(q.min_price, Some(1500));
                assert_eq!(q.limit, Some(10));
                assert_eq!(q.offset, 0);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            serde_json::from_str::<QueryRequest>(r#"{"action":"logs"}"#).unwrap(),
            QueryRequest::Logs
        ));
    }

    #[tokio::test]
    async fn listings_query_embeds_city_stats() {
        let store = ListingStore::new();
        let mut b = CandidateBuilder::new(Source::Mubawab);
        b.id = Some("x".to_string());
        b.title = Some("Riad".to_string());
        b.city = Some("Marrakech".to_string());
        b.price = 2_000_000;
        store.add_listings(vec![b.build().unwrap()]).await;

        let response = handle_query(&store, QueryRequest::Listings(ListingQuery::for_city("marrakech"))).await;
        match response {
            QueryResponse::Listings(r) => {
                assert_eq!(r.total, 1);
                assert_eq!(r.stats.map(|s| s.avg_price), Some(2_000_000));
            }
            other => panic!("unexpected {:?}", other),
        }

        let response = handle_query(&store, QueryRequest::Listings(ListingQuery::default())).await;
        assert!(matches!(response, QueryResponse::Listings(ListingsResponse { stats: None, .. })));
    }

    #[tokio::test]
    async fn failed_trigger_is_reported_not_thrown() {
        let orchestrator = Orchestrator::new(Arc::new(ListingStore::new()));
        let request = IngestRequest {
            source: "all".to_string(),
            city: "Marrakech".to_string(),
            property_type: None,
            max_pages: 1,
        };

        let result = trigger_ingestion(&orchestrator, &request).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown source"));

        let json = serde_json::to_value(ApiResult::<()>::failure("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "boom"}));
    }
}
