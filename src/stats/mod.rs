use crate::models::Listing;
use crate::store::ListingStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate for one property type or neighborhood
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub key: String,
    pub count: usize,
    pub avg_price: i64,
    pub avg_price_per_sqm: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub city: String,
    pub total_listings: usize,
    pub avg_price: i64,
    pub median_price: i64,
    pub avg_price_per_sqm: i64,
    pub by_property_type: Vec<GroupStats>,
    pub by_neighborhood: Vec<GroupStats>,
}

/// Stats for the active listings of `city` (case-insensitive), computed from a
/// snapshot that may lag merges still in flight
pub async fn calculate_market_stats(store: &ListingStore, city: &str) -> MarketStats {
    let listings: Vec<Listing> = store
        .get_listings_by_city(city)
        .await
        .into_iter()
        .filter(|l| l.is_active)
        .collect();

    compute(city, &listings)
}

/// Pure aggregation; callers filter to the listings they want counted
pub fn compute(city: &str, listings: &[Listing]) -> MarketStats {
    if listings.is_empty() {
        return MarketStats {
            city: city.to_string(),
            ..Default::default()
        };
    }

    let prices: Vec<i64> = listings.iter().map(|l| l.price).collect();

    MarketStats {
        city: city.to_string(),
        total_listings: listings.len(),
        avg_price: mean(&prices),
        median_price: median(&prices),
        avg_price_per_sqm: avg_price_per_sqm(listings.iter()),
        by_property_type: group_by(listings, |l| l.property_type.to_string()),
        by_neighborhood: group_by(listings, |l| l.neighborhood.clone()),
    }
}

fn group_by<F>(listings: &[Listing], key: F) -> Vec<GroupStats>
where
    F: Fn(&Listing) -> String,
{
    let mut groups: BTreeMap<String, Vec<&Listing>> = BTreeMap::new();
    for listing in listings {
        groups.entry(key(listing)).or_default().push(listing);
    }

    let mut stats: Vec<GroupStats> = groups
        .into_iter()
        .map(|(key, members)| {
            let prices: Vec<i64> = members.iter().map(|l| l.price).collect();
            GroupStats {
                key,
                count: members.len(),
                avg_price: mean(&prices),
                avg_price_per_sqm: avg_price_per_sqm(members.into_iter()),
            }
        })
        .collect();

    // Largest groups first, ties by key
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    stats
}

fn mean(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let sum: i128 = values.iter().map(|&v| v as i128).sum();
    (sum as f64 / values.len() as f64).round() as i64
}

fn median(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        ((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0).round() as i64
    } else {
        sorted[mid]
    }
}

/// Mean over listings that have a price per m²; the others are left out entirely
fn avg_price_per_sqm<'a>(listings: impl Iterator<Item = &'a Listing>) -> i64 {
    let known: Vec<i64> = listings.filter_map(|l| l.price_per_sqm).collect();
    mean(&known)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateBuilder, PropertyType, Source};

    fn listing(id: &str, kind: PropertyType, neighborhood: &str, price: i64, surface: i64) -> Listing {
        let mut b = CandidateBuilder::new(Source::Mubawab);
        b.id = Some(id.to_string());
        b.title = Some(id.to_string());
        b.city = Some("Marrakech".to_string());
        b.neighborhood = Some(neighborhood.to_string());
        b.property_type = Some(kind);
        b.price = price;
        b.surface_total = surface;
        Listing::from_candidate(b.build().unwrap(), chrono::Utc::now())
    }

    #[test]
    fn empty_input_is_zero_valued() {
        let stats = compute("Marrakech", &[]);
        assert_eq!(stats.total_listings, 0);
        assert_eq!(stats.avg_price, 0);
        assert_eq!(stats.median_price, 0);
        assert_eq!(stats.avg_price_per_sqm, 0);
        assert!(stats.by_property_type.is_empty());
        assert!(stats.by_neighborhood.is_empty());
    }

    #[test]
    fn mean_and_median_for_odd_and_even_sizes() {
        let odd = vec![
            listing("a", PropertyType::Riad, "Kasbah", 1_000, 0),
            listing("b", PropertyType::Riad, "Kasbah", 5_000, 0),
            listing("c", PropertyType::Villa, "Palmeraie", 3_000, 0),
        ];
        let stats = compute("Marrakech", &odd);
        assert_eq!(stats.avg_price, 3_000);
        assert_eq!(stats.median_price, 3_000);

        let mut even = odd.clone();
        even.push(listing("d", PropertyType::Villa, "Palmeraie", 10_000, 0));
        let stats = compute("Marrakech", &even);
        assert_eq!(stats.avg_price, 4_750);
        assert_eq!(stats.median_price, 4_000);
    }

    #[test]
    fn price_per_sqm_ignores_unknown_surfaces() {
        let listings = vec![
            listing("a", PropertyType::Apartment, "Guéliz", 1_000_000, 100),
            listing("b", PropertyType::Apartment, "Guéliz", 3_000_000, 100),
            listing("c", PropertyType::Apartment, "Guéliz", 9_000_000, 0),
        ];
        let stats = compute("Marrakech", &listings);
        assert_eq!(stats.avg_price_per_sqm, 20_000);
    }

    #[test]
    fn group_counts_sum_to_total() {
        let listings = vec![
            listing("a", PropertyType::Riad, "Kasbah", 1_000_000, 100),
            listing("b", PropertyType::Riad, "Mellah", 2_000_000, 200),
            listing("c", PropertyType::Villa, "Palmeraie", 6_000_000, 0),
        ];
        let stats = compute("Marrakech", &listings);

        let by_type: usize = stats.by_property_type.iter().map(|g| g.count).sum();
        let by_hood: usize = stats.by_neighborhood.iter().map(|g| g.count).sum();
        assert_eq!(by_type, 3);
        assert_eq!(by_hood, 3);

        let riad = &stats.by_property_type[0];
        assert_eq!(riad.key, "riad");
        assert_eq!(riad.count, 2);
        assert_eq!(riad.avg_price, 1_500_000);
        assert_eq!(riad.avg_price_per_sqm, 10_000);

        let villa = &stats.by_property_type[1];
        assert_eq!(villa.avg_price_per_sqm, 0);
    }

    #[tokio::test]
    async fn store_stats_skip_inactive_and_other_cities() {
        let store = ListingStore::new();
        let mut candidates = Vec::new();
        for (id, city, price) in [("a", "Marrakech", 1_000), ("b", "marrakech", 3_000), ("c", "Agadir", 50_000)] {
            let mut b = CandidateBuilder::new(Source::Avito);
            b.id = Some(id.to_string());
            b.title = Some(id.to_string());
            b.city = Some(city.to_string());
            b.price = price;
            candidates.push(b.build().unwrap());
        }
        store.add_listings(candidates).await;

        let stats = calculate_market_stats(&store, "Marrakech").await;
        assert_eq!(stats.total_listings, 2);
        assert_eq!(stats.avg_price, 2_000);

        store.deactivate("b").await;
        let stats = calculate_market_stats(&store, "Marrakech").await;
        assert_eq!(stats.total_listings, 1);

        assert_eq!(calculate_market_stats(&store, "Rabat").await.total_listings, 0);
    }

    #[tokio::test]
    async fn store_stats_match_accented_city_in_any_case() {
        let store = ListingStore::new();
        let mut b = CandidateBuilder::new(Source::Mubawab);
        b.id = Some("k1".to_string());
        b.title = Some("Villa".to_string());
        b.city = Some("Kénitra".to_string());
        b.price = 900_000;
        store.add_listings(vec![b.build().unwrap()]).await;

        let stats = calculate_market_stats(&store, "KÉNITRA").await;
        assert_eq!(stats.total_listings, 1);
        assert_eq!(stats.avg_price, 900_000);
    }
}
