// Search & filter engine. Criteria are validated before any supplier call;
// filtering and sorting are pure functions over the in-memory result set and
// never re-query the supplier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::client::SupplierApi;
use crate::error::BookingError;
use crate::model::{HotelResult, SearchCriteria};
use crate::supplier::AvailabilityRequest;

#[derive(Debug, Clone)]
pub struct SearchEngineConfig {
    /// How long a cached result set may serve as a degraded fallback when
    /// the supplier is unreachable.
    pub fallback_ttl: Duration,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            fallback_ttl: Duration::from_secs(300),
        }
    }
}

/// Search output: normalized results plus the echoed criteria. `degraded`
/// marks a fallback served from cache because the supplier was unreachable.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub criteria: SearchCriteria,
    pub results: Vec<HotelResult>,
    pub degraded: bool,
}

struct CachedResults {
    results: Vec<HotelResult>,
    stored_at: Instant,
}

pub struct SearchEngine {
    supplier: Arc<dyn SupplierApi>,
    config: SearchEngineConfig,
    fallback: DashMap<String, CachedResults>,
}

fn cache_key(criteria: &SearchCriteria) -> String {
    let rooms = criteria
        .rooms
        .iter()
        .map(|r| {
            let ages = r
                .children_ages
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("{}a{}c[{}]", r.adults, r.children, ages)
        })
        .collect::<Vec<_>>()
        .join("|");
    format!(
        "{}:{}:{}:{}:{}",
        criteria.city_code, criteria.check_in, criteria.check_out, criteria.nationality, rooms
    )
}

impl SearchEngine {
    pub fn new(supplier: Arc<dyn SupplierApi>, config: SearchEngineConfig) -> Self {
        Self {
            supplier,
            config,
            fallback: DashMap::new(),
        }
    }

    /// Executes a search against the supplier. Re-invocable; mutates no
    /// session state.
    pub async fn search(&self, criteria: SearchCriteria) -> Result<SearchOutcome, BookingError> {
        self.search_as_of(criteria, Utc::now().date_naive()).await
    }

    /// Same as [`search`](Self::search) with an explicit "today", so callers
    /// (and tests) control the past-date cutoff.
    pub async fn search_as_of(
        &self,
        criteria: SearchCriteria,
        today: NaiveDate,
    ) -> Result<SearchOutcome, BookingError> {
        criteria.validate(today)?;

        let request = AvailabilityRequest::from(&criteria);
        let key = cache_key(&criteria);

        match self.supplier.search(request).await {
            Ok(response) => {
                let results: Vec<HotelResult> =
                    response.hotels.into_iter().map(HotelResult::from).collect();
                debug!(search_id = %response.search_id, count = results.len(), "search complete");
                self.fallback.insert(
                    key,
                    CachedResults {
                        results: results.clone(),
                        stored_at: Instant::now(),
                    },
                );
                Ok(SearchOutcome {
                    criteria,
                    results,
                    degraded: false,
                })
            }
            Err(err) if err.is_retryable() => {
                let cached = self.fallback.get(&key).and_then(|entry| {
                    if entry.stored_at.elapsed() <= self.config.fallback_ttl {
                        Some(entry.results.clone())
                    } else {
                        None
                    }
                });
                match cached {
                    Some(results) => {
                        warn!(%err, "supplier unreachable, serving degraded cached results");
                        Ok(SearchOutcome {
                            criteria,
                            results,
                            degraded: true,
                        })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Refreshes a single offer by its booking code via the supplier's
    /// detail operation.
    pub async fn hotel_detail(&self, booking_code: &str) -> Result<HotelResult, BookingError> {
        if booking_code.trim().is_empty() {
            return Err(BookingError::validation("booking code is required"));
        }
        let response = self.supplier.hotel_detail(booking_code).await?;
        Ok(HotelResult::from(response.hotel))
    }
}

/// Client-side filters applied to an already-fetched result set.
#[derive(Debug, Clone, Default)]
pub struct HotelFilters {
    pub star_rating: Option<u8>,
    pub refundable: Option<bool>,
    pub meal_plan: Option<String>,
    pub max_price: Option<f64>,
}

/// Pure, idempotent, order-stable filter over an in-memory result list.
pub fn filter_results(results: &[HotelResult], filters: &HotelFilters) -> Vec<HotelResult> {
    results
        .iter()
        .filter(|hotel| {
            filters
                .star_rating
                .map_or(true, |stars| hotel.star_rating == stars)
                && filters
                    .refundable
                    .map_or(true, |wanted| hotel.refundable == wanted)
                && filters
                    .meal_plan
                    .as_ref()
                    .map_or(true, |plan| &hotel.meal_plan == plan)
                && filters
                    .max_price
                    .map_or(true, |max| hotel.price.offered <= max)
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    PriceAscending,
    StarRatingDescending,
    Name,
}

/// Stable sort; ties keep their original result order.
pub fn sort_results(results: &mut [HotelResult], key: SortKey) {
    match key {
        SortKey::PriceAscending => results.sort_by(|a, b| {
            a.price
                .offered
                .partial_cmp(&b.price.offered)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortKey::StarRatingDescending => {
            results.sort_by(|a, b| b.star_rating.cmp(&a.star_rating))
        }
        SortKey::Name => results.sort_by(|a, b| a.hotel_name.cmp(&b.hotel_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{offer, MockSupplier};
    use crate::model::{HotelResult, RoomRequest};
    use std::sync::atomic::Ordering;
    use test_case::test_case;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            check_in: "2024-03-15".parse().unwrap(),
            check_out: "2024-03-18".parse().unwrap(),
            city_code: "BOM".to_string(),
            nationality: "IN".to_string(),
            rooms: vec![RoomRequest {
                adults: 2,
                children: 0,
                children_ages: vec![],
            }],
        }
    }

    fn today() -> NaiveDate {
        "2024-03-01".parse().unwrap()
    }

    fn result(code: &str, name: &str, stars: u8, offered: f64, refundable: bool) -> HotelResult {
        let mut r = HotelResult::from(offer(code, name, stars, offered));
        r.refundable = refundable;
        r
    }

    #[tokio::test]
    async fn invalid_criteria_fail_before_any_network_call() {
        let supplier = Arc::new(MockSupplier::new());
        let engine = SearchEngine::new(supplier.clone(), SearchEngineConfig::default());

        let mut bad = criteria();
        bad.check_out = bad.check_in;
        let err = engine.search_as_of(bad, today()).await.unwrap_err();
        assert!(matches!(err, BookingError::ValidationError(_)));
        assert_eq!(supplier.calls.search.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_returns_normalized_results() {
        let supplier = Arc::new(MockSupplier::new().with_search_results(vec![
            offer("BC-1", "Sea Crest Palace", 5, 340.0),
            offer("BC-2", "Harbour Lodge", 3, 120.0),
        ]));
        let engine = SearchEngine::new(supplier, SearchEngineConfig::default());

        let outcome = engine.search_as_of(criteria(), today()).await.unwrap();
        assert!(!outcome.degraded);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].booking_code, "BC-1");
        assert_eq!(outcome.criteria.city_code, "BOM");
    }

    #[tokio::test]
    async fn unreachable_supplier_serves_degraded_cache() {
        let supplier = Arc::new(
            MockSupplier::new().with_search_results(vec![offer("BC-1", "Sea Crest", 5, 340.0)]),
        );
        let engine = SearchEngine::new(supplier.clone(), SearchEngineConfig::default());

        let fresh = engine.search_as_of(criteria(), today()).await.unwrap();
        assert!(!fresh.degraded);

        supplier.fail_next_requests(1);
        let fallback = engine.search_as_of(criteria(), today()).await.unwrap();
        assert!(fallback.degraded);
        assert_eq!(fallback.results, fresh.results);
    }

    #[tokio::test]
    async fn unreachable_supplier_without_cache_surfaces_error() {
        let supplier = Arc::new(MockSupplier::new());
        let engine = SearchEngine::new(supplier.clone(), SearchEngineConfig::default());

        supplier.fail_next_requests(1);
        let err = engine.search_as_of(criteria(), today()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn expired_cache_is_not_served() {
        let supplier = Arc::new(
            MockSupplier::new().with_search_results(vec![offer("BC-1", "Sea Crest", 5, 340.0)]),
        );
        let engine = SearchEngine::new(
            supplier.clone(),
            SearchEngineConfig {
                fallback_ttl: Duration::from_secs(0),
            },
        );

        engine.search_as_of(criteria(), today()).await.unwrap();
        supplier.fail_next_requests(1);
        assert!(engine.search_as_of(criteria(), today()).await.is_err());
    }

    fn sample_results() -> Vec<HotelResult> {
        vec![
            result("BC-1", "Sea Crest Palace", 5, 340.0, true),
            result("BC-2", "Harbour Lodge", 3, 120.0, false),
            result("BC-3", "Bayview Suites", 4, 120.0, true),
            result("BC-4", "Airport Rest", 3, 80.0, false),
        ]
    }

    #[test_case(HotelFilters { star_rating: Some(3), ..Default::default() }, vec!["BC-2", "BC-4"] ; "by star rating")]
    #[test_case(HotelFilters { refundable: Some(true), ..Default::default() }, vec!["BC-1", "BC-3"] ; "by refundability")]
    #[test_case(HotelFilters { max_price: Some(120.0), ..Default::default() }, vec!["BC-2", "BC-3", "BC-4"] ; "by max price")]
    #[test_case(HotelFilters { refundable: Some(false), max_price: Some(100.0), ..Default::default() }, vec!["BC-4"] ; "combined")]
    fn filtering(filters: HotelFilters, expected: Vec<&str>) {
        let filtered = filter_results(&sample_results(), &filters);
        let codes: Vec<&str> = filtered.iter().map(|h| h.booking_code.as_str()).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn filter_is_idempotent() {
        let filters = HotelFilters {
            max_price: Some(150.0),
            ..Default::default()
        };
        let once = filter_results(&sample_results(), &filters);
        let twice = filter_results(&once, &filters);
        assert_eq!(once, twice);
    }

    #[test]
    fn price_sort_is_stable_on_ties() {
        let mut results = sample_results();
        sort_results(&mut results, SortKey::PriceAscending);
        let codes: Vec<&str> = results.iter().map(|h| h.booking_code.as_str()).collect();
        // BC-2 and BC-3 tie at 120.0 and keep their original relative order.
        assert_eq!(codes, vec!["BC-4", "BC-2", "BC-3", "BC-1"]);
    }

    #[test]
    fn star_sort_descending() {
        let mut results = sample_results();
        sort_results(&mut results, SortKey::StarRatingDescending);
        let stars: Vec<u8> = results.iter().map(|h| h.star_rating).collect();
        assert_eq!(stars, vec![5, 4, 3, 3]);
        // The two 3-star hotels keep search order.
        assert_eq!(results[2].booking_code, "BC-2");
        assert_eq!(results[3].booking_code, "BC-4");
    }

    #[test]
    fn name_sort_lexicographic() {
        let mut results = sample_results();
        sort_results(&mut results, SortKey::Name);
        assert_eq!(results[0].hotel_name, "Airport Rest");
        assert_eq!(results[3].hotel_name, "Sea Crest Palace");
    }

    #[tokio::test]
    async fn hotel_detail_refreshes_single_offer() {
        let supplier = Arc::new(
            MockSupplier::new().with_search_results(vec![offer("BC-1", "Sea Crest", 5, 340.0)]),
        );
        let engine = SearchEngine::new(supplier, SearchEngineConfig::default());

        let detail = engine.hotel_detail("BC-1").await.unwrap();
        assert_eq!(detail.booking_code, "BC-1");

        let err = engine.hotel_detail("  ").await.unwrap_err();
        assert!(matches!(err, BookingError::ValidationError(_)));
    }
}
