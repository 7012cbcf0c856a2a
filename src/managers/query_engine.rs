//! Read-only search, filtering, sorting and paging over clubs and requests.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{LiftClubError, Result};
use crate::models::{Caller, ClubStatus, LiftClub, LiftClubRequest, RequestStatus, RouteType};
use crate::state::{SharedClubRegistry, SharedRequestStore};
use crate::validator::is_valid_time;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Distance,
    Cost,
    DepartureTime,
    #[default]
    CreatedDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Free text, ordering and paging shared by every search
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub sort_by: Option<SortBy>,
    pub sort_order: SortOrder,
    /// 1-indexed; 0 is treated as 1
    pub page: u32,
    /// 0 means the default page size
    pub limit: u32,
}

/// Filters over clubs, combined with AND
#[derive(Debug, Clone, Default)]
pub struct ClubFilters {
    pub club_type: Option<RouteType>,
    pub status: Option<ClubStatus>,
    /// Upper bound on the monthly fee
    pub max_budget: Option<i64>,
    /// Matches clubs running on any of these days
    pub days_of_week: Vec<u8>,
    pub departure_from: Option<String>,
    pub departure_to: Option<String>,
}

/// Filters over requests, combined with AND
#[derive(Debug, Clone, Default)]
pub struct RequestFilters {
    pub status: Option<RequestStatus>,
    pub route_type: Option<RouteType>,
    pub requester_id: Option<String>,
    pub days_of_week: Vec<u8>,
    pub departure_from: Option<String>,
    pub departure_to: Option<String>,
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub has_more: bool,
    pub page: u32,
    pub limit: u32,
}

pub struct QueryEngine {
    registry: SharedClubRegistry,
    requests: SharedRequestStore,
}

impl QueryEngine {
    pub fn new(registry: SharedClubRegistry, requests: SharedRequestStore) -> Self {
        Self { registry, requests }
    }

    /// Browse clubs
    pub fn search_clubs(
        &self,
        options: &SearchOptions,
        filters: &ClubFilters,
    ) -> Result<Page<LiftClub>> {
        let range = DepartureRange::parse(&filters.departure_from, &filters.departure_to)?;
        let needle = normalized_query(&options.query);

        let mut clubs: Vec<LiftClub> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|c| filters.club_type.map_or(true, |t| c.club_type == t))
            .filter(|c| filters.status.map_or(true, |s| c.status == s))
            .filter(|c| filters.max_budget.map_or(true, |b| c.monthly_fee <= b))
            .filter(|c| days_intersect(&c.days_of_week, &filters.days_of_week))
            .filter(|c| range.contains(&c.departure_time))
            .filter(|c| {
                matches_text(
                    needle.as_deref(),
                    [&c.name, &c.pickup_location, &c.dropoff_location],
                )
            })
            .collect();

        let sort_by = options.sort_by.unwrap_or_default();
        let order = options.sort_order;
        clubs.sort_by(|a, b| {
            let primary = match sort_by {
                SortBy::Distance => {
                    compare_known_first(a.distance_meters, b.distance_meters, order)
                }
                SortBy::Cost => order.apply(a.monthly_fee.cmp(&b.monthly_fee)),
                SortBy::DepartureTime => order.apply(a.departure_time.cmp(&b.departure_time)),
                SortBy::CreatedDate => order.apply(a.created_at.cmp(&b.created_at)),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        Ok(paginate(clubs, options.page, options.limit))
    }

    /// Admin review queue. Riders are refused.
    pub fn search_requests(
        &self,
        caller: &Caller,
        options: &SearchOptions,
        filters: &RequestFilters,
    ) -> Result<Page<LiftClubRequest>> {
        if !caller.is_admin() {
            return Err(LiftClubError::PermissionDenied {
                message: format!("{} may not browse club requests", caller.id),
            });
        }

        let range = DepartureRange::parse(&filters.departure_from, &filters.departure_to)?;
        let needle = normalized_query(&options.query);

        let mut requests: Vec<LiftClubRequest> = self
            .requests
            .snapshot()
            .into_iter()
            .filter(|r| filters.status.map_or(true, |s| r.status == s))
            .filter(|r| filters.route_type.map_or(true, |t| r.route_type == t))
            .filter(|r| {
                filters
                    .requester_id
                    .as_ref()
                    .map_or(true, |id| &r.requester_id == id)
            })
            .filter(|r| days_intersect(&r.days_of_week, &filters.days_of_week))
            .filter(|r| range.contains(&r.preferred_departure_time))
            .filter(|r| {
                matches_text(
                    needle.as_deref(),
                    [&r.proposed_name, &r.pickup_location, &r.dropoff_location],
                )
            })
            .collect();

        let sort_by = options.sort_by.unwrap_or_default();
        let order = options.sort_order;
        requests.sort_by(|a, b| {
            let primary = match sort_by {
                // Requests carry no route length
                SortBy::Distance => Ordering::Equal,
                SortBy::Cost => order.apply(a.max_budget.cmp(&b.max_budget)),
                SortBy::DepartureTime => order.apply(
                    a.preferred_departure_time
                        .cmp(&b.preferred_departure_time),
                ),
                SortBy::CreatedDate => order.apply(a.created_at.cmp(&b.created_at)),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        Ok(paginate(requests, options.page, options.limit))
    }

    pub fn club(&self, club_id: Uuid) -> Result<LiftClub> {
        self.registry.get(club_id)
    }
}

/// Inclusive `HH:MM` window; fixed width makes string order time order
struct DepartureRange<'a> {
    from: Option<&'a str>,
    to: Option<&'a str>,
}

impl<'a> DepartureRange<'a> {
    fn parse(from: &'a Option<String>, to: &'a Option<String>) -> Result<Self> {
        let mut errors = Vec::new();
        for (value, name) in [(from, "departureFrom"), (to, "departureTo")] {
            if let Some(v) = value {
                if !is_valid_time(v) {
                    errors.push(format!("{name} must be in 24-hour HH:MM format"));
                }
            }
        }
        if !errors.is_empty() {
            return Err(LiftClubError::ValidationFailed { errors });
        }
        Ok(Self {
            from: from.as_deref(),
            to: to.as_deref(),
        })
    }

    fn contains(&self, time: &str) -> bool {
        self.from.map_or(true, |f| time >= f) && self.to.map_or(true, |t| time <= t)
    }
}

fn normalized_query(query: &Option<String>) -> Option<String> {
    query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}

fn matches_text<const N: usize>(needle: Option<&str>, fields: [&String; N]) -> bool {
    match needle {
        None => true,
        Some(needle) => fields.iter().any(|f| f.to_lowercase().contains(needle)),
    }
}

fn days_intersect(days: &[u8], wanted: &[u8]) -> bool {
    wanted.is_empty() || days.iter().any(|d| wanted.contains(d))
}

/// Unknown values go last whatever the direction
fn compare_known_first(a: Option<u32>, b: Option<u32>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let page = page.max(1);
    let limit = match limit {
        0 => DEFAULT_PAGE_LIMIT,
        l => l.min(MAX_PAGE_LIMIT),
    };
    let total_count = items.len();
    let start = (page as usize - 1).saturating_mul(limit as usize);
    let has_more = (page as usize).saturating_mul(limit as usize) < total_count;

    Page {
        items: items
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect(),
        total_count,
        has_more,
        page,
        limit,
    }
}

/// Shared query engine type
pub type SharedQueryEngine = Arc<QueryEngine>;

pub fn create_shared_query_engine(
    registry: SharedClubRegistry,
    requests: SharedRequestStore,
) -> SharedQueryEngine {
    Arc::new(QueryEngine::new(registry, requests))
}
