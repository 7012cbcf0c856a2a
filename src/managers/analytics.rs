use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::managers::SharedLifecycleManager;
use crate::models::{ClubStatus, MembershipEventKind, RequestStatus};
use crate::state::SharedClubRegistry;

pub const POPULAR_ROUTES_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStat {
    pub pickup_location: String,
    pub dropoff_location: String,
    pub club_count: usize,
    pub member_count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    /// Calendar month as `YYYY-MM`
    pub month: String,
    pub joins: u64,
    pub leaves: u64,
    pub net: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_clubs: usize,
    /// Clubs still operating (active or full)
    pub active_clubs: usize,
    pub pending_requests: usize,
    /// Seats taken across operating clubs
    pub total_members: u64,
    /// Sum of operating clubs' monthly fees
    pub monthly_revenue: i64,
    pub popular_routes: Vec<RouteStat>,
    pub membership_trends: Vec<MonthlyTrend>,
    pub requests_by_status: RequestCounts,
}

/// Read-side reduction over clubs and request history
pub struct AnalyticsAggregator {
    registry: SharedClubRegistry,
    lifecycle: SharedLifecycleManager,
}

impl AnalyticsAggregator {
    pub fn new(registry: SharedClubRegistry, lifecycle: SharedLifecycleManager) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }

    pub fn summarize(&self) -> AnalyticsSummary {
        let clubs = self.registry.snapshot();
        let operating: Vec<_> = clubs
            .iter()
            .filter(|c| c.status != ClubStatus::Inactive)
            .collect();

        let mut routes: HashMap<(&str, &str), RouteStat> = HashMap::new();
        for club in &clubs {
            let stat = routes
                .entry((club.pickup_location.as_str(), club.dropoff_location.as_str()))
                .or_insert_with(|| RouteStat {
                    pickup_location: club.pickup_location.clone(),
                    dropoff_location: club.dropoff_location.clone(),
                    club_count: 0,
                    member_count: 0,
                });
            stat.club_count += 1;
            stat.member_count += u64::from(club.current_members);
        }
        let mut popular_routes: Vec<RouteStat> = routes.into_values().collect();
        popular_routes.sort_by(|a, b| {
            b.club_count
                .cmp(&a.club_count)
                .then_with(|| b.member_count.cmp(&a.member_count))
                .then_with(|| a.pickup_location.cmp(&b.pickup_location))
                .then_with(|| a.dropoff_location.cmp(&b.dropoff_location))
        });
        popular_routes.truncate(POPULAR_ROUTES_LIMIT);

        let mut months: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for event in self.registry.membership_events() {
            let bucket = months
                .entry(event.at.format("%Y-%m").to_string())
                .or_default();
            match event.kind {
                MembershipEventKind::Joined => bucket.0 += 1,
                MembershipEventKind::Left => bucket.1 += 1,
            }
        }
        let membership_trends = months
            .into_iter()
            .map(|(month, (joins, leaves))| MonthlyTrend {
                month,
                joins,
                leaves,
                net: joins as i64 - leaves as i64,
            })
            .collect();

        let mut requests_by_status = RequestCounts::default();
        for request in self.lifecycle.history() {
            match request.status {
                RequestStatus::Pending => requests_by_status.pending += 1,
                RequestStatus::Approved => requests_by_status.approved += 1,
                RequestStatus::Rejected => requests_by_status.rejected += 1,
                RequestStatus::Completed => requests_by_status.completed += 1,
            }
        }

        AnalyticsSummary {
            total_clubs: clubs.len(),
            active_clubs: operating.len(),
            pending_requests: requests_by_status.pending,
            total_members: operating
                .iter()
                .map(|c| u64::from(c.current_members))
                .sum(),
            monthly_revenue: operating.iter().map(|c| c.monthly_fee).sum(),
            popular_routes,
            membership_trends,
            requests_by_status,
        }
    }
}

/// Shared analytics aggregator type
pub type SharedAnalyticsAggregator = Arc<AnalyticsAggregator>;

pub fn create_shared_analytics(
    registry: SharedClubRegistry,
    lifecycle: SharedLifecycleManager,
) -> SharedAnalyticsAggregator {
    Arc::new(AnalyticsAggregator::new(registry, lifecycle))
}
