//! Admin routes and handlers
//!
//! Everything here sits behind [`require_admin`]:
//! - Searching and deciding club requests
//! - Deactivating clubs and listing their members
//! - Analytics summary
//! - Recent and live logs

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::info;
use uuid::Uuid;

use super::auth::require_admin;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::server::parse_days;
use crate::error::Result;
use crate::logging::{LogEntry, SharedLogBuffer};
use crate::managers::{
    AnalyticsSummary, Page, RequestFilters, SearchOptions, SharedAnalyticsAggregator,
    SharedLifecycleManager, SharedQueryEngine, SortBy, SortOrder,
};
use crate::models::{
    ApprovalDecision, Caller, LiftClub, LiftClubRequest, Membership, RequestStatus, RouteType,
};
use crate::state::SharedClubRegistry;

const DEFAULT_LOG_COUNT: usize = 200;

/// State for the admin routes
#[derive(Clone)]
pub struct AdminState {
    pub registry: SharedClubRegistry,
    pub lifecycle: SharedLifecycleManager,
    pub queries: SharedQueryEngine,
    pub analytics: SharedAnalyticsAggregator,
    pub log_buffer: SharedLogBuffer,
    pub admin_token: String,
}

/// Create admin router
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/requests", get(search_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/approve", post(approve_request))
        .route("/requests/:id/approve-existing", post(approve_onto_existing))
        .route("/requests/:id/reject", post(reject_request))
        .route("/requests/:id/complete", post(complete_request))
        .route("/requests/:id/notes", post(append_note))
        .route("/clubs/:id/deactivate", post(deactivate_club))
        .route("/clubs/:id/members", get(club_members))
        .route("/analytics", get(analytics))
        .route("/logs", get(logs))
        .route("/logs/stream", get(logs_stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestSearchParams {
    q: Option<String>,
    sort_by: Option<SortBy>,
    sort_order: Option<SortOrder>,
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<RequestStatus>,
    route_type: Option<RouteType>,
    requester_id: Option<String>,
    days: Option<String>,
    departure_from: Option<String>,
    departure_to: Option<String>,
}

impl RequestSearchParams {
    fn into_query(self) -> Result<(SearchOptions, RequestFilters)> {
        let options = SearchOptions {
            query: self.q,
            sort_by: self.sort_by,
            sort_order: self.sort_order.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(0),
        };
        let filters = RequestFilters {
            status: self.status,
            route_type: self.route_type,
            requester_id: self.requester_id,
            days_of_week: parse_days(self.days.as_deref())?,
            departure_from: self.departure_from,
            departure_to: self.departure_to,
        };
        Ok((options, filters))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveExistingBody {
    club_id: Uuid,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct CompleteBody {
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NoteBody {
    #[serde(default)]
    note: String,
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    count: Option<usize>,
}

/// GET /admin/requests
async fn search_requests(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(params): ApiQuery<RequestSearchParams>,
) -> Result<Json<Page<LiftClubRequest>>> {
    let (options, filters) = params.into_query()?;
    Ok(Json(
        state.queries.search_requests(&caller, &options, &filters)?,
    ))
}

/// GET /admin/requests/:id
async fn get_request(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<LiftClubRequest>> {
    Ok(Json(state.lifecycle.get(id)?))
}

/// POST /admin/requests/:id/approve - approve into a new club
async fn approve_request(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(decision): ApiJson<ApprovalDecision>,
) -> Result<impl IntoResponse> {
    let club = state.lifecycle.approve(id, decision)?;
    info!(admin = %caller.id, request_id = %id, club_id = %club.id, "Admin approved request");
    Ok((StatusCode::CREATED, Json(club)))
}

/// POST /admin/requests/:id/approve-existing - enrol the requester in an existing club
async fn approve_onto_existing(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ApproveExistingBody>,
) -> Result<Json<LiftClub>> {
    let club = state
        .lifecycle
        .approve_onto_existing(id, body.club_id, body.notes.as_deref())?;
    info!(
        admin = %caller.id,
        request_id = %id,
        club_id = %club.id,
        "Admin approved request onto existing club"
    );
    Ok(Json(club))
}

/// POST /admin/requests/:id/reject
async fn reject_request(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RejectBody>,
) -> Result<Json<LiftClubRequest>> {
    let request = state.lifecycle.reject(id, &body.reason)?;
    info!(admin = %caller.id, request_id = %id, "Admin rejected request");
    Ok(Json(request))
}

/// POST /admin/requests/:id/complete
async fn complete_request(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<CompleteBody>,
) -> Result<Json<LiftClubRequest>> {
    let request = state.lifecycle.complete(id, body.notes.as_deref())?;
    info!(admin = %caller.id, request_id = %id, "Admin completed request");
    Ok(Json(request))
}

/// POST /admin/requests/:id/notes
async fn append_note(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<NoteBody>,
) -> Result<Json<LiftClubRequest>> {
    Ok(Json(state.lifecycle.append_admin_note(id, &body.note)?))
}

/// POST /admin/clubs/:id/deactivate
async fn deactivate_club(
    State(state): State<AdminState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<LiftClub>> {
    let club = state.registry.deactivate(id)?;
    info!(admin = %caller.id, club_id = %id, "Admin deactivated club");
    Ok(Json(club))
}

/// GET /admin/clubs/:id/members
async fn club_members(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Membership>>> {
    Ok(Json(state.registry.memberships(id)?))
}

/// GET /admin/analytics
async fn analytics(State(state): State<AdminState>) -> Json<AnalyticsSummary> {
    Json(state.analytics.summarize())
}

/// GET /admin/logs - recent entries, oldest first
async fn logs(
    State(state): State<AdminState>,
    ApiQuery(params): ApiQuery<LogsParams>,
) -> Json<Vec<LogEntry>> {
    let count = params.count.unwrap_or(DEFAULT_LOG_COUNT);
    Json(state.log_buffer.get_recent(count))
}

/// GET /admin/logs/stream - SSE endpoint for live logs
async fn logs_stream(State(state): State<AdminState>) -> impl IntoResponse {
    let rx = state.log_buffer.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => Event::default().json_data(&entry).ok().map(Ok::<_, Infallible>),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
