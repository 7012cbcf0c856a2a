//! Rider-facing routes and server startup

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use uuid::Uuid;

use super::admin::{admin_router, AdminState};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::config::ServiceConfig;
use crate::error::{LiftClubError, Result};
use crate::managers::{
    ClubFilters, Page, SearchOptions, SharedLifecycleManager, SharedQueryEngine, SortBy,
    SortOrder,
};
use crate::models::{ClubStatus, LiftClub, LiftClubRequestDraft, MemberContact, RouteType};
use crate::state::SharedClubRegistry;
use crate::validator::{self, ValidationResult};

/// State for the public routes
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedClubRegistry,
    pub lifecycle: SharedLifecycleManager,
    pub queries: SharedQueryEngine,
}

/// Body of `POST /api/requests`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    requester_id: String,
    #[serde(flatten)]
    draft: LiftClubRequestDraft,
}

/// Body of `POST /api/clubs/:id/join`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinBody {
    member_id: String,
    #[serde(flatten)]
    contact: MemberContact,
}

/// Query string of `GET /api/clubs`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClubSearchParams {
    q: Option<String>,
    sort_by: Option<SortBy>,
    sort_order: Option<SortOrder>,
    page: Option<u32>,
    limit: Option<u32>,
    #[serde(rename = "type")]
    club_type: Option<RouteType>,
    status: Option<ClubStatus>,
    max_budget: Option<i64>,
    /// Comma separated, e.g. `1,3,5`
    days: Option<String>,
    departure_from: Option<String>,
    departure_to: Option<String>,
}

impl ClubSearchParams {
    fn into_query(self) -> Result<(SearchOptions, ClubFilters)> {
        let options = SearchOptions {
            query: self.q,
            sort_by: self.sort_by,
            sort_order: self.sort_order.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(0),
        };
        let filters = ClubFilters {
            club_type: self.club_type,
            status: self.status,
            max_budget: self.max_budget,
            days_of_week: parse_days(self.days.as_deref())?,
            departure_from: self.departure_from,
            departure_to: self.departure_to,
        };
        Ok((options, filters))
    }
}

/// Parse a comma separated day list such as `1,2,5`
pub(super) fn parse_days(raw: Option<&str>) -> Result<Vec<u8>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u8>() {
            Ok(day) if day <= 6 => Ok(day),
            _ => Err(LiftClubError::ValidationFailed {
                errors: vec![format!(
                    "Day '{}' must be between 0 (Sunday) and 6 (Saturday)",
                    part
                )],
            }),
        })
        .collect()
}

/// Assemble the public and admin routers
pub fn build_router(state: AppState, admin_state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/requests/validate", post(validate_request))
        .route("/api/requests", post(submit_request))
        .route("/api/clubs", get(search_clubs))
        .route("/api/clubs/:id", get(get_club))
        .route("/api/clubs/:id/join", post(join_club))
        .route("/api/clubs/:id/members/:member_id/leave", post(leave_club))
        .with_state(state)
        .nest("/admin", admin_router(admin_state))
        .layer(CorsLayer::permissive())
}

/// Serve `app` until `handle` is told to shut down
pub async fn start_web_server(
    config: &ServiceConfig,
    app: Router,
    handle: Handle,
) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", cert_path.display());
            info!("  Private key: {}", key_path.display());

            if !cert_path.exists() {
                return Err(anyhow::anyhow!(
                    "Certificate file not found: {}",
                    cert_path.display()
                ));
            }
            if !key_path.exists() {
                return Err(anyhow::anyhow!(
                    "Private key file not found: {}",
                    key_path.display()
                ));
            }

            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                        e,
                        cert_path.display(),
                        key_path.display()
                    )
                })?;

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            info!("Web server listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    info!("Web server stopped");
    Ok(())
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clubs": state.registry.club_count(),
    }))
}

/// POST /api/requests/validate - dry run of the submission rules
async fn validate_request(
    ApiJson(draft): ApiJson<LiftClubRequestDraft>,
) -> Json<ValidationResult> {
    Json(validator::validate(&draft))
}

/// POST /api/requests
async fn submit_request(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SubmitBody>,
) -> Result<impl IntoResponse> {
    let request = state.lifecycle.submit(body.draft, &body.requester_id)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/clubs
async fn search_clubs(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ClubSearchParams>,
) -> Result<Json<Page<LiftClub>>> {
    let (options, filters) = params.into_query()?;
    debug!(?options, ?filters, "Club search");
    Ok(Json(state.queries.search_clubs(&options, &filters)?))
}

/// GET /api/clubs/:id
async fn get_club(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<LiftClub>> {
    Ok(Json(state.queries.club(id)?))
}

/// POST /api/clubs/:id/join
async fn join_club(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<JoinBody>,
) -> Result<impl IntoResponse> {
    let membership = state
        .registry
        .join_with_contact(id, &body.member_id, body.contact)?;
    Ok(Json(membership))
}

/// POST /api/clubs/:id/members/:member_id/leave
async fn leave_club(
    State(state): State<AppState>,
    ApiPath((id, member_id)): ApiPath<(Uuid, String)>,
) -> Result<StatusCode> {
    state.registry.leave(id, &member_id)?;
    Ok(StatusCode::NO_CONTENT)
}
