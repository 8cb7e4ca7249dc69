//! REST API handlers for campaign lifecycle operations.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use outreach_core::OutreachError;
use outreach_engine::types::{Campaign, CampaignDetail, CampaignPhase, CreateCampaignRequest};
use outreach_engine::CampaignEngine;

/// Maximum string field length (campaign name, pause reason).
const MAX_FIELD_LEN: usize = 256;

/// Maximum template length.
const MAX_TEMPLATE_LEN: usize = 16_384;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CampaignEngine>,
    pub start_time: Instant,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct PauseRequest {
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    pub added: usize,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub phase: Option<CampaignPhase>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn into_api_error(err: OutreachError) -> ApiError {
    let (status, code) = match &err {
        OutreachError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        OutreachError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        OutreachError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        metrics::counter!("api.errors").increment(1);
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

/// Validate a create-campaign request at the API boundary. Semantic
/// validation (empty body, inverted window) lives in the engine.
fn validate_create(req: &CreateCampaignRequest) -> Result<(), &'static str> {
    if req.name.len() > MAX_FIELD_LEN {
        return Err("campaign 'name' exceeds maximum length");
    }
    if req.body_template.len() > MAX_TEMPLATE_LEN {
        return Err("'body_template' exceeds maximum length");
    }
    if let Some(subject) = &req.subject_template {
        if subject.len() > MAX_FIELD_LEN {
            return Err("'subject_template' exceeds maximum length");
        }
    }
    Ok(())
}

/// POST /v1/campaigns — Create a recurring message campaign.
#[utoipa::path(
    post,
    path = "/v1/campaigns",
    tag = "Campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Campaign created", body = Campaign),
        (status = 400, description = "Invalid campaign definition", body = ErrorResponse),
    )
)]
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    if let Err(msg) = validate_create(&request) {
        warn!(name = %request.name, error = msg, "Campaign creation rejected at boundary");
        metrics::counter!("api.validation_errors").increment(1);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "validation_failed".to_string(),
                message: msg.to_string(),
            }),
        ));
    }

    let campaign = state.engine.create_campaign(request).map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /v1/campaigns — List campaigns, optionally filtered by phase.
#[utoipa::path(
    get,
    path = "/v1/campaigns",
    tag = "Campaigns",
    params(
        ("phase" = Option<CampaignPhase>, Query, description = "Filter by lifecycle phase"),
    ),
    responses(
        (status = 200, description = "Campaigns", body = [Campaign]),
    )
)]
pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Campaign>> {
    Json(state.engine.list(query.phase))
}

/// GET /v1/campaigns/{id} — Campaign definition, recent instances, and the
/// active roster.
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Campaign detail", body = CampaignDetail),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
    )
)]
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignDetail>, ApiError> {
    state.engine.get(id).map(Json).map_err(into_api_error)
}

/// POST /v1/campaigns/{id}/pause — Pause an active campaign.
#[utoipa::path(
    post,
    path = "/v1/campaigns/{id}/pause",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    request_body = PauseRequest,
    responses(
        (status = 200, description = "Campaign paused", body = Campaign),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
        (status = 409, description = "Campaign not active", body = ErrorResponse),
    )
)]
pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PauseRequest>,
) -> Result<Json<Campaign>, ApiError> {
    if request.reason.trim().is_empty() || request.reason.len() > MAX_FIELD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "validation_failed".to_string(),
                message: "pause 'reason' must be non-empty and reasonably short".to_string(),
            }),
        ));
    }
    state
        .engine
        .pause(id, &request.reason)
        .map(Json)
        .map_err(into_api_error)
}

/// POST /v1/campaigns/{id}/resume — Resume a paused campaign.
#[utoipa::path(
    post,
    path = "/v1/campaigns/{id}/resume",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Campaign resumed", body = Campaign),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
        (status = 409, description = "Campaign not paused", body = ErrorResponse),
    )
)]
pub async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state.engine.resume(id).map(Json).map_err(into_api_error)
}

/// DELETE /v1/campaigns/{id} — Stop a campaign permanently.
#[utoipa::path(
    delete,
    path = "/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Campaign stopped", body = Campaign),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
        (status = 409, description = "Campaign already terminal", body = ErrorResponse),
    )
)]
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state.engine.delete(id).map(Json).map_err(into_api_error)
}

/// POST /v1/campaigns/{id}/refresh-audience — Re-resolve the audience and add
/// new matches to the roster.
#[utoipa::path(
    post,
    path = "/v1/campaigns/{id}/refresh-audience",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Audience refreshed", body = RefreshResponse),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
    )
)]
pub async fn refresh_audience(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshResponse>, ApiError> {
    state
        .engine
        .refresh_audience(id)
        .map(|added| Json(RefreshResponse { added }))
        .map_err(into_api_error)
}

/// GET /health — Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses((status = 200, description = "Ready to accept traffic"))
)]
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
