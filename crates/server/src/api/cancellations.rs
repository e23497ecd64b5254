use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use studio_pos_core::domain::cancellation::{
    CancellationDecision, CancellationRequest, CancellationRequestId, CancellationStatus,
};
use studio_pos_core::domain::movement::MovementId;

use super::{ApiError, ApiJson, ApiState, CorrelationId, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct OpenRequestBody {
    #[serde(default)]
    pub reason: String,
}

pub async fn open(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Path(movement_id): Path<String>,
    ApiJson(body): ApiJson<OpenRequestBody>,
) -> Result<(StatusCode, Json<CancellationRequest>), ApiError> {
    state
        .workflow
        .request_cancellation(&MovementId(movement_id), &body.reason, &user)
        .await
        .map(|request| (StatusCode::CREATED, Json(request)))
        .map_err(|error| ApiError::new(error, &correlation_id))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn list(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<CancellationRequest>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|status| !status.trim().is_empty())
        .map(CancellationStatus::from_str)
        .transpose()
        .map_err(|error| ApiError::new(error.into(), &correlation_id))?;

    state
        .workflow
        .list_requests(status, &user)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

#[derive(Debug, Deserialize)]
pub struct ResolutionBody {
    pub decision: CancellationDecision,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn resolve(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Path(request_id): Path<String>,
    ApiJson(body): ApiJson<ResolutionBody>,
) -> Result<Json<CancellationRequest>, ApiError> {
    state
        .workflow
        .resolve(&CancellationRequestId(request_id), body.decision, body.admin_notes, &user)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}
