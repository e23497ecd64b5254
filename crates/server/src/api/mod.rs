//! JSON API for the front desk.
//!
//! | Method | Path                                           | Purpose                       |
//! |--------|------------------------------------------------|-------------------------------|
//! | GET    | `/api/v1/me`                                   | acting user                   |
//! | POST   | `/api/v1/pricing/preview`                      | price a cart without storing  |
//! | POST   | `/api/v1/movements`                            | record a sale                 |
//! | GET    | `/api/v1/movements?include_pending=`           | list movements                |
//! | GET    | `/api/v1/clients/{client_id}/movements`        | client history                |
//! | DELETE | `/api/v1/movements/{id}`                       | direct delete (admin)         |
//! | POST   | `/api/v1/movements/{id}/cancellation-requests` | open a cancellation request   |
//! | GET    | `/api/v1/cancellation-requests?status=`        | review queue (admin)          |
//! | POST   | `/api/v1/cancellation-requests/{id}/resolution`| approve or deny (admin)       |
//!
//! Every route needs a session token, sent as `Authorization: Bearer <token>`
//! or in the configured session cookie.

mod cancellations;
mod movements;
mod pricing;

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use studio_pos_core::domain::user::User;
use studio_pos_core::errors::{ApplicationError, InterfaceError};
use studio_pos_db::repositories::UserRepository;
use studio_pos_db::{CancellationWorkflow, MovementService};
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub movements: Arc<MovementService>,
    pub workflow: Arc<CancellationWorkflow>,
    pub users: Arc<dyn UserRepository>,
    pub session_cookie: Arc<str>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/me", get(pricing::current_user))
        .route("/api/v1/pricing/preview", post(pricing::preview))
        .route("/api/v1/movements", post(movements::create).get(movements::list))
        .route("/api/v1/movements/{id}", delete(movements::remove))
        .route("/api/v1/clients/{client_id}/movements", get(movements::history))
        .route("/api/v1/movements/{id}/cancellation-requests", post(cancellations::open))
        .route("/api/v1/cancellation-requests", get(cancellations::list))
        .route("/api/v1/cancellation-requests/{id}/resolution", post(cancellations::resolve))
        .with_state(state)
        .layer(middleware::from_fn(correlate))
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    fn generate() -> Self {
        Self(format!("req-{}", Uuid::new_v4().simple()))
    }
}

/// Tags the request with a correlation id (the caller's, or a fresh one) and
/// runs it inside a span carrying that id.
async fn correlate(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(|value| CorrelationId(value.to_string()))
        .unwrap_or_else(CorrelationId::generate);

    let span = info_span!(
        "http.request",
        correlation_id = %correlation_id.0,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id.0) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub user_message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(error: ApplicationError, correlation_id: &CorrelationId) -> Self {
        let interface = error.into_interface(correlation_id.0.clone());
        match &interface {
            InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id.0,
                error = %message,
                "request failed"
            ),
            _ => warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id.0,
                error = %interface,
                "request rejected"
            ),
        }
        Self::from(interface)
    }

    fn unauthorized(correlation_id: &CorrelationId) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "unauthorized".to_string(),
                message: "missing or expired session".to_string(),
                user_message: "Your session has expired. Sign in again.".to_string(),
                correlation_id: correlation_id.0.clone(),
            },
        }
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        let (status, class) = match value {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        Self {
            status,
            body: ErrorBody {
                error: class.to_string(),
                message: value.message().to_string(),
                user_message: value.user_message().to_string(),
                correlation_id: value.correlation_id().to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// `Json` body extractor whose rejections carry the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = request
            .extensions()
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(CorrelationId::generate);

        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                warn!(
                    event_name = "api.request.rejected",
                    correlation_id = %correlation_id.0,
                    error = %message,
                    "request body rejected"
                );
                Err(ApiError::from(InterfaceError::BadRequest {
                    message,
                    correlation_id: correlation_id.0,
                }))
            }
        }
    }
}

/// The user behind the request's session token.
pub struct CurrentUser(pub User);

impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(CorrelationId::generate);
        let Some(token) = session_token(&parts.headers, &state.session_cookie) else {
            return Err(ApiError::unauthorized(&correlation_id));
        };

        match state.users.find_by_session_token(&token).await {
            Ok(Some(user)) => Ok(Self(user)),
            Ok(None) => Err(ApiError::unauthorized(&correlation_id)),
            Err(error) => Err(ApiError::new(error.into(), &correlation_id)),
        }
    }
}

fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
