use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use studio_pos_core::domain::movement::{
    ClientId, Movement, MovementCategory, MovementId, SaleDraft,
};
use studio_pos_core::errors::ApplicationError;
use studio_pos_core::pricing::{DiscountDirective, LineItem};

use super::pricing::form_discount;
use super::{ApiError, ApiJson, ApiState, CorrelationId, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct CreateMovementBody {
    #[serde(default)]
    pub client_id: Option<String>,
    pub category: MovementCategory,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount: Option<DiscountDirective>,
    #[serde(default)]
    pub discount_reason: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub appointment_date: Option<NaiveDate>,
    #[serde(default)]
    pub appointment_time: Option<NaiveTime>,
}

impl CreateMovementBody {
    /// Walk-in sales without a client fall back to the general-public
    /// sentinel, or the general-deposit one for deposits.
    fn client_id(&self) -> ClientId {
        match self.client_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => ClientId(id.to_string()),
            _ if self.category == MovementCategory::Deposit => ClientId::general_deposit(),
            _ => ClientId::general_public(),
        }
    }
}

pub async fn create(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    ApiJson(mut body): ApiJson<CreateMovementBody>,
) -> Result<(StatusCode, Json<Movement>), ApiError> {
    let reject = |error: ApplicationError| ApiError::new(error, &correlation_id);
    let discount = form_discount(body.discount.take()).map_err(|error| reject(error.into()))?;

    let mut draft = SaleDraft::new(body.client_id(), body.category, body.line_items);
    if let Some(discount) = discount {
        draft = draft.with_discount(discount, body.discount_reason);
    }
    draft.payment_method = body.payment_method;
    draft.staff_name = body.staff_name;
    draft.notes = body.notes;
    draft.appointment_date = body.appointment_date;
    draft.appointment_time = body.appointment_time;

    let movement = state.movements.record_sale(draft, &user).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsQuery {
    #[serde(default)]
    pub include_pending: bool,
}

pub async fn list(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListMovementsQuery>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    state
        .movements
        .list(query.include_pending, &user)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

pub async fn history(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    state
        .movements
        .history(&ClientId(client_id), &user)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

pub async fn remove(
    State(state): State<ApiState>,
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .movements
        .delete(&MovementId(id), &user)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::api::test_support::{api, TestApi};

    async fn record(api: &TestApi, body: Value) -> Value {
        let (status, movement) =
            api.send(Method::POST, "/api/v1/movements", Some(&api.staff_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{movement}");
        movement
    }

    #[tokio::test]
    async fn deposit_credit_sale_is_recorded_with_its_discount() {
        let api = api().await;

        let movement = record(
            &api,
            json!({
                "client_id": "cli-ana",
                "category": "service",
                "line_items": [
                    { "description": "Uñas acrílicas", "price": "1200.00", "quantity": 1 },
                    { "description": "Pedicure", "price": "370.00", "quantity": 1 }
                ],
                "discount": {
                    "kind": "deposit_credit",
                    "value": "500",
                    "source_reference": "F7K2Q"
                },
                "discount_reason": "anticipo",
                "payment_method": "efectivo",
                "appointment_date": "2026-10-20",
                "appointment_time": "16:30:00"
            }),
        )
        .await;

        assert_eq!(movement["folio"].as_str().map(str::len), Some(5));
        assert_eq!(movement["subtotal"], "1570.00");
        assert_eq!(movement["amount"], "1070.00");
        assert_eq!(movement["discount"]["kind"], "deposit_credit");
        assert_eq!(movement["discount"]["source_reference"], "F7K2Q");
        assert_eq!(movement["line_items_description"], "Uñas acrílicas, Pedicure");
        assert_eq!(movement["cancellation_state"], "none");
    }

    #[tokio::test]
    async fn walk_in_deposit_uses_deposit_sentinel() {
        let api = api().await;

        let movement = record(
            &api,
            json!({
                "category": "deposit",
                "line_items": [{ "description": "Anticipo", "price": "500", "quantity": 1 }]
            }),
        )
        .await;

        assert_eq!(movement["client_id"], "general-deposit");
    }

    #[tokio::test]
    async fn empty_cart_is_a_bad_request() {
        let api = api().await;

        let (status, _) = api
            .send(
                Method::POST,
                "/api/v1/movements",
                Some(&api.staff_token),
                Some(json!({ "category": "service", "line_items": [] })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_category_is_a_json_bad_request() {
        let api = api().await;

        let (status, body) = api
            .send(
                Method::POST,
                "/api/v1/movements",
                Some(&api.staff_token),
                Some(json!({
                    "category": "gift-card",
                    "line_items": [{ "description": "Corte", "price": "300", "quantity": 1 }]
                })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().unwrap_or_default().contains("category"));
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn direct_delete_requires_admin() {
        let api = api().await;
        let movement = record(
            &api,
            json!({
                "category": "course",
                "line_items": [{ "description": "Curso gel", "price": "2500", "quantity": 1 }]
            }),
        )
        .await;
        let uri = format!("/api/v1/movements/{}", movement["id"].as_str().unwrap_or_default());

        let (status, _) = api.send(Method::DELETE, &uri, Some(&api.staff_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = api.send(Method::DELETE, &uri, Some(&api.admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = api.send(Method::DELETE, &uri, Some(&api.admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pending_movements_only_show_when_asked_or_in_client_history() {
        let api = api().await;
        let movement = record(
            &api,
            json!({
                "client_id": "cli-luz",
                "category": "service",
                "line_items": [{ "description": "Tinte", "price": "800", "quantity": 1 }]
            }),
        )
        .await;
        let id = movement["id"].as_str().unwrap_or_default().to_string();
        let (status, _) = api
            .send(
                Method::POST,
                &format!("/api/v1/movements/{id}/cancellation-requests"),
                Some(&api.staff_token),
                Some(json!({ "reason": "cobro duplicado" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, visible) =
            api.send(Method::GET, "/api/v1/movements", Some(&api.staff_token), None).await;
        assert_eq!(visible, json!([]));

        let (_, everything) = api
            .send(
                Method::GET,
                "/api/v1/movements?include_pending=true",
                Some(&api.staff_token),
                None,
            )
            .await;
        assert_eq!(everything[0]["cancellation_state"], "pending_review");

        let (_, history) = api
            .send(Method::GET, "/api/v1/clients/cli-luz/movements", Some(&api.staff_token), None)
            .await;
        assert_eq!(history.as_array().map(Vec::len), Some(1));
        assert_eq!(history[0]["id"], id.as_str());
    }
}
