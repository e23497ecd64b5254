use axum::{Extension, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use studio_pos_core::domain::user::User;
use studio_pos_core::errors::{ApplicationError, DomainError};
use studio_pos_core::pricing::{
    describe_line_items, price_cart, Discount, DiscountDirective, DiscountKind, LineItem,
    PricingError, PricingResult,
};

use super::{ApiError, ApiJson, CorrelationId, CurrentUser};

pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount: Option<DiscountDirective>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    #[serde(flatten)]
    pub pricing: PricingResult,
    pub description: String,
}

pub async fn preview(
    Extension(correlation_id): Extension<CorrelationId>,
    CurrentUser(_user): CurrentUser,
    ApiJson(body): ApiJson<PreviewBody>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let discount = form_discount(body.discount)
        .map_err(|error| ApiError::new(error.into(), &correlation_id))?;
    let pricing = price_cart(&body.line_items, discount.as_ref())
        .map_err(|error| ApiError::new(ApplicationError::from(error), &correlation_id))?
        .rounded();

    Ok(Json(PreviewResponse { pricing, description: describe_line_items(&body.line_items) }))
}

/// Validates a discount submitted from the sale form. Forms never carry a
/// percentage above 100.
pub(super) fn form_discount(
    directive: Option<DiscountDirective>,
) -> Result<Option<Discount>, DomainError> {
    let Some(directive) = directive else {
        return Ok(None);
    };
    let discount = Discount::try_from(directive)?;
    if let Discount::Percentage { value } = &discount {
        if *value > Decimal::ONE_HUNDRED {
            return Err(PricingError::InvalidDiscountValue {
                kind: DiscountKind::Percentage,
                reason: format!("{value}% exceeds 100%"),
            }
            .into());
        }
    }
    Ok(Some(discount))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_support::api;

    #[tokio::test]
    async fn preview_prices_without_storing() {
        let api = api().await;

        let (status, body) = api
            .send(
                Method::POST,
                "/api/v1/pricing/preview",
                Some(&api.staff_token),
                Some(json!({
                    "line_items": [
                        { "description": "Uñas acrílicas", "price": "450.00", "quantity": 2 },
                        { "description": "Diseño", "price": "120.50", "quantity": 1 }
                    ],
                    "discount": { "kind": "percentage", "value": "10" }
                })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subtotal"], "1020.50");
        assert_eq!(body["discount_amount"], "102.05");
        assert_eq!(body["total"], "918.45");
        assert_eq!(body["description"], "Uñas acrílicas x2, Diseño");

        let (_, listed) =
            api.send(Method::GET, "/api/v1/movements", Some(&api.staff_token), None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn form_percentage_above_one_hundred_is_rejected() {
        let api = api().await;

        let (status, body) = api
            .send(
                Method::POST,
                "/api/v1/pricing/preview",
                Some(&api.staff_token),
                Some(json!({
                    "line_items": [{ "description": "Corte", "price": "300", "quantity": 1 }],
                    "discount": { "kind": "percentage", "value": "150" }
                })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().unwrap_or_default().contains("exceeds 100%"));
    }

    #[tokio::test]
    async fn negative_quantity_is_a_bad_request() {
        let api = api().await;

        let (status, body) = api
            .send(
                Method::POST,
                "/api/v1/pricing/preview",
                Some(&api.staff_token),
                Some(json!({
                    "line_items": [{ "description": "Corte", "price": "300", "quantity": 0 }]
                })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap_or_default().contains("line item #0"));
    }

    #[tokio::test]
    async fn subtotal_overflow_is_a_bad_request() {
        let api = api().await;

        let (status, body) = api
            .send(
                Method::POST,
                "/api/v1/pricing/preview",
                Some(&api.staff_token),
                Some(json!({
                    "line_items": [{
                        "description": "Paquete",
                        "price": "79228162514264337593543950335",
                        "quantity": 2
                    }]
                })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().unwrap_or_default().contains("subtotal"));
    }
}
