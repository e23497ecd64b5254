use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rand::distributions::Uniform;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::pricing::{describe_line_items, price_cart, Discount, DiscountKind, LineItem};

pub const FOLIO_LENGTH: usize = 5;
const FOLIO_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementId(pub String);

impl MovementId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short receipt code. Drawn at random; not checked for uniqueness.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folio(pub String);

impl Folio {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let picks = Uniform::from(0..FOLIO_ALPHABET.len());
        let code =
            (0..FOLIO_LENGTH).map(|_| char::from(FOLIO_ALPHABET[rng.sample(picks)])).collect();
        Self(code)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub const GENERAL_PUBLIC: &'static str = "general-public";
    pub const GENERAL_DEPOSIT: &'static str = "general-deposit";

    pub fn general_public() -> Self {
        Self(Self::GENERAL_PUBLIC.to_string())
    }

    pub fn general_deposit() -> Self {
        Self(Self::GENERAL_DEPOSIT.to_string())
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == Self::GENERAL_PUBLIC || self.0 == Self::GENERAL_DEPOSIT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementCategory {
    Service,
    Course,
    Deposit,
}

impl MovementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Course => "course",
            Self::Deposit => "deposit",
        }
    }
}

impl std::str::FromStr for MovementCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "service" => Ok(Self::Service),
            "course" => Ok(Self::Course),
            "deposit" => Ok(Self::Deposit),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown movement category `{other}` (expected service|course|deposit)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    #[default]
    None,
    PendingReview,
}

/// The discount as recorded on a movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub kind: DiscountKind,
    pub value: Decimal,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub source_reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub folio: Folio,
    pub created_at: DateTime<Utc>,
    pub client_id: ClientId,
    pub category: MovementCategory,
    pub line_items_description: String,
    pub subtotal: Decimal,
    pub discount: Option<AppliedDiscount>,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub staff_name: Option<String>,
    pub notes: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub cancellation_state: CancellationState,
}

impl Movement {
    pub fn discount_amount(&self) -> Decimal {
        self.discount.as_ref().map(|discount| discount.amount).unwrap_or_default()
    }

    pub fn is_pending_review(&self) -> bool {
        self.cancellation_state == CancellationState::PendingReview
    }
}

/// A movement ready to be stored. Identity fields left empty are assigned by
/// the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub id: Option<MovementId>,
    pub folio: Option<Folio>,
    pub created_at: Option<DateTime<Utc>>,
    pub client_id: ClientId,
    pub category: MovementCategory,
    pub line_items_description: String,
    pub subtotal: Decimal,
    pub discount: Option<AppliedDiscount>,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub staff_name: Option<String>,
    pub notes: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
}

impl NewMovement {
    pub fn into_movement(self, now: DateTime<Utc>) -> Result<Movement, DomainError> {
        let discount_amount =
            self.discount.as_ref().map(|discount| discount.amount).unwrap_or_default();
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(DomainError::InvariantViolation(format!(
                "movement amount {} must not be negative",
                self.amount
            )));
        }
        if self.amount != (self.subtotal - discount_amount).max(Decimal::ZERO) {
            return Err(DomainError::InvariantViolation(format!(
                "movement amount {} does not equal subtotal {} minus discount {}",
                self.amount, self.subtotal, discount_amount
            )));
        }

        Ok(Movement {
            id: self.id.unwrap_or_else(MovementId::generate),
            folio: self.folio.unwrap_or_else(Folio::generate),
            created_at: self.created_at.unwrap_or(now),
            client_id: self.client_id,
            category: self.category,
            line_items_description: self.line_items_description,
            subtotal: self.subtotal,
            discount: self.discount,
            amount: self.amount,
            payment_method: self.payment_method,
            staff_name: self.staff_name,
            notes: self.notes,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            cancellation_state: CancellationState::None,
        })
    }
}

/// What the sale form submits: a cart plus an optional discount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub client_id: ClientId,
    pub category: MovementCategory,
    pub line_items: Vec<LineItem>,
    pub discount: Option<Discount>,
    pub discount_reason: Option<String>,
    pub payment_method: Option<String>,
    pub staff_name: Option<String>,
    pub notes: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
}

impl SaleDraft {
    pub fn new(client_id: ClientId, category: MovementCategory, line_items: Vec<LineItem>) -> Self {
        Self {
            client_id,
            category,
            line_items,
            discount: None,
            discount_reason: None,
            payment_method: None,
            staff_name: None,
            notes: None,
            appointment_date: None,
            appointment_time: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount, reason: Option<String>) -> Self {
        self.discount = Some(discount);
        self.discount_reason = reason;
        self
    }

    /// Runs the pricing engine and produces the record to persist.
    pub fn price(self) -> Result<NewMovement, DomainError> {
        if self.line_items.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a sale needs at least one line item".to_string(),
            ));
        }

        let pricing = price_cart(&self.line_items, self.discount.as_ref())?.rounded();
        let discount = self.discount.map(|discount| AppliedDiscount {
            kind: discount.kind(),
            value: discount.value(),
            amount: pricing.discount_amount,
            reason: normalize_optional(self.discount_reason),
            source_reference: discount.source_reference().map(str::to_string),
        });

        Ok(NewMovement {
            id: None,
            folio: None,
            created_at: None,
            client_id: self.client_id,
            category: self.category,
            line_items_description: describe_line_items(&self.line_items),
            subtotal: pricing.subtotal,
            discount,
            amount: pricing.total,
            payment_method: normalize_optional(self.payment_method),
            staff_name: normalize_optional(self.staff_name),
            notes: normalize_optional(self.notes),
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        })
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        CancellationState, ClientId, Folio, MovementCategory, SaleDraft, FOLIO_LENGTH,
    };
    use crate::errors::DomainError;
    use crate::pricing::{Discount, DiscountKind, LineItem, PricingError};

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    #[test]
    fn folio_is_five_uppercase_alphanumerics() {
        for _ in 0..50 {
            let Folio(code) = Folio::generate();
            assert_eq!(code.len(), FOLIO_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn sentinel_clients_are_recognized() {
        assert!(ClientId::general_public().is_sentinel());
        assert!(ClientId::general_deposit().is_sentinel());
        assert!(!ClientId("cli-42".to_string()).is_sentinel());
    }

    #[test]
    fn priced_draft_records_discount_and_total() {
        let draft = SaleDraft::new(
            ClientId("cli-1".to_string()),
            MovementCategory::Service,
            vec![
                LineItem::new("Microblading", dec("1200"), 1),
                LineItem::new("Retoque", dec("370"), 1),
            ],
        )
        .with_discount(
            Discount::FixedAmount { value: dec("2000") },
            Some(" anticipo previo ".to_string()),
        );

        let movement = draft.price().expect("price").into_movement(Utc::now()).expect("movement");

        assert_eq!(movement.subtotal, dec("1570"));
        assert_eq!(movement.amount, Decimal::ZERO);
        let discount = movement.discount.expect("discount recorded");
        assert_eq!(discount.kind, DiscountKind::FixedAmount);
        assert_eq!(discount.value, dec("2000"));
        assert_eq!(discount.amount, dec("1570"));
        assert_eq!(discount.reason.as_deref(), Some("anticipo previo"));
        assert_eq!(movement.line_items_description, "Microblading, Retoque");
        assert_eq!(movement.cancellation_state, CancellationState::None);
    }

    #[test]
    fn store_assigned_fields_are_filled_when_absent() {
        let now = Utc::now();
        let movement = SaleDraft::new(
            ClientId::general_public(),
            MovementCategory::Course,
            vec![LineItem::new("Curso de cejas", dec("3500"), 1)],
        )
        .price()
        .expect("price")
        .into_movement(now)
        .expect("movement");

        assert_eq!(movement.created_at, now);
        assert!(!movement.id.0.is_empty());
        assert_eq!(movement.folio.0.len(), FOLIO_LENGTH);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let error = SaleDraft::new(ClientId::general_public(), MovementCategory::Service, vec![])
            .price()
            .expect_err("empty cart");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn invalid_line_item_surfaces_pricing_error() {
        let error = SaleDraft::new(
            ClientId::general_public(),
            MovementCategory::Service,
            vec![LineItem::new("Lash lift", dec("-600"), 1)],
        )
        .price()
        .expect_err("negative price");

        assert!(matches!(error, DomainError::Pricing(PricingError::InvalidLineItem { .. })));
    }

    #[test]
    fn inconsistent_amount_is_rejected_on_store() {
        let mut record = SaleDraft::new(
            ClientId::general_deposit(),
            MovementCategory::Deposit,
            vec![LineItem::new("Anticipo", dec("500"), 1)],
        )
        .price()
        .expect("price");
        record.amount = dec("499");

        let error = record.into_movement(Utc::now()).expect_err("amount mismatch");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!(
            "Deposit".parse::<MovementCategory>().expect("parse"),
            MovementCategory::Deposit
        );
        assert!("refund".parse::<MovementCategory>().is_err());
    }
}
