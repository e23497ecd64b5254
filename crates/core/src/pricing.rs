//! Sale pricing: subtotal, discount and total for a cart.
//!
//! Arithmetic keeps full `Decimal` precision; [`PricingResult::rounded`] applies
//! the two-place half-up rounding used for display and persistence.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MONEY_SCALE: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub price: Decimal,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, price: Decimal, quantity: i64) -> Self {
        Self { description: description.into(), price, quantity }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
    FullWaiver,
    DepositCredit,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
            Self::FullWaiver => "full_waiver",
            Self::DepositCredit => "deposit_credit",
        }
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = PricingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Ok(Self::Percentage),
            "fixed_amount" | "fixed-amount" | "amount" => Ok(Self::FixedAmount),
            "full_waiver" | "full-waiver" | "warrior" => Ok(Self::FullWaiver),
            "deposit_credit" | "deposit-credit" | "deposit" => Ok(Self::DepositCredit),
            other => Err(PricingError::InvalidDiscountKind(other.to_string())),
        }
    }
}

/// A single active discount on a sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discount {
    Percentage { value: Decimal },
    FixedAmount { value: Decimal },
    /// Compassionate 100% waiver; the whole subtotal is discounted.
    FullWaiver,
    /// A prior deposit credited against this sale.
    DepositCredit { value: Decimal, source_reference: Option<String> },
}

impl Discount {
    pub fn kind(&self) -> DiscountKind {
        match self {
            Self::Percentage { .. } => DiscountKind::Percentage,
            Self::FixedAmount { .. } => DiscountKind::FixedAmount,
            Self::FullWaiver => DiscountKind::FullWaiver,
            Self::DepositCredit { .. } => DiscountKind::DepositCredit,
        }
    }

    /// The caller-supplied value; zero for a full waiver.
    pub fn value(&self) -> Decimal {
        match self {
            Self::Percentage { value }
            | Self::FixedAmount { value }
            | Self::DepositCredit { value, .. } => *value,
            Self::FullWaiver => Decimal::ZERO,
        }
    }

    pub fn source_reference(&self) -> Option<&str> {
        match self {
            Self::DepositCredit { source_reference, .. } => source_reference.as_deref(),
            _ => None,
        }
    }

    pub fn amount_for(&self, subtotal: Decimal) -> Result<Decimal, PricingError> {
        match self {
            Self::Percentage { value } => subtotal
                .checked_mul(*value / Decimal::ONE_HUNDRED)
                .ok_or(PricingError::AmountOutOfRange("percentage discount")),
            Self::FixedAmount { value } | Self::DepositCredit { value, .. } => {
                Ok((*value).min(subtotal))
            }
            Self::FullWaiver => Ok(subtotal),
        }
    }
}

/// Loosely-typed discount as submitted by a client form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountDirective {
    pub kind: String,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub source_reference: Option<String>,
}

impl TryFrom<DiscountDirective> for Discount {
    type Error = PricingError;

    fn try_from(directive: DiscountDirective) -> Result<Self, Self::Error> {
        let kind: DiscountKind = directive.kind.parse()?;
        if kind == DiscountKind::FullWaiver {
            return Ok(Self::FullWaiver);
        }

        let value = directive.value.ok_or(PricingError::InvalidDiscountValue {
            kind,
            reason: "a value is required".to_string(),
        })?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PricingError::InvalidDiscountValue {
                kind,
                reason: format!("value {value} must not be negative"),
            });
        }

        Ok(match kind {
            DiscountKind::Percentage => Self::Percentage { value },
            DiscountKind::FixedAmount => Self::FixedAmount { value },
            DiscountKind::DepositCredit => Self::DepositCredit {
                value,
                source_reference: directive
                    .source_reference
                    .map(|reference| reference.trim().to_string())
                    .filter(|reference| !reference.is_empty()),
            },
            DiscountKind::FullWaiver => Self::FullWaiver,
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid line item #{index}: {reason}")]
    InvalidLineItem { index: usize, reason: String },
    #[error("invalid discount kind `{0}`")]
    InvalidDiscountKind(String),
    #[error("invalid {} discount: {reason}", kind.as_str())]
    InvalidDiscountValue { kind: DiscountKind, reason: String },
    #[error("{0} exceeds the representable amount range")]
    AmountOutOfRange(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

impl PricingResult {
    /// Two-place half-up rounding. The total is re-derived from the rounded
    /// figures so `total == subtotal - discount_amount` (clamped at zero) holds
    /// on persisted values too.
    pub fn rounded(&self) -> Self {
        let subtotal = round_money(self.subtotal);
        let discount_amount = round_money(self.discount_amount);
        Self { subtotal, discount_amount, total: (subtotal - discount_amount).max(Decimal::ZERO) }
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn subtotal(line_items: &[LineItem]) -> Result<Decimal, PricingError> {
    line_items.iter().enumerate().try_fold(Decimal::ZERO, |acc, (index, item)| {
        if item.price.is_sign_negative() && !item.price.is_zero() {
            return Err(PricingError::InvalidLineItem {
                index,
                reason: format!("price {} must not be negative", item.price),
            });
        }
        if item.quantity < 1 {
            return Err(PricingError::InvalidLineItem {
                index,
                reason: format!("quantity {} must be at least 1", item.quantity),
            });
        }
        item.price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line_total| acc.checked_add(line_total))
            .ok_or(PricingError::AmountOutOfRange("subtotal"))
    })
}

/// Prices a cart. Percentages above 100 are accepted here; the total is
/// clamped at zero.
pub fn price_cart(
    line_items: &[LineItem],
    discount: Option<&Discount>,
) -> Result<PricingResult, PricingError> {
    let subtotal = subtotal(line_items)?;
    let discount_amount = match discount {
        Some(discount) => discount.amount_for(subtotal)?,
        None => Decimal::ZERO,
    };
    let total = (subtotal - discount_amount).max(Decimal::ZERO);

    Ok(PricingResult { subtotal, discount_amount, total })
}

pub fn describe_line_items(line_items: &[LineItem]) -> String {
    line_items
        .iter()
        .map(|item| match item.quantity {
            1 => item.description.trim().to_string(),
            quantity => format!("{} x{quantity}", item.description.trim()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
