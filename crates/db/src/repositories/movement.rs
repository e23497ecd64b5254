use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, SubsecRound};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use studio_pos_core::domain::movement::{
    AppliedDiscount, CancellationState, ClientId, Folio, Movement, MovementCategory, MovementId,
    NewMovement,
};
use studio_pos_core::domain::timestamp_now;
use studio_pos_core::errors::DomainError;
use studio_pos_core::pricing::DiscountKind;

use super::{
    decode_error, decode_timestamp, encode_timestamp, MovementFilter, MovementRepository,
    RepositoryError,
};
use crate::DbPool;

const MOVEMENT_COLUMNS: &str = "id, folio, created_at, client_id, category, line_items_description,
    subtotal, discount_kind, discount_value, discount_amount, discount_reason,
    discount_source_reference, amount, payment_method, staff_name, notes,
    appointment_date, appointment_time, pending_cancellation";

pub struct SqlMovementRepository {
    pool: DbPool,
}

impl SqlMovementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_decimal(value: &str, column: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{value}`: {error}")))
}

fn row_to_movement(row: &SqliteRow) -> Result<Movement, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let folio: String = row.try_get("folio").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let client_id: String = row.try_get("client_id").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let line_items_description: String =
        row.try_get("line_items_description").map_err(decode_error)?;
    let subtotal: String = row.try_get("subtotal").map_err(decode_error)?;
    let discount_kind: Option<String> = row.try_get("discount_kind").map_err(decode_error)?;
    let amount: String = row.try_get("amount").map_err(decode_error)?;
    let appointment_date: Option<String> =
        row.try_get("appointment_date").map_err(decode_error)?;
    let appointment_time: Option<String> =
        row.try_get("appointment_time").map_err(decode_error)?;
    let pending_cancellation: i64 = row.try_get("pending_cancellation").map_err(decode_error)?;

    let discount = match discount_kind {
        Some(kind) => {
            let value: Option<String> = row.try_get("discount_value").map_err(decode_error)?;
            let discount_amount: Option<String> =
                row.try_get("discount_amount").map_err(decode_error)?;
            Some(AppliedDiscount {
                kind: DiscountKind::from_str(&kind)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?,
                value: decode_decimal(value.as_deref().unwrap_or("0"), "discount_value")?,
                amount: decode_decimal(
                    discount_amount.as_deref().unwrap_or("0"),
                    "discount_amount",
                )?,
                reason: row.try_get("discount_reason").map_err(decode_error)?,
                source_reference: row
                    .try_get("discount_source_reference")
                    .map_err(decode_error)?,
            })
        }
        None => None,
    };

    Ok(Movement {
        id: MovementId(id),
        folio: Folio(folio),
        created_at: decode_timestamp(&created_at)?,
        client_id: ClientId(client_id),
        category: MovementCategory::from_str(&category)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        line_items_description,
        subtotal: decode_decimal(&subtotal, "subtotal")?,
        discount,
        amount: decode_decimal(&amount, "amount")?,
        payment_method: row.try_get("payment_method").map_err(decode_error)?,
        staff_name: row.try_get("staff_name").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
        appointment_date: appointment_date
            .map(|value| {
                NaiveDate::from_str(&value).map_err(|error| {
                    RepositoryError::Decode(format!("invalid appointment_date `{value}`: {error}"))
                })
            })
            .transpose()?,
        appointment_time: appointment_time
            .map(|value| {
                NaiveTime::from_str(&value).map_err(|error| {
                    RepositoryError::Decode(format!("invalid appointment_time `{value}`: {error}"))
                })
            })
            .transpose()?,
        cancellation_state: if pending_cancellation == 0 {
            CancellationState::None
        } else {
            CancellationState::PendingReview
        },
    })
}

#[async_trait::async_trait]
impl MovementRepository for SqlMovementRepository {
    async fn create(&self, movement: NewMovement) -> Result<Movement, RepositoryError> {
        let mut movement = movement.into_movement(timestamp_now())?;
        movement.created_at = movement.created_at.trunc_subsecs(6);
        let discount = movement.discount.as_ref();

        sqlx::query(
            "INSERT INTO movement (id, folio, created_at, client_id, category,
                                   line_items_description, subtotal, discount_kind,
                                   discount_value, discount_amount, discount_reason,
                                   discount_source_reference, amount, payment_method,
                                   staff_name, notes, appointment_date, appointment_time,
                                   pending_cancellation)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&movement.id.0)
        .bind(&movement.folio.0)
        .bind(encode_timestamp(&movement.created_at))
        .bind(&movement.client_id.0)
        .bind(movement.category.as_str())
        .bind(&movement.line_items_description)
        .bind(movement.subtotal.to_string())
        .bind(discount.map(|discount| discount.kind.as_str()))
        .bind(discount.map(|discount| discount.value.to_string()))
        .bind(discount.map(|discount| discount.amount.to_string()))
        .bind(discount.and_then(|discount| discount.reason.clone()))
        .bind(discount.and_then(|discount| discount.source_reference.clone()))
        .bind(movement.amount.to_string())
        .bind(&movement.payment_method)
        .bind(&movement.staff_name)
        .bind(&movement.notes)
        .bind(movement.appointment_date.map(|date| date.to_string()))
        .bind(movement.appointment_time.map(|time| time.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(movement)
    }

    async fn find_by_id(&self, id: &MovementId) -> Result<Option<Movement>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {MOVEMENT_COLUMNS} FROM movement WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_movement).transpose()
    }

    async fn list(&self, filter: MovementFilter) -> Result<Vec<Movement>, RepositoryError> {
        let sql = if filter.include_pending {
            format!("SELECT {MOVEMENT_COLUMNS} FROM movement ORDER BY created_at DESC, rowid DESC")
        } else {
            format!(
                "SELECT {MOVEMENT_COLUMNS} FROM movement
                 WHERE pending_cancellation = 0
                 ORDER BY created_at DESC, rowid DESC"
            )
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_movement).collect()
    }

    async fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Movement>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movement
             WHERE client_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(&client_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_movement).collect()
    }

    async fn hard_delete(&self, id: &MovementId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM movement WHERE id = ? AND pending_cancellation = 0")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM movement WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => DomainError::AlreadyPending { movement_id: id.clone() },
                None => DomainError::MovementNotFound(id.clone()),
            }
            .into());
        }

        tx.commit().await?;
        Ok(())
    }
}
