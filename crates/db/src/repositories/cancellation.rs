use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use studio_pos_core::domain::cancellation::{
    CancellationDecision, CancellationRequest, CancellationRequestId, CancellationStatus,
    Resolution,
};
use studio_pos_core::domain::movement::MovementId;
use studio_pos_core::domain::user::UserId;
use studio_pos_core::errors::DomainError;

use super::{
    decode_error, decode_timestamp, encode_timestamp, CancellationRepository, RepositoryError,
};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, movement_id, requested_by, reason, status, created_at,
    reviewed_by, reviewed_at, admin_notes";

pub struct SqlCancellationRepository {
    pool: DbPool,
}

impl SqlCancellationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<CancellationStatus, RepositoryError> {
    CancellationStatus::from_str(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_request(row: &SqliteRow) -> Result<CancellationRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let movement_id: String = row.try_get("movement_id").map_err(decode_error)?;
    let requested_by: String = row.try_get("requested_by").map_err(decode_error)?;
    let reason: String = row.try_get("reason").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let reviewed_by: Option<String> = row.try_get("reviewed_by").map_err(decode_error)?;
    let reviewed_at: Option<String> = row.try_get("reviewed_at").map_err(decode_error)?;
    let admin_notes: Option<String> = row.try_get("admin_notes").map_err(decode_error)?;

    Ok(CancellationRequest {
        id: CancellationRequestId(id),
        movement_id: MovementId(movement_id),
        requested_by: UserId(requested_by),
        reason,
        status: parse_status(&status)?,
        created_at: decode_timestamp(&created_at)?,
        reviewed_by: reviewed_by.map(UserId),
        reviewed_at: reviewed_at.as_deref().map(decode_timestamp).transpose()?,
        admin_notes,
    })
}

#[async_trait::async_trait]
impl CancellationRepository for SqlCancellationRepository {
    async fn open(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationRequest, RepositoryError> {
        if request.status != CancellationStatus::Pending {
            return Err(DomainError::InvariantViolation(format!(
                "cancellation request `{}` must be opened as pending",
                request.id
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;

        // The flag flip doubles as the per-movement lock: only one opener can
        // move it from 0 to 1.
        let flagged = sqlx::query(
            "UPDATE movement SET pending_cancellation = 1
             WHERE id = ? AND pending_cancellation = 0",
        )
        .bind(&request.movement_id.0)
        .execute(&mut *tx)
        .await?;

        if flagged.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM movement WHERE id = ?")
                .bind(&request.movement_id.0)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => DomainError::AlreadyPending { movement_id: request.movement_id },
                None => DomainError::MovementNotFound(request.movement_id),
            }
            .into());
        }

        let inserted = sqlx::query(
            "INSERT INTO cancellation_request (id, movement_id, requested_by, reason, status,
                                               created_at)
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&request.id.0)
        .bind(&request.movement_id.0)
        .bind(&request.requested_by.0)
        .bind(&request.reason)
        .bind(encode_timestamp(&request.created_at))
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_error)) = &inserted {
            if db_error.is_unique_violation() {
                return Err(DomainError::AlreadyPending { movement_id: request.movement_id }.into());
            }
        }
        inserted?;

        tx.commit().await?;
        Ok(request)
    }

    async fn find_by_id(
        &self,
        id: &CancellationRequestId,
    ) -> Result<Option<CancellationRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM cancellation_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn list(
        &self,
        status: Option<CancellationStatus>,
    ) -> Result<Vec<CancellationRequest>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM cancellation_request
                     WHERE status = ?
                     ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM cancellation_request
                     ORDER BY created_at DESC, rowid DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_request).collect()
    }

    async fn resolve(
        &self,
        id: &CancellationRequestId,
        resolution: Resolution,
    ) -> Result<CancellationRequest, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cancellation_request
             SET status = ?, reviewed_by = ?, reviewed_at = ?, admin_notes = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.decision.resulting_status().as_str())
        .bind(&resolution.reviewed_by.0)
        .bind(encode_timestamp(&resolution.reviewed_at))
        .bind(&resolution.admin_notes)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM cancellation_request WHERE id = ?")
                    .bind(&id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(status) => DomainError::AlreadyResolved {
                    request_id: id.clone(),
                    status: parse_status(&status)?,
                },
                None => DomainError::CancellationRequestNotFound(id.clone()),
            }
            .into());
        }

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM cancellation_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_one(&mut *tx)
        .await?;
        let resolved = row_to_request(&row)?;

        match resolution.decision {
            CancellationDecision::Approved => {
                sqlx::query("DELETE FROM movement WHERE id = ?")
                    .bind(&resolved.movement_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
            CancellationDecision::Denied => {
                sqlx::query("UPDATE movement SET pending_cancellation = 0 WHERE id = ?")
                    .bind(&resolved.movement_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(resolved)
    }
}
