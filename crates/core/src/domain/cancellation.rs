use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::movement::MovementId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CancellationRequestId(pub String);

impl CancellationRequestId {
    pub fn generate() -> Self {
        Self(format!("CAN-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for CancellationRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationStatus {
    Pending,
    Approved,
    Denied,
}

impl CancellationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CancellationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CancellationStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown cancellation status `{other}` (expected pending|approved|denied)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationDecision {
    Approved,
    Denied,
}

impl CancellationDecision {
    pub fn resulting_status(&self) -> CancellationStatus {
        match self {
            Self::Approved => CancellationStatus::Approved,
            Self::Denied => CancellationStatus::Denied,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub id: CancellationRequestId,
    pub movement_id: MovementId,
    pub requested_by: UserId,
    pub reason: String,
    pub status: CancellationStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

impl CancellationRequest {
    /// Builds a pending request. The reason is trimmed and must not be empty.
    pub fn open(
        movement_id: MovementId,
        requested_by: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::EmptyCancellationReason);
        }

        Ok(Self {
            id: CancellationRequestId::generate(),
            movement_id,
            requested_by,
            reason: reason.to_string(),
            status: CancellationStatus::Pending,
            created_at: now,
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
        })
    }

    /// `pending -> approved | denied`. Terminal requests are left untouched.
    pub fn resolve(&mut self, resolution: &Resolution) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::AlreadyResolved {
                request_id: self.id.clone(),
                status: self.status,
            });
        }

        self.status = resolution.decision.resulting_status();
        self.reviewed_by = Some(resolution.reviewed_by.clone());
        self.reviewed_at = Some(resolution.reviewed_at);
        self.admin_notes = resolution.admin_notes.clone();
        Ok(())
    }
}

/// An administrator's verdict on a pending request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: CancellationDecision,
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub admin_notes: Option<String>,
}

impl Resolution {
    pub fn new(
        decision: CancellationDecision,
        reviewed_by: UserId,
        admin_notes: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        let admin_notes =
            admin_notes.map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty());
        Self { decision, reviewed_by, reviewed_at, admin_notes }
    }
}
