use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;

use studio_pos_core::domain::cancellation::{
    CancellationRequest, CancellationRequestId, CancellationStatus, Resolution,
};
use studio_pos_core::domain::movement::{ClientId, Movement, MovementId, NewMovement};
use studio_pos_core::domain::user::{User, UserId};
use studio_pos_core::errors::{ApplicationError, DomainError};

pub mod cancellation;
pub mod memory;
pub mod movement;
pub mod user;

pub use cancellation::SqlCancellationRepository;
pub use memory::{InMemorySalesStore, InMemoryUserRepository};
pub use movement::SqlMovementRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Domain(error) => Self::Domain(error),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MovementFilter {
    /// Also return movements hidden while a cancellation request is pending.
    pub include_pending: bool,
}

impl MovementFilter {
    pub fn visible() -> Self {
        Self { include_pending: false }
    }

    pub fn all() -> Self {
        Self { include_pending: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait MovementRepository: Send + Sync {
    /// Assigns id, folio and timestamp when absent and stores the movement.
    async fn create(&self, movement: NewMovement) -> Result<Movement, RepositoryError>;

    async fn find_by_id(&self, id: &MovementId) -> Result<Option<Movement>, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: MovementFilter) -> Result<Vec<Movement>, RepositoryError>;

    /// Newest first, regardless of cancellation state.
    async fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Movement>, RepositoryError>;

    /// Removes a movement that has no pending cancellation request.
    async fn hard_delete(&self, id: &MovementId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CancellationRepository: Send + Sync {
    /// Stores a pending request and hides its movement in one atomic step.
    async fn open(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationRequest, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &CancellationRequestId,
    ) -> Result<Option<CancellationRequest>, RepositoryError>;

    async fn list(
        &self,
        status: Option<CancellationStatus>,
    ) -> Result<Vec<CancellationRequest>, RepositoryError>;

    /// Applies the decision and its movement side effect in one atomic step.
    async fn resolve(
        &self,
        id: &CancellationRequestId,
        resolution: Resolution,
    ) -> Result<CancellationRequest, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// Only unexpired sessions resolve to a user.
    async fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    async fn save(&self, user: User) -> Result<(), RepositoryError>;

    async fn issue_session(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<Session, RepositoryError>;
}

pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use studio_pos_core::domain::user::{Role, User};

    use super::{SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    pub fn staff() -> User {
        User::new("staff-1", "Recepción", Role::User)
    }

    pub fn admin() -> User {
        User::new("admin-1", "Dirección", Role::Admin)
    }

    /// Migrated in-memory database with one staff member and one admin.
    pub async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let users = SqlUserRepository::new(pool.clone());
        users.save(staff()).await.expect("seed staff");
        users.save(admin()).await.expect("seed admin");
        pool
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use studio_pos_core::domain::movement::MovementId;
    use studio_pos_core::errors::{ApplicationError, DomainError};

    use super::{decode_timestamp, encode_timestamp, RepositoryError};

    #[test]
    fn timestamps_keep_microseconds_and_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).single().expect("date")
            + chrono::Duration::microseconds(5);
        let later = earlier + chrono::Duration::microseconds(1);

        let encoded_earlier = encode_timestamp(&earlier);
        assert_eq!(encoded_earlier, "2026-03-09T10:00:00.000005Z");
        assert!(encoded_earlier < encode_timestamp(&later));
        assert_eq!(decode_timestamp(&encoded_earlier).expect("decode"), earlier);
    }

    #[test]
    fn malformed_timestamp_is_a_decode_error() {
        assert!(matches!(decode_timestamp("yesterday"), Err(RepositoryError::Decode(_))));
    }

    #[test]
    fn domain_errors_pass_through_to_application_layer() {
        let error = ApplicationError::from(RepositoryError::Domain(DomainError::MovementNotFound(
            MovementId("mov-1".to_string()),
        )));
        assert!(matches!(error, ApplicationError::Domain(DomainError::MovementNotFound(_))));

        let error = ApplicationError::from(RepositoryError::Decode("bad row".to_string()));
        assert!(matches!(error, ApplicationError::Persistence(_)));
    }
}
