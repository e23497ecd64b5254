use std::str::FromStr;

use chrono::Duration;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use studio_pos_core::domain::timestamp_now;
use studio_pos_core::domain::user::{Role, User, UserId};
use studio_pos_core::errors::DomainError;

use super::{
    decode_error, encode_timestamp, new_session_token, RepositoryError, Session, UserRepository,
};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;

    Ok(User {
        id: UserId(id),
        name,
        role: Role::from_str(&role).map_err(|error| RepositoryError::Decode(error.to_string()))?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, role FROM user_account WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT u.id, u.name, u.role
             FROM user_session s
             JOIN user_account u ON u.id = s.user_id
             WHERE s.token = ? AND s.expires_at > ?",
        )
        .bind(token)
        .bind(encode_timestamp(&timestamp_now()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_account (id, name, role, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(encode_timestamp(&timestamp_now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn issue_session(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<Session, RepositoryError> {
        if self.find_by_id(user_id).await?.is_none() {
            return Err(DomainError::InvariantViolation(format!("user `{user_id}` does not exist"))
                .into());
        }

        let now = timestamp_now();
        let session =
            Session { token: new_session_token(), user_id: user_id.clone(), expires_at: now + ttl };

        sqlx::query(
            "INSERT INTO user_session (token, user_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id.0)
        .bind(encode_timestamp(&session.expires_at))
        .bind(encode_timestamp(&now))
        .execute(&self.pool)
        .await?;

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use studio_pos_core::domain::user::{Role, User, UserId};
    use studio_pos_core::errors::DomainError;

    use super::SqlUserRepository;
    use crate::repositories::test_support::{admin, seeded_pool, staff};
    use crate::repositories::{RepositoryError, UserRepository};

    #[tokio::test]
    async fn save_upserts_name_and_role() {
        let repo = SqlUserRepository::new(seeded_pool().await);

        repo.save(User::new("staff-1", "Recepción turno tarde", Role::Admin))
            .await
            .expect("upsert");

        let found = repo.find_by_id(&staff().id).await.expect("find").expect("exists");
        assert_eq!(found.name, "Recepción turno tarde");
        assert_eq!(found.role, Role::Admin);
    }

    #[tokio::test]
    async fn issued_session_resolves_to_its_user() {
        let repo = SqlUserRepository::new(seeded_pool().await);

        let session = repo.issue_session(&admin().id, Duration::hours(12)).await.expect("issue");
        let user = repo.find_by_session_token(&session.token).await.expect("lookup");

        assert_eq!(user, Some(admin()));
        assert!(repo.find_by_session_token("not-a-token").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn expired_session_does_not_resolve() {
        let repo = SqlUserRepository::new(seeded_pool().await);

        let session = repo.issue_session(&staff().id, Duration::seconds(-1)).await.expect("issue");

        assert!(repo.find_by_session_token(&session.token).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn session_for_unknown_user_is_rejected() {
        let repo = SqlUserRepository::new(seeded_pool().await);

        let error = repo
            .issue_session(&UserId("ghost".to_string()), Duration::hours(1))
            .await
            .expect_err("unknown user");

        assert!(matches!(error, RepositoryError::Domain(DomainError::InvariantViolation(_))));
    }
}
