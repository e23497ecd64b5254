use chrono::{Duration, SecondsFormat};
use studio_pos_core::domain::user::UserId;
use studio_pos_db::repositories::{SqlUserRepository, UserRepository};

use crate::commands::{with_migrated_pool, CommandFailure, CommandResult};

const MAX_TTL_HOURS: u32 = 24 * 30;

/// Issues a session token. Signing in happens outside this system; operators
/// hand the token to the front-desk client.
pub fn run(user: &str, ttl_hours: Option<u32>) -> CommandResult {
    let user_id = UserId(user.trim().to_string());
    if user_id.0.is_empty() {
        return CommandResult::failure("session", "invalid_argument", "--user must not be empty", 2);
    }
    if ttl_hours.is_some_and(|hours| hours == 0 || hours > MAX_TTL_HOURS) {
        return CommandResult::failure(
            "session",
            "invalid_argument",
            format!("--ttl-hours must be in range 1..={MAX_TTL_HOURS}"),
            2,
        );
    }

    let outcome = with_migrated_pool("session", |config, pool| async move {
        let hours = ttl_hours.unwrap_or(config.session.ttl_hours);

        let users = SqlUserRepository::new(pool);
        users
            .issue_session(&user_id, Duration::hours(i64::from(hours)))
            .await
            .map_err(|error| CommandFailure::new("session_issue", error.to_string(), 7))
    });

    match outcome {
        Ok(session) => CommandResult::success(
            "session",
            format!(
                "token={} user={} expires_at={}",
                session.token,
                session.user_id,
                session.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ),
        Err(failure) => failure,
    }
}
