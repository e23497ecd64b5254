pub mod cancellation;
pub mod movement;
pub mod user;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the microsecond precision timestamps are stored with.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
