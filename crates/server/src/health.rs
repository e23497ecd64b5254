use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use studio_pos_core::timestamp_now;
use studio_pos_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "studio-pos-server accepting requests".to_string(),
        },
        database,
        checked_at: timestamp_now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    let movements =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM movement").fetch_one(pool).await;
    match movements {
        Ok(count) => {
            HealthCheck { status: "ready", detail: format!("{count} movements on record") }
        }
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("movement store unreachable: {error}"),
        },
    }
}
