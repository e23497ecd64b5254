use std::sync::Arc;

use axum::Router;
use studio_pos_core::config::AppConfig;
use studio_pos_db::repositories::{
    SqlCancellationRepository, SqlMovementRepository, SqlUserRepository,
};
use studio_pos_db::{
    connect_with_config, migrations, CancellationWorkflow, DbPool, MovementService,
};
use thiserror::Error;
use tracing::info;

use crate::api::{self, ApiState};
use crate::health;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            movements: Arc::new(MovementService::new(Arc::new(SqlMovementRepository::new(
                self.db_pool.clone(),
            )))),
            workflow: Arc::new(CancellationWorkflow::new(Arc::new(
                SqlCancellationRepository::new(self.db_pool.clone()),
            ))),
            users: Arc::new(SqlUserRepository::new(self.db_pool.clone())),
            session_cookie: Arc::from(self.config.session.cookie_name.as_str()),
        }
    }

    /// API routes plus the health probe.
    pub fn router(&self) -> Router {
        api::router(self.api_state()).merge(health::router(self.db_pool.clone()))
    }
}
