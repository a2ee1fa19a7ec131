use folio_core::repository::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Option<Self>, sqlx::Error> {
        match &config.url {
            Some(url) => Ok(Some(Self::new(url, config.max_connections).await?)),
            None => Ok(None),
        }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Wrap a driver error as an opaque storage failure
pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}
