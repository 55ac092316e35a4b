//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::business::{BusinessError, BusinessStore, PgBusinessStore};
use crate::config::DatabaseConfig;
use crate::ledger::{LedgerError, PgBalanceStore};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] BusinessError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

const BUSINESS_DDL: &str = r#"CREATE TABLE IF NOT EXISTS business (
    guid            UUID PRIMARY KEY,
    business_uid    VARCHAR(64) NOT NULL UNIQUE,
    deposit_notify  TEXT NOT NULL DEFAULT '',
    withdraw_notify TEXT NOT NULL DEFAULT '',
    tx_flow_notify  TEXT NOT NULL DEFAULT '',
    timestamp       BIGINT NOT NULL
)"#;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the registry table and one balance table per registered
    /// tenant. Safe to run repeatedly. Returns the number of tenants.
    pub async fn migrate(&self) -> Result<usize, DbError> {
        sqlx::query(BUSINESS_DDL).execute(&self.pool).await?;

        let registry = PgBusinessStore::new(self.pool.clone());
        let balances = PgBalanceStore::new(self.pool.clone());

        let tenants = registry.query_business_list().await?;
        for business in &tenants {
            match business.namespace() {
                Ok(ns) => balances.create_tenant_table(&ns).await?,
                Err(e) => {
                    tracing::warn!(business = %business.business_uid, "Skipping tenant table: {}", e)
                }
            }
        }

        tracing::info!(tenants = tenants.len(), "Schema migrated");
        Ok(tenants.len())
    }
}
