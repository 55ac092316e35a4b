//! Tenant registry storage

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::models::Business;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum BusinessError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Business already registered: {0}")]
    Duplicate(String),

    #[error("Invalid business: {0}")]
    Invalid(#[from] LedgerError),
}

/// Read side consumed by the sync loop, plus administrative registration
#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn query_business_by_uid(
        &self,
        business_uid: &str,
    ) -> Result<Option<Business>, BusinessError>;

    async fn query_business_list(&self) -> Result<Vec<Business>, BusinessError>;

    async fn store_business(&self, business: &Business) -> Result<(), BusinessError>;
}

pub struct PgBusinessStore {
    pool: PgPool,
}

impl PgBusinessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessStore for PgBusinessStore {
    async fn query_business_by_uid(
        &self,
        business_uid: &str,
    ) -> Result<Option<Business>, BusinessError> {
        let row: Option<Business> = sqlx::query_as(
            r#"SELECT guid, business_uid, deposit_notify, withdraw_notify, tx_flow_notify, timestamp
               FROM business WHERE business_uid = $1"#,
        )
        .bind(business_uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn query_business_list(&self) -> Result<Vec<Business>, BusinessError> {
        let rows: Vec<Business> = sqlx::query_as(
            r#"SELECT guid, business_uid, deposit_notify, withdraw_notify, tx_flow_notify, timestamp
               FROM business ORDER BY business_uid"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn store_business(&self, business: &Business) -> Result<(), BusinessError> {
        business.namespace()?;

        let result = sqlx::query(
            r#"INSERT INTO business (guid, business_uid, deposit_notify, withdraw_notify, tx_flow_notify, timestamp)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (business_uid) DO NOTHING"#,
        )
        .bind(business.guid)
        .bind(&business.business_uid)
        .bind(&business.deposit_notify)
        .bind(&business.withdraw_notify)
        .bind(&business.tx_flow_notify)
        .bind(business.timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BusinessError::Duplicate(business.business_uid.clone()));
        }
        Ok(())
    }
}
