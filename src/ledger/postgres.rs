//! PostgreSQL balance store
//!
//! Amounts live in `NUMERIC(78,0)` columns (wide enough for uint256) and
//! cross the wire as decimal text.

use async_trait::async_trait;
use num_bigint::BigUint;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::error::LedgerError;
use super::models::{AddressType, Balance};
use super::namespace::TenantNamespace;
use super::store::BalanceStore;

const COLUMNS: &str = "guid, address, token_address, balance::TEXT AS balance, \
                       lock_balance::TEXT AS lock_balance, address_type, timestamp";

pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tenant's balance table if it does not exist yet
    pub async fn create_tenant_table(&self, ns: &TenantNamespace) -> Result<(), LedgerError> {
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                   guid          UUID PRIMARY KEY,
                   address       VARCHAR(128) NOT NULL,
                   token_address VARCHAR(128) NOT NULL,
                   balance       NUMERIC(78, 0) NOT NULL DEFAULT 0 CHECK (balance >= 0),
                   lock_balance  NUMERIC(78, 0) NOT NULL DEFAULT 0 CHECK (lock_balance >= 0),
                   address_type  SMALLINT NOT NULL DEFAULT 0,
                   timestamp     BIGINT NOT NULL,
                   UNIQUE (address, token_address)
               )"#,
            table = ns.quoted_table()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {table} (address_type, balance)",
            index = ns.quoted_index(),
            table = ns.quoted_table()
        );
        sqlx::query(&index).execute(&self.pool).await?;

        tracing::info!(table = ns.table(), "Tenant balance table ready");
        Ok(())
    }
}

fn parse_amount(row: &PgRow, column: &str) -> Result<BigUint, LedgerError> {
    let text: String = row.try_get(column)?;
    text.parse::<BigUint>()
        .map_err(|e| LedgerError::Corrupt(format!("{} = {:?}: {}", column, text, e)))
}

fn balance_from_row(row: &PgRow) -> Result<Balance, LedgerError> {
    let address_type: i16 = row.try_get("address_type")?;
    Ok(Balance {
        guid: row.try_get::<Uuid, _>("guid")?,
        address: row.try_get("address")?,
        token_address: row.try_get("token_address")?,
        balance: parse_amount(row, "balance")?,
        lock_balance: parse_amount(row, "lock_balance")?,
        address_type: AddressType::try_from(address_type).map_err(LedgerError::Corrupt)?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn query_balance(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE address = $1 AND token_address = $2",
            ns.quoted_table()
        );
        let row = sqlx::query(&sql)
            .bind(address)
            .bind(token_address)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn query_balance_by_role(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
        address_type: AddressType,
    ) -> Result<Option<Balance>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE address = $1 AND token_address = $2 AND address_type = $3",
            ns.quoted_table()
        );
        let row = sqlx::query(&sql)
            .bind(address)
            .bind(token_address)
            .bind(i16::from(address_type))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn query_balance_by_address(
        &self,
        ns: &TenantNamespace,
        address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE address = $1 ORDER BY address_type DESC, token_address LIMIT 1",
            ns.quoted_table()
        );
        let row = sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn list_balances(
        &self,
        ns: &TenantNamespace,
        address_type: Option<AddressType>,
        min_balance: &BigUint,
    ) -> Result<Vec<Balance>, LedgerError> {
        let rows = match address_type {
            Some(address_type) => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM {} WHERE address_type = $1 AND balance >= $2::NUMERIC \
                     ORDER BY address, token_address",
                    ns.quoted_table()
                );
                sqlx::query(&sql)
                    .bind(i16::from(address_type))
                    .bind(min_balance.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM {} WHERE balance >= $1::NUMERIC \
                     ORDER BY address, token_address",
                    ns.quoted_table()
                );
                sqlx::query(&sql)
                    .bind(min_balance.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(balance_from_row).collect()
    }

    async fn insert_balances(
        &self,
        ns: &TenantNamespace,
        rows: &[Balance],
    ) -> Result<(), LedgerError> {
        let sql = format!(
            r#"INSERT INTO {} (guid, address, token_address, balance, lock_balance, address_type, timestamp)
               VALUES ($1, $2, $3, $4::NUMERIC, $5::NUMERIC, $6, $7)"#,
            ns.quoted_table()
        );

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&sql)
                .bind(row.guid)
                .bind(&row.address)
                .bind(&row.token_address)
                .bind(row.balance.to_string())
                .bind(row.lock_balance.to_string())
                .bind(i16::from(row.address_type))
                .bind(row.timestamp)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn save_balance(&self, ns: &TenantNamespace, row: &Balance) -> Result<(), LedgerError> {
        let sql = format!(
            r#"UPDATE {}
               SET balance = $1::NUMERIC, lock_balance = $2::NUMERIC, timestamp = $3
               WHERE guid = $4"#,
            ns.quoted_table()
        );
        let result = sqlx::query(&sql)
            .bind(row.balance.to_string())
            .bind(row.lock_balance.to_string())
            .bind(row.timestamp)
            .bind(row.guid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Persist(format!(
                "row {} missing from {}",
                row.guid, ns
            )));
        }
        Ok(())
    }
}
