//! Tenant table namespace
//!
//! Every business owns one `balances_<uid>` table. The uid is taken as-is
//! (case, `-` and all), so the table name is always emitted as a quoted
//! identifier: `Acme` and `acme` are different tenants with different
//! tables. The uid is validated once here and the rest of the ledger only
//! ever sees a `TenantNamespace`.

use std::fmt;

use super::error::LedgerError;

const TABLE_PREFIX: &str = "balances_";
const INDEX_SUFFIX: &str = "_type_idx";

/// Postgres truncates identifiers past 63 bytes; the longest derived name
/// (the index) must fit or two tenants could share one.
const MAX_UID_LEN: usize = 63 - TABLE_PREFIX.len() - INDEX_SUFFIX.len();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantNamespace {
    business_uid: String,
    table: String,
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

impl TenantNamespace {
    pub fn new(business_uid: &str) -> Result<Self, LedgerError> {
        if business_uid.is_empty() || business_uid.len() > MAX_UID_LEN {
            return Err(LedgerError::InvalidTenant(business_uid.to_string()));
        }
        // The only characters a quoted identifier cannot carry verbatim
        if business_uid.contains(['"', '\0']) {
            return Err(LedgerError::InvalidTenant(business_uid.to_string()));
        }

        Ok(Self {
            business_uid: business_uid.to_string(),
            table: format!("{}{}", TABLE_PREFIX, business_uid),
        })
    }

    pub fn business_uid(&self) -> &str {
        &self.business_uid
    }

    /// Table holding this tenant's balance rows, unquoted
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table name ready to splice into SQL
    pub fn quoted_table(&self) -> String {
        quote(&self.table)
    }

    /// Name of the `(address_type, balance)` index, ready to splice into SQL
    pub fn quoted_index(&self) -> String {
        quote(&format!("{}{}", self.table, INDEX_SUFFIX))
    }
}

impl fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_table_name() {
        let ns = TenantNamespace::new("exchange_01").unwrap();
        assert_eq!(ns.table(), "balances_exchange_01");
        assert_eq!(ns.business_uid(), "exchange_01");
    }

    #[test]
    fn test_namespace_rejects_unquotable_uids() {
        assert!(TenantNamespace::new("a\"; DROP TABLE business; --").is_err());
        assert!(TenantNamespace::new("nul\0byte").is_err());
        assert!(TenantNamespace::new("").is_err());
        assert!(TenantNamespace::new(&"a".repeat(MAX_UID_LEN + 1)).is_err());
    }

    #[test]
    fn test_case_distinct_uids_get_distinct_quoted_tables() {
        let upper = TenantNamespace::new("Acme").unwrap();
        let lower = TenantNamespace::new("acme").unwrap();

        assert_ne!(upper, lower);
        assert_eq!(upper.quoted_table(), "\"balances_Acme\"");
        assert_eq!(lower.quoted_table(), "\"balances_acme\"");
        assert_ne!(upper.quoted_index(), lower.quoted_index());
    }

    #[test]
    fn test_uuid_uid_is_accepted() {
        let uid = "3f2b8c4e-9a1d-4e5f-8b7c-0d1e2f3a4b5c";
        let ns = TenantNamespace::new(uid).unwrap();
        assert_eq!(ns.business_uid(), uid);
        assert_eq!(ns.quoted_table(), format!("\"balances_{}\"", uid));
        // Longest derived identifier still fits Postgres' 63-byte limit
        assert!(ns.quoted_index().len() - 2 <= 63);
    }
}
