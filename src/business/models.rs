use uuid::Uuid;

use crate::ledger::{LedgerError, TenantNamespace};

/// Tenant of the wallet system
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Business {
    pub guid: Uuid,
    pub business_uid: String,
    pub deposit_notify: String,
    pub withdraw_notify: String,
    pub tx_flow_notify: String,
    pub timestamp: i64,
}

/// Which webhook of a tenant a notification goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotifyKind {
    Deposit,
    Withdraw,
    TxFlow,
}

impl Business {
    pub fn new(business_uid: &str) -> Self {
        Self {
            guid: Uuid::new_v4(),
            business_uid: business_uid.to_string(),
            deposit_notify: String::new(),
            withdraw_notify: String::new(),
            tx_flow_notify: String::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_notify_urls(mut self, deposit: &str, withdraw: &str, tx_flow: &str) -> Self {
        self.deposit_notify = deposit.to_string();
        self.withdraw_notify = withdraw.to_string();
        self.tx_flow_notify = tx_flow.to_string();
        self
    }

    /// Balance table namespace of this tenant
    pub fn namespace(&self) -> Result<TenantNamespace, LedgerError> {
        TenantNamespace::new(&self.business_uid)
    }

    /// Webhook URL for `kind`, `None` when the tenant has not configured one
    pub fn notify_url(&self, kind: NotifyKind) -> Option<&str> {
        let url = match kind {
            NotifyKind::Deposit => &self.deposit_notify,
            NotifyKind::Withdraw => &self.withdraw_notify,
            NotifyKind::TxFlow => &self.tx_flow_notify,
        };
        (!url.is_empty()).then_some(url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_url_routing() {
        let b = Business::new("acme").with_notify_urls("http://d", "", "http://f");
        assert_eq!(b.notify_url(NotifyKind::Deposit), Some("http://d"));
        assert_eq!(b.notify_url(NotifyKind::Withdraw), None);
        assert_eq!(b.notify_url(NotifyKind::TxFlow), Some("http://f"));
    }

    #[test]
    fn test_namespace_from_uid() {
        let b = Business::new("acme");
        assert_eq!(b.namespace().unwrap().table(), "balances_acme");
        assert!(Business::new("bad\"uid").namespace().is_err());
    }
}
