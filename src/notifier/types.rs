use serde::{Deserialize, Serialize};

use crate::chain::ChainTransaction;
use crate::ledger::TxType;

/// Webhook payload for one batch of transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyRequest {
    #[serde(rename = "txn")]
    pub transactions: Vec<NotifyTransaction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyTransaction {
    pub block_hash: String,
    pub block_number: u64,
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    /// Decimal amount in the token's smallest unit
    pub value: String,
    pub fee: String,
    pub tx_type: String,
    pub confirms: u8,
    pub token_address: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub token_meta: String,
}

impl NotifyTransaction {
    pub fn from_chain(
        tx: &ChainTransaction,
        block_hash: &str,
        tx_type: TxType,
        confirms: u8,
    ) -> Self {
        Self {
            block_hash: block_hash.to_string(),
            block_number: u64::try_from(&tx.block_number).unwrap_or(u64::MAX),
            hash: tx.hash.clone(),
            from_address: tx.from.clone(),
            to_address: tx.to.clone(),
            value: tx.amount.to_string(),
            fee: tx.fee.to_string(),
            tx_type: tx_type.to_string(),
            confirms,
            token_address: tx.token_address.clone(),
            token_id: String::new(),
            token_meta: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyResponse {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_request_uses_txn_key() {
        let req = NotifyRequest {
            transactions: vec![NotifyTransaction {
                hash: "0xabc".to_string(),
                value: "100".to_string(),
                ..Default::default()
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["txn"][0]["hash"], "0xabc");
        assert_eq!(json["txn"][0]["value"], "100");
        assert!(json.get("transactions").is_none());
    }

    #[test]
    fn test_from_chain_keeps_full_precision() {
        let tx = ChainTransaction {
            hash: "0xt".to_string(),
            block_number: BigUint::from(77u32),
            from: "0xa".to_string(),
            to: "0xb".to_string(),
            token_address: "0xtoken".to_string(),
            amount: BigUint::from(u128::MAX) * 10u32,
            fee: BigUint::from(21000u32),
        };
        let n = NotifyTransaction::from_chain(&tx, "0xblock", TxType::Deposit, 6);
        assert_eq!(n.block_number, 77);
        assert_eq!(n.value, (BigUint::from(u128::MAX) * 10u32).to_string());
        assert_eq!(n.tx_type, TxType::Deposit.to_string());
        assert_eq!(n.confirms, 6);
    }

    #[test]
    fn test_response_deserialize() {
        let resp: NotifyResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(resp.success);
    }
}
