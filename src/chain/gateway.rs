//! Chain RPC Gateway
//!
//! Typed façade over a [`ChainAccountRpc`] transport for one chain. Turns
//! `code: ERROR` responses into [`GatewayError::Rpc`], parses decimal
//! amounts and heights into `BigUint`, and bounds every call with a
//! timeout so a hung provider surfaces as a retryable error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use tracing::{debug, error, warn};

use super::error::GatewayError;
use super::rpc::{
    AccountRequest, BlockHeaderNumberRequest, BlockNumberRequest, ChainAccountRpc,
    ConvertAddressRequest, ReturnCode, RpcBlockHeader, RpcTransaction, SendTxRequest,
    TxHashRequest,
};
use super::types::{BlockHeader, ChainTransaction, HeaderQuery};
use crate::cache::AddressCache;

pub const DEFAULT_NETWORK: &str = "mainnet";

pub struct ChainGateway {
    rpc: Arc<dyn ChainAccountRpc>,
    chain: String,
    network: String,
    timeout: Duration,
    address_cache: Arc<AddressCache>,
}

fn parse_uint(field: &str, value: &str) -> Result<BigUint, GatewayError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(BigUint::ZERO);
    }
    value
        .parse::<BigUint>()
        .map_err(|e| GatewayError::Malformed(format!("{} = {:?}: {}", field, value, e)))
}

fn check_code(code: ReturnCode, msg: &str) -> Result<(), GatewayError> {
    match code {
        ReturnCode::Success => Ok(()),
        ReturnCode::Error => Err(GatewayError::Rpc(msg.to_string())),
    }
}

impl ChainGateway {
    pub fn new(
        rpc: Arc<dyn ChainAccountRpc>,
        chain: &str,
        network: &str,
        timeout: Duration,
        address_cache: Arc<AddressCache>,
    ) -> Self {
        Self {
            rpc,
            chain: chain.to_string(),
            network: network.to_string(),
            timeout,
            address_cache,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
    }

    fn to_header(raw: RpcBlockHeader) -> Result<BlockHeader, GatewayError> {
        Ok(BlockHeader {
            number: parse_uint("number", &raw.number)?,
            hash: raw.hash,
            parent_hash: raw.parent_hash,
            timestamp: raw.time,
        })
    }

    fn to_transaction(raw: RpcTransaction) -> Result<ChainTransaction, GatewayError> {
        Ok(ChainTransaction {
            block_number: parse_uint("height", &raw.height)?,
            amount: parse_uint("amount", &raw.amount)?,
            fee: parse_uint("fee", &raw.fee)?,
            hash: raw.hash,
            from: raw.from,
            to: raw.to,
            token_address: raw.token_address,
        })
    }

    /// Head header, or the header at a given height
    ///
    /// `Ok(None)` means the provider answered but has no such header.
    pub async fn header(&self, query: HeaderQuery) -> Result<Option<BlockHeader>, GatewayError> {
        let req = BlockHeaderNumberRequest {
            chain: self.chain.clone(),
            network: self.network.clone(),
            height: match &query {
                HeaderQuery::Latest => None,
                HeaderQuery::Height(h) => Some(h.to_string()),
            },
        };

        let resp = self
            .bounded(self.rpc.get_block_header_by_number(req))
            .await
            .inspect_err(|e| warn!(chain = %self.chain, ?query, "Get block header failed: {}", e))?;
        check_code(resp.code, &resp.msg)?;

        resp.block_header.map(Self::to_header).transpose()
    }

    /// Transactions of the block at `height`, in block order
    pub async fn block_transactions(
        &self,
        height: &BigUint,
    ) -> Result<Vec<ChainTransaction>, GatewayError> {
        let req = BlockNumberRequest {
            chain: self.chain.clone(),
            height: height.to_string(),
            view_tx: true,
        };

        let resp = self
            .bounded(self.rpc.get_block_by_number(req))
            .await
            .inspect_err(|e| warn!(chain = %self.chain, %height, "Get block info failed: {}", e))?;
        check_code(resp.code, &resp.msg)?;

        resp.transactions
            .into_iter()
            .map(|mut tx| {
                if tx.height.is_empty() {
                    tx.height = height.to_string();
                }
                Self::to_transaction(tx)
            })
            .collect()
    }

    pub async fn transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<ChainTransaction>, GatewayError> {
        let req = TxHashRequest {
            chain: self.chain.clone(),
            network: self.network.clone(),
            hash: hash.to_string(),
        };

        let resp = self.bounded(self.rpc.get_tx_by_hash(req)).await?;
        check_code(resp.code, &resp.msg)?;

        resp.tx.map(Self::to_transaction).transpose()
    }

    /// Account sequence (nonce) used when building outgoing transactions
    pub async fn account_sequence(&self, address: &str) -> Result<u64, GatewayError> {
        let req = AccountRequest {
            chain: self.chain.clone(),
            network: self.network.clone(),
            address: address.to_string(),
        };

        let resp = self.bounded(self.rpc.get_account(req)).await?;
        check_code(resp.code, &resp.msg)?;

        resp.sequence
            .trim()
            .parse::<u64>()
            .map_err(|e| GatewayError::Malformed(format!("sequence = {:?}: {}", resp.sequence, e)))
    }

    /// Broadcast a signed transaction, returning its hash
    pub async fn submit_raw_transaction(&self, raw_tx: &str) -> Result<String, GatewayError> {
        let req = SendTxRequest {
            chain: self.chain.clone(),
            network: self.network.clone(),
            raw_tx: raw_tx.to_string(),
        };

        let resp = self
            .bounded(self.rpc.send_tx(req))
            .await
            .inspect_err(|e| error!(chain = %self.chain, "Send tx failed: {}", e))?;
        check_code(resp.code, &resp.msg)?;

        debug!(chain = %self.chain, tx_hash = %resp.tx_hash, "Transaction submitted");
        Ok(resp.tx_hash)
    }

    /// Derive the chain address of a public key
    ///
    /// Returns an empty string when the service cannot convert it. Successful
    /// conversions are cached.
    pub async fn resolve_address(&self, public_key: &str) -> String {
        let key = format!("{}:{}", self.chain, public_key);
        if let Some(address) = self.address_cache.get(&key) {
            return address;
        }

        let req = ConvertAddressRequest {
            chain: self.chain.clone(),
            public_key: public_key.to_string(),
        };

        let resp = match self.bounded(self.rpc.convert_address(req)).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(chain = %self.chain, "Convert address failed: {}", e);
                return String::new();
            }
        };
        if let Err(e) = check_code(resp.code, &resp.msg) {
            error!(chain = %self.chain, "Convert address rejected: {}", e);
            return String::new();
        }

        if !resp.address.is_empty() {
            self.address_cache.insert(&key, &resp.address);
        }
        resp.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::mock::MockChainAccount;

    fn gateway(mock: Arc<MockChainAccount>) -> ChainGateway {
        ChainGateway::new(
            mock,
            "Ethereum",
            DEFAULT_NETWORK,
            Duration::from_secs(1),
            Arc::new(AddressCache::new(16)),
        )
    }

    #[tokio::test]
    async fn test_latest_header_is_parsed() {
        let mock = Arc::new(MockChainAccount::with_head(1000));
        let gw = gateway(mock);

        let header = gw.header(HeaderQuery::Latest).await.unwrap().unwrap();
        assert_eq!(header.number, BigUint::from(1000u32));
        assert_eq!(header.timestamp, 1_700_000_000 + 1000 * 12);
    }

    #[tokio::test]
    async fn test_error_code_becomes_rpc_error() {
        let mock = Arc::new(MockChainAccount::with_head(10));
        mock.set_error_code_at(Some(3));
        let gw = gateway(mock);

        let err = gw
            .header(HeaderQuery::Height(BigUint::from(3u32)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rpc(msg) if msg == "block not found"));
    }

    #[tokio::test]
    async fn test_account_sequence_and_send() {
        let mock = Arc::new(MockChainAccount::with_head(10));
        let gw = gateway(mock);

        assert_eq!(gw.account_sequence("0xabc").await.unwrap(), 42);
        assert!(matches!(
            gw.account_sequence("").await,
            Err(GatewayError::Rpc(_))
        ));
        assert_eq!(gw.submit_raw_transaction("0xf86c").await.unwrap(), "0xhash_6");
    }

    #[tokio::test]
    async fn test_block_transactions_parse_amounts() {
        let mock = Arc::new(MockChainAccount::with_head(10));
        mock.add_transaction(
            5,
            RpcTransaction {
                hash: "0xt1".to_string(),
                height: String::new(),
                from: "0xa".to_string(),
                to: "0xb".to_string(),
                token_address: "0xtoken".to_string(),
                amount: "340282366920938463463374607431768211456".to_string(),
                fee: "21000".to_string(),
            },
        );
        let gw = gateway(mock);

        let txs = gw.block_transactions(&BigUint::from(5u32)).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].block_number, BigUint::from(5u32));
        assert_eq!(txs[0].amount, BigUint::from(u128::MAX) + 1u32);
        assert_eq!(txs[0].fee, BigUint::from(21000u32));

        let by_hash = gw.transaction_by_hash("0xt1").await.unwrap().unwrap();
        assert_eq!(by_hash.hash, "0xt1");
    }

    #[tokio::test]
    async fn test_resolve_address_caches_and_returns_empty_on_failure() {
        let mock = Arc::new(MockChainAccount::with_head(10));
        mock.add_address("pk1", "0xabc");
        let gw = gateway(mock.clone());

        assert_eq!(gw.resolve_address("pk1").await, "0xabc");
        assert_eq!(gw.resolve_address("pk1").await, "0xabc");
        assert_eq!(mock.convert_calls(), 1);

        assert_eq!(gw.resolve_address("unknown").await, "");
    }
}
