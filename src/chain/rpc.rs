//! Chain account service transport
//!
//! The chain account service fronts many heterogeneous chains behind one
//! request/response surface. Every response carries a `code`; an `ERROR`
//! code is a failure even when the transport succeeded. Normalizing that is
//! the [`ChainGateway`](super::ChainGateway)'s job; this layer only moves
//! messages.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeaderNumberRequest {
    pub chain: String,
    pub network: String,
    /// Decimal height; absent means "latest"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockHeader {
    pub hash: String,
    pub parent_hash: String,
    pub number: String,
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeaderResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub block_header: Option<RpcBlockHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNumberRequest {
    pub chain: String,
    pub height: String,
    pub view_tx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    #[serde(default)]
    pub height: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub token_address: String,
    pub amount: String,
    #[serde(default)]
    pub fee: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHashRequest {
    pub chain: String,
    pub network: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tx: Option<RpcTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub chain: String,
    pub network: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTxRequest {
    pub chain: String,
    pub network: String,
    pub raw_tx: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SendTxResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertAddressRequest {
    pub chain: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConvertAddressResponse {
    pub code: ReturnCode,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub address: String,
}

/// Raw chain account service surface
#[async_trait]
pub trait ChainAccountRpc: Send + Sync {
    async fn get_block_header_by_number(
        &self,
        req: BlockHeaderNumberRequest,
    ) -> Result<BlockHeaderResponse, GatewayError>;

    async fn get_block_by_number(&self, req: BlockNumberRequest)
    -> Result<BlockResponse, GatewayError>;

    async fn get_tx_by_hash(&self, req: TxHashRequest) -> Result<TxResponse, GatewayError>;

    async fn get_account(&self, req: AccountRequest) -> Result<AccountResponse, GatewayError>;

    async fn send_tx(&self, req: SendTxRequest) -> Result<SendTxResponse, GatewayError>;

    async fn convert_address(
        &self,
        req: ConvertAddressRequest,
    ) -> Result<ConvertAddressResponse, GatewayError>;
}

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Chain account service reached over JSON-RPC/HTTP
pub struct JsonRpcChainAccount {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl JsonRpcChainAccount {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            timeout,
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, GatewayError>
    where
        P: Serialize + Send,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        debug!(method, url = %self.url, "chain account rpc call");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout)
                } else {
                    GatewayError::Transport(format!("HTTP request failed: {}", e))
                }
            })?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(GatewayError::Rpc(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| GatewayError::Malformed("No result in RPC response".to_string()))
    }
}

#[async_trait]
impl ChainAccountRpc for JsonRpcChainAccount {
    async fn get_block_header_by_number(
        &self,
        req: BlockHeaderNumberRequest,
    ) -> Result<BlockHeaderResponse, GatewayError> {
        self.call("getBlockHeaderByNumber", (req,)).await
    }

    async fn get_block_by_number(
        &self,
        req: BlockNumberRequest,
    ) -> Result<BlockResponse, GatewayError> {
        self.call("getBlockByNumber", (req,)).await
    }

    async fn get_tx_by_hash(&self, req: TxHashRequest) -> Result<TxResponse, GatewayError> {
        self.call("getTxByHash", (req,)).await
    }

    async fn get_account(&self, req: AccountRequest) -> Result<AccountResponse, GatewayError> {
        self.call("getAccount", (req,)).await
    }

    async fn send_tx(&self, req: SendTxRequest) -> Result<SendTxResponse, GatewayError> {
        self.call("sendTx", (req,)).await
    }

    async fn convert_address(
        &self,
        req: ConvertAddressRequest,
    ) -> Result<ConvertAddressResponse, GatewayError> {
        self.call("convertAddress", (req,)).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_request_omits_height_for_latest() {
        let req = BlockHeaderNumberRequest {
            chain: "Ethereum".to_string(),
            network: "mainnet".to_string(),
            height: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"chain": "Ethereum", "network": "mainnet"}));
    }

    #[test]
    fn test_error_code_response_deserialize() {
        let json = r#"{"code": "ERROR", "msg": "node syncing"}"#;
        let resp: BlockHeaderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.code, ReturnCode::Error);
        assert!(resp.block_header.is_none());
    }

    #[test]
    fn test_block_response_deserialize() {
        let json = r#"{
            "code": "SUCCESS",
            "transactions": [{
                "hash": "0xabc",
                "height": "100",
                "from": "0x1",
                "to": "0x2",
                "tokenAddress": "0xtoken",
                "amount": "1000000000000000000000"
            }]
        }"#;
        let resp: BlockResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.transactions.len(), 1);
        assert_eq!(resp.transactions[0].token_address, "0xtoken");
        assert!(resp.transactions[0].fee.is_empty());
    }
}
