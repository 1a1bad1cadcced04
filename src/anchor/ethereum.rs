/// Ethereum block oracle over raw JSON-RPC.
///
/// A chain anchor binds a commitment to the identity of the latest mined
/// block. No transaction is sent: anyone can later look the block up by
/// height on a public explorer and compare hashes.
///
/// Only `eth_getBlockByNumber` is used, so any node or hosted provider
/// (Infura, Alchemy, public gateways) works.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{BlockHeader, ChainOracle};
use crate::error::{AnchorError, Result};

/// Configuration for the Ethereum oracle.
#[derive(Debug, Clone)]
pub struct EthereumConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Chain identity recorded in proofs (e.g., "ethereum", "sepolia").
    pub chain_name: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

pub struct EthereumOracle {
    config: EthereumConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

/// Block fields we consume; everything is hex-encoded on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: String,
    parent_hash: String,
    timestamp: String,
}

impl RpcBlock {
    fn into_header(self) -> Result<BlockHeader> {
        Ok(BlockHeader {
            number: parse_quantity(&self.number)?,
            hash: parse_hash(&self.hash)?,
            parent_hash: parse_hash(&self.parent_hash)?,
            timestamp: parse_quantity(&self.timestamp)?,
        })
    }
}

fn parse_quantity(value: &str) -> Result<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::ChainRpcUnavailable(format!("invalid quantity {value}: {e}")))
}

fn parse_hash(value: &str) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(value.trim_start_matches("0x"), &mut out)
        .map_err(|e| AnchorError::ChainRpcUnavailable(format!("invalid block hash {value}: {e}")))?;
    Ok(out)
}

impl EthereumOracle {
    pub fn new(config: EthereumConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnchorError::ChainRpcUnavailable(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Send a JSON-RPC request. A `null` result comes back as `None`.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::ChainRpcUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AnchorError::ChainRpcUnavailable(format!(
                "{method} returned HTTP {}",
                resp.status()
            )));
        }

        let resp: JsonRpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| AnchorError::ChainRpcUnavailable(format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::ChainRpcUnavailable(format!(
                "ETH RPC error: {}",
                err.message
            )));
        }

        Ok(resp.result)
    }

    async fn get_block(&self, tag: String) -> Result<Option<BlockHeader>> {
        let block: Option<RpcBlock> = self
            .rpc_call("eth_getBlockByNumber", serde_json::json!([tag, false]))
            .await?;

        block.map(RpcBlock::into_header).transpose()
    }
}

#[async_trait]
impl ChainOracle for EthereumOracle {
    fn chain_name(&self) -> &str {
        &self.config.chain_name
    }

    async fn latest_block(&self) -> Result<BlockHeader> {
        self.get_block("latest".to_string())
            .await?
            .ok_or_else(|| AnchorError::ChainRpcUnavailable("node returned no latest block".into()))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
        self.get_block(format!("0x{number:x}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn oracle(url: String) -> EthereumOracle {
        EthereumOracle::new(EthereumConfig {
            rpc_url: url,
            chain_name: "ethereum".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn block_json() -> serde_json::Value {
        json!({
            "number": "0x121eac0",
            "hash": format!("0x{}", "ab".repeat(32)),
            "parentHash": format!("0x{}", "aa".repeat(32)),
            "timestamp": "0x6553f100",
            "transactions": []
        })
    }

    #[tokio::test]
    async fn test_latest_block_parses_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"method":"eth_getBlockByNumber","params":["latest",false]}"#);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": block_json()}));
            })
            .await;

        let header = oracle(server.url("/")).latest_block().await.unwrap();

        mock.assert_async().await;
        assert_eq!(header.number, 19_000_000);
        assert_eq!(header.hash, [0xab; 32]);
        assert_eq!(header.parent_hash, [0xaa; 32]);
        assert_eq!(header.timestamp, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_block_by_number_sends_hex_height() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .json_body_partial(r#"{"params":["0x121eac0",false]}"#);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": block_json()}));
            })
            .await;

        let header = oracle(server.url("/"))
            .block_by_number(19_000_000)
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(header.number, 19_000_000);
    }

    #[tokio::test]
    async fn test_null_result_is_missing_block() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
            })
            .await;

        let oracle = oracle(server.url("/"));
        assert_eq!(oracle.block_by_number(99_999_999).await.unwrap(), None);
        assert!(matches!(
            oracle.latest_block().await,
            Err(AnchorError::ChainRpcUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": -32005, "message": "rate limited"}
                }));
            })
            .await;

        let err = oracle(server.url("/")).latest_block().await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_http_failure_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(502);
            })
            .await;

        assert!(matches!(
            oracle(server.url("/")).latest_block().await,
            Err(AnchorError::ChainRpcUnavailable(_))
        ));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x6553f100").unwrap(), 1_700_000_000);
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_hash("0x1234").is_err());
    }
}
