/// External attestation providers.
///
/// Two narrow capability traits stand between the orchestrator and the
/// network. Anything that can accept a commitment and hand back an opaque
/// receipt is a `CalendarEndpoint`; anything that can report block
/// headers is a `ChainOracle`.
///
/// Providers:
/// - Calendar servers: aggregate many commitments into a future Bitcoin
///   transaction (pending attestation)
/// - Ethereum JSON-RPC: latest block identity for immediate chain anchors
pub mod calendar;
pub mod ethereum;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::Result;

/// Identity of an already-mined block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
    #[serde(with = "hex::serde")]
    pub parent_hash: [u8; 32],
    /// Unix seconds.
    pub timestamp: u64,
}

/// A successful calendar submission: who answered and what they sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarReceipt {
    pub server: String,
    #[serde(with = "hex::serde")]
    pub response: Vec<u8>,
}

/// Outcome of one submission attempt against one calendar server.
#[derive(Debug, Clone)]
pub struct CalendarSubmissionResult {
    pub server: String,
    pub response: Vec<u8>,
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl CalendarSubmissionResult {
    pub fn succeeded(server: &str, response: Vec<u8>) -> Self {
        Self {
            server: server.to_string(),
            response,
            success: true,
            error: None,
        }
    }

    pub fn failed(server: &str, error: impl Into<String>) -> Self {
        Self {
            server: server.to_string(),
            response: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Builds an endpoint for a calendar URL recorded in a proof but absent
/// from the current configuration.
pub type CalendarFactory = Arc<dyn Fn(&str) -> Arc<dyn CalendarEndpoint> + Send + Sync>;

/// A timestamp calendar server.
#[async_trait]
pub trait CalendarEndpoint: Send + Sync {
    /// Server identity, usually its base URL.
    fn identity(&self) -> &str;

    /// Submit the raw commitment bytes. Returns the server's opaque receipt.
    async fn submit(&self, commitment: &Commitment) -> Result<Vec<u8>>;

    /// Fetch the server's current timestamp for a commitment.
    /// `None` means the server has nothing (yet) for it.
    async fn fetch_timestamp(&self, commitment: &Commitment) -> Result<Option<Vec<u8>>>;

    /// Human-facing link for checking this commitment on the server.
    fn verification_url(&self, commitment: &Commitment) -> String {
        format!(
            "{}/timestamp/{}",
            self.identity().trim_end_matches('/'),
            commitment.to_hex()
        )
    }
}

/// Read-only view of a blockchain's headers.
#[async_trait]
pub trait ChainOracle: Send + Sync {
    /// Chain identity recorded in proofs (e.g., "ethereum").
    fn chain_name(&self) -> &str;

    /// Latest mined block. Errors if the endpoint is unreachable or has no block.
    async fn latest_block(&self) -> Result<BlockHeader>;

    /// Block at a given height, `None` if the chain has no such block.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>>;
}
