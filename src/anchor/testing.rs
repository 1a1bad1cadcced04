/// In-memory providers for exercising tier logic without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{BlockHeader, CalendarEndpoint, ChainOracle};
use crate::commitment::Commitment;
use crate::error::{AnchorError, Result};
use crate::storage::ProofStore;

pub const TEST_HASH: &str = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

enum Behavior {
    Respond(Vec<u8>),
    Fail,
    Hang,
}

pub struct FakeCalendar {
    identity: String,
    behavior: Behavior,
    upgraded: Option<Vec<u8>>,
    lookup_fails: bool,
    pub submissions: AtomicUsize,
}

impl FakeCalendar {
    fn with(identity: &str, behavior: Behavior) -> Self {
        Self {
            identity: identity.to_string(),
            behavior,
            upgraded: None,
            lookup_fails: false,
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn responding(identity: &str, response: Vec<u8>) -> Self {
        Self::with(identity, Behavior::Respond(response))
    }

    pub fn failing(identity: &str) -> Self {
        Self::with(identity, Behavior::Fail)
    }

    /// Never answers; only a caller-side timeout ends the request.
    pub fn hanging(identity: &str) -> Self {
        Self::with(identity, Behavior::Hang)
    }

    /// Timestamp returned by `fetch_timestamp`.
    pub fn with_timestamp(mut self, timestamp: Vec<u8>) -> Self {
        self.upgraded = Some(timestamp);
        self
    }

    pub fn with_unreachable_lookup(mut self) -> Self {
        self.lookup_fails = true;
        self
    }
}

#[async_trait]
impl CalendarEndpoint for FakeCalendar {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn submit(&self, _commitment: &Commitment) -> Result<Vec<u8>> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Respond(bytes) => Ok(bytes.clone()),
            Behavior::Fail => Err(AnchorError::Io(std::io::Error::other("connection refused"))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AnchorError::Io(std::io::Error::other("hung up")))
            }
        }
    }

    async fn fetch_timestamp(&self, _commitment: &Commitment) -> Result<Option<Vec<u8>>> {
        if self.lookup_fails {
            return Err(AnchorError::Io(std::io::Error::other("connection refused")));
        }
        Ok(self.upgraded.clone())
    }
}

pub fn block(number: u64, hash_byte: u8, timestamp: u64) -> BlockHeader {
    BlockHeader {
        number,
        hash: [hash_byte; 32],
        parent_hash: [hash_byte.wrapping_sub(1); 32],
        timestamp,
    }
}

pub struct FakeOracle {
    latest: Option<BlockHeader>,
    blocks: HashMap<u64, BlockHeader>,
    reachable: bool,
    pub latest_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
}

impl FakeOracle {
    /// Chain whose tip is `latest`; historical lookups see the same block.
    pub fn at(latest: BlockHeader) -> Self {
        let mut blocks = HashMap::new();
        blocks.insert(latest.number, latest);
        Self {
            latest: Some(latest),
            blocks,
            reachable: true,
            latest_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            latest: None,
            blocks: HashMap::new(),
            reachable: false,
            latest_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the block a later lookup at that height will see.
    pub fn with_block(mut self, header: BlockHeader) -> Self {
        self.blocks.insert(header.number, header);
        self
    }

    pub fn without_block(mut self, number: u64) -> Self {
        self.blocks.remove(&number);
        self
    }
}

#[async_trait]
impl ChainOracle for FakeOracle {
    fn chain_name(&self) -> &str {
        "ethereum"
    }

    async fn latest_block(&self) -> Result<BlockHeader> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(AnchorError::ChainRpcUnavailable("connection refused".into()));
        }
        self.latest
            .ok_or_else(|| AnchorError::ChainRpcUnavailable("no latest block".into()))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(AnchorError::ChainRpcUnavailable("connection refused".into()));
        }
        Ok(self.blocks.get(&number).copied())
    }
}

/// Store whose disk is always full.
pub struct FailingStore;

#[async_trait]
impl ProofStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn put(&self, key: &str, _data: &[u8]) -> Result<()> {
        Err(AnchorError::ProofStoreWriteFailed {
            key: key.to_string(),
            reason: "no space left on device".into(),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        Err(AnchorError::ProofNotFound(key.to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
}
