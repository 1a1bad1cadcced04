/// Durable proof storage.
///
/// Envelopes are addressed by `<commitment hex>.<kind>.proof`, so proofs of
/// different kinds for the same commitment never share a slot. Writers
/// only ever replace a whole value; there is no read-modify-write.
///
/// Backends:
/// - Filesystem: one file per key under a proof directory
/// - Memory: process-local map, for embedding and tests
pub mod filesystem;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for pluggable proof stores.
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Human-readable name of this store (e.g., "filesystem").
    fn name(&self) -> &str;

    /// Write bytes under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read bytes by key. Errors with `ProofNotFound` on a miss.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;
}
