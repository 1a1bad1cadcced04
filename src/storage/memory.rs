/// In-process proof store.
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::ProofStore;
use crate::error::{AnchorError, Result};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

fn poisoned(key: &str) -> AnchorError {
    AnchorError::Io(std::io::Error::other(format!(
        "memory store lock poisoned while accessing {key}"
    )))
}

#[async_trait]
impl ProofStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned(key))?;
        entries.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let entries = self.entries.read().map_err(|_| poisoned(key))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| AnchorError::ProofNotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().map_err(|_| poisoned(key))?;
        Ok(entries.contains_key(key))
    }
}
