/// Filesystem proof store.
///
/// Each key is a file directly under the proof directory. Writes go to a
/// temporary sibling first and are renamed into place, so readers never
/// observe a half-written envelope.
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::ProofStore;
use crate::error::{AnchorError, Result};

pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are flat file names; anything that could escape the root is refused.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.starts_with('.');
        if !valid {
            return Err(AnchorError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid proof key: {key:?}"),
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ProofStore for FilesystemStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let write_failed = |e: std::io::Error| AnchorError::ProofStoreWriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(write_failed)?;

        // Each writer gets its own temp file; the rename is the only shared step.
        let root = self.root.clone();
        let target = path.clone();
        let len = data.len();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".proof-")
                .suffix(".tmp")
                .tempfile_in(&root)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| write_failed(std::io::Error::other(e)))?
        .map_err(write_failed)?;

        debug!(path = %path.display(), bytes = len, "Proof written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AnchorError::ProofNotFound(key.to_string()))
            }
            Err(e) => Err(AnchorError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
