/// Content-hash normalization.
///
/// Callers hand us a hex string that may carry a `0x` transport prefix
/// and mixed case. Every provider downstream only ever sees the
/// canonical form: lowercase hex without prefix, or the raw 32 bytes.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{AnchorError, Result};

/// Byte length of a commitment (SHA-256 sized).
pub const COMMITMENT_LEN: usize = 32;

/// A normalized, fixed-width commitment to a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment([u8; COMMITMENT_LEN]);

impl Commitment {
    /// Normalize a hex content hash, with or without a `0x`/`0X` prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if stripped.len() != COMMITMENT_LEN * 2 {
            return Err(AnchorError::InvalidCommitmentFormat(format!(
                "expected {} hex characters, got {}",
                COMMITMENT_LEN * 2,
                stripped.len()
            )));
        }

        let mut bytes = [0u8; COMMITMENT_LEN];
        hex::decode_to_slice(stripped, &mut bytes)
            .map_err(|e| AnchorError::InvalidCommitmentFormat(format!("not valid hex: {e}")))?;

        Ok(Self(bytes))
    }

    /// Commitment for raw file contents (SHA-256).
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn from_bytes(bytes: [u8; COMMITMENT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LEN] {
        &self.0
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
