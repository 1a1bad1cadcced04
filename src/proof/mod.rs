/// Proof envelopes: the portable artifact handed back to callers.
///
/// An envelope is exactly one of:
/// - `Calendar`: receipts from calendar servers, still awaiting their
///   Bitcoin transaction (pending attestation)
/// - `ChainAnchor`: the commitment bound to an already-mined block
/// - `Local`: wall-clock time only, no independent witness
///
/// The binary encoding (see `codec`) is authoritative and
/// self-describing. The JSON projection exists for humans and
/// third-party inspection.
pub mod codec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::{BlockHeader, CalendarReceipt};
use crate::commitment::Commitment;
use crate::error::{AnchorError, Result};

/// Current envelope format version.
pub const PROOF_FORMAT_VERSION: u8 = 1;

/// Which tier produced an envelope. Also selects the storage-key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Calendar,
    Chain,
    Local,
}

impl ProofKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ProofKind::Calendar => "calendar",
            ProofKind::Chain => "chain",
            ProofKind::Local => "local",
        }
    }

    /// Key under which the binary envelope for `commitment` is stored.
    pub fn storage_key(&self, commitment: &Commitment) -> String {
        format!("{}.{}.proof", commitment.to_hex(), self.suffix())
    }

    /// Key for the human-readable JSON mirror.
    pub fn mirror_key(&self, commitment: &Commitment) -> String {
        format!("{}.{}.json", commitment.to_hex(), self.suffix())
    }
}

impl std::str::FromStr for ProofKind {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "calendar" => Ok(ProofKind::Calendar),
            "chain" => Ok(ProofKind::Chain),
            "local" => Ok(ProofKind::Local),
            other => Err(AnchorError::UnknownProofFormat(format!(
                "unknown proof kind: {other}"
            ))),
        }
    }
}

/// Calendar attestation awaiting on-chain confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarProof {
    pub version: u8,
    pub commitment: Commitment,
    /// Servers that accepted the commitment, with their receipts.
    pub servers: Vec<CalendarReceipt>,
    pub created_at: DateTime<Utc>,
}

impl CalendarProof {
    pub fn contributing_servers(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|r| r.server.as_str())
    }
}

/// Commitment bound to a specific mined block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAnchorProof {
    pub commitment: Commitment,
    pub block: BlockHeader,
    /// Chain identity (e.g., "ethereum").
    pub chain: String,
    /// Explorer page for the block.
    pub verification_url: String,
}

/// Last-resort record with no external witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTimestamp {
    pub commitment: Commitment,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anchor_type", rename_all = "snake_case")]
pub enum ProofEnvelope {
    Calendar(CalendarProof),
    ChainAnchor(ChainAnchorProof),
    Local(LocalTimestamp),
}

impl ProofEnvelope {
    pub fn calendar(commitment: Commitment, servers: Vec<CalendarReceipt>) -> Self {
        ProofEnvelope::Calendar(CalendarProof {
            version: PROOF_FORMAT_VERSION,
            commitment,
            servers,
            created_at: now_millis(),
        })
    }

    pub fn chain_anchor(
        commitment: Commitment,
        block: BlockHeader,
        chain: &str,
        explorer_url: &str,
    ) -> Self {
        let verification_url = format!(
            "{}/block/{}",
            explorer_url.trim_end_matches('/'),
            block.number
        );

        ProofEnvelope::ChainAnchor(ChainAnchorProof {
            commitment,
            block,
            chain: chain.to_string(),
            verification_url,
        })
    }

    pub fn local(commitment: Commitment) -> Self {
        ProofEnvelope::Local(LocalTimestamp {
            commitment,
            recorded_at: now_millis(),
        })
    }

    pub fn kind(&self) -> ProofKind {
        match self {
            ProofEnvelope::Calendar(_) => ProofKind::Calendar,
            ProofEnvelope::ChainAnchor(_) => ProofKind::Chain,
            ProofEnvelope::Local(_) => ProofKind::Local,
        }
    }

    pub fn commitment(&self) -> &Commitment {
        match self {
            ProofEnvelope::Calendar(p) => &p.commitment,
            ProofEnvelope::ChainAnchor(p) => &p.commitment,
            ProofEnvelope::Local(p) => &p.commitment,
        }
    }

    /// Only calendar proofs wait on a future transaction.
    pub fn pending_attestation(&self) -> bool {
        matches!(self, ProofEnvelope::Calendar(_))
    }

    pub fn storage_key(&self) -> String {
        self.kind().storage_key(self.commitment())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        codec::decode(data)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| AnchorError::Serialization(e.to_string()))
    }
}

/// The binary format keeps millisecond precision; truncate up front so an
/// envelope compares equal to its decoded copy.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
