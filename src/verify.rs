/// Proof verification.
///
/// Takes envelope bytes exactly as they were stored, dispatches on the
/// header tag and re-asks the relevant oracle whether the claim holds:
///
/// - chain anchor: does the block at the recorded height still have the
///   recorded hash?
/// - calendar: has any contributing calendar upgraded the commitment to a
///   Bitcoin attestation yet?
/// - local: nothing to ask, never valid.
///
/// Verification never mutates the envelope and never returns an error for
/// a bad proof; it reports a verdict. "Cannot check right now" is kept
/// apart from "proof is wrong" because only the former is worth retrying.
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::anchor::calendar::{has_bitcoin_attestation, HttpCalendar};
use crate::anchor::{CalendarEndpoint, CalendarFactory, ChainOracle};
use crate::commitment::Commitment;
use crate::error::{AnchorError, Result};
use crate::proof::{CalendarProof, ChainAnchorProof, ProofEnvelope, ProofKind};
use crate::storage::ProofStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    UnknownProofFormat(String),
    MalformedProof(String),
    /// The chain has a different block at the recorded height.
    BlockHashMismatch,
    /// The chain has no block at the recorded height.
    BlockNotFound,
    /// Envelope commits to a different content hash than expected.
    CommitmentMismatch,
    /// Local timestamps carry no third-party evidence.
    NoIndependentWitness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    /// Calendar attestation not yet committed on-chain.
    Pending,
    /// The proof is wrong. Retrying will not help.
    Invalid { reason: InvalidReason },
    /// The oracle could not be consulted. Worth retrying later.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verdict: Verdict,
    pub kind: Option<ProofKind>,
    pub matched_block_hash: Option<String>,
    pub matched_block_height: Option<u64>,
    pub matched_timestamp: Option<u64>,
}

impl VerificationResult {
    fn new(kind: Option<ProofKind>, verdict: Verdict) -> Self {
        Self {
            verdict,
            kind,
            matched_block_hash: None,
            matched_block_height: None,
            matched_timestamp: None,
        }
    }

    fn invalid(kind: Option<ProofKind>, reason: InvalidReason) -> Self {
        Self::new(kind, Verdict::Invalid { reason })
    }

    /// `Some(true|false)` once decided, `None` while pending or unreachable.
    pub fn is_valid(&self) -> Option<bool> {
        match self.verdict {
            Verdict::Valid => Some(true),
            Verdict::Invalid { .. } => Some(false),
            Verdict::Pending | Verdict::Unavailable { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.verdict, Verdict::Pending | Verdict::Unavailable { .. })
    }
}

pub struct Verifier {
    calendars: Vec<Arc<dyn CalendarEndpoint>>,
    oracle: Arc<dyn ChainOracle>,
    store: Arc<dyn ProofStore>,
    calendar_factory: CalendarFactory,
    timeout: Duration,
}

impl Verifier {
    pub fn new(
        calendars: Vec<Arc<dyn CalendarEndpoint>>,
        oracle: Arc<dyn ChainOracle>,
        store: Arc<dyn ProofStore>,
    ) -> Self {
        Self {
            calendars,
            oracle,
            store,
            calendar_factory: Arc::new(|url: &str| {
                Arc::new(HttpCalendar::with_client(reqwest::Client::new(), url)) as Arc<dyn CalendarEndpoint>
            }),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace how endpoints are built for recorded calendars that are not
    /// configured.
    pub fn with_calendar_factory(mut self, factory: CalendarFactory) -> Self {
        self.calendar_factory = factory;
        self
    }

    /// Verify serialized envelope bytes.
    pub async fn verify(&self, envelope_bytes: &[u8]) -> VerificationResult {
        match ProofEnvelope::from_bytes(envelope_bytes) {
            Ok(envelope) => self.verify_envelope(&envelope).await,
            Err(AnchorError::UnknownProofFormat(reason)) => {
                warn!(reason = %reason, "Unknown proof format");
                VerificationResult::invalid(None, InvalidReason::UnknownProofFormat(reason))
            }
            Err(e) => {
                warn!(error = %e, "Malformed proof");
                VerificationResult::invalid(None, InvalidReason::MalformedProof(e.to_string()))
            }
        }
    }

    /// Verify envelope bytes and check they commit to `content_hash`.
    pub async fn verify_for(&self, content_hash: &str, envelope_bytes: &[u8]) -> Result<VerificationResult> {
        let expected = Commitment::parse(content_hash)?;

        match ProofEnvelope::from_bytes(envelope_bytes) {
            Ok(envelope) if envelope.commitment() != &expected => Ok(VerificationResult::invalid(
                Some(envelope.kind()),
                InvalidReason::CommitmentMismatch,
            )),
            _ => Ok(self.verify(envelope_bytes).await),
        }
    }

    /// Load the stored envelope of `kind` for `content_hash` and verify it.
    pub async fn verify_stored(&self, content_hash: &str, kind: ProofKind) -> Result<VerificationResult> {
        let commitment = Commitment::parse(content_hash)?;
        let bytes = self.store.get(&kind.storage_key(&commitment)).await?;
        self.verify_for(content_hash, &bytes).await
    }

    pub async fn verify_envelope(&self, envelope: &ProofEnvelope) -> VerificationResult {
        let result = match envelope {
            ProofEnvelope::ChainAnchor(proof) => self.verify_chain_anchor(proof).await,
            ProofEnvelope::Calendar(proof) => self.verify_calendar(proof).await,
            ProofEnvelope::Local(_) => VerificationResult::invalid(
                Some(ProofKind::Local),
                InvalidReason::NoIndependentWitness,
            ),
        };

        info!(
            commitment = %envelope.commitment(),
            kind = envelope.kind().suffix(),
            verdict = ?result.verdict,
            "Proof verified"
        );
        result
    }

    async fn verify_chain_anchor(&self, proof: &ChainAnchorProof) -> VerificationResult {
        let kind = Some(ProofKind::Chain);

        if proof.chain != self.oracle.chain_name() {
            return VerificationResult::new(
                kind,
                Verdict::Unavailable {
                    reason: format!(
                        "proof is anchored to {}, oracle serves {}",
                        proof.chain,
                        self.oracle.chain_name()
                    ),
                },
            );
        }

        let lookup = tokio::time::timeout(
            self.timeout,
            self.oracle.block_by_number(proof.block.number),
        )
        .await;

        match lookup {
            Ok(Ok(Some(live))) if live.hash == proof.block.hash => VerificationResult {
                verdict: Verdict::Valid,
                kind,
                matched_block_hash: Some(format!("0x{}", hex::encode(live.hash))),
                matched_block_height: Some(live.number),
                matched_timestamp: Some(live.timestamp),
            },
            Ok(Ok(Some(live))) => {
                warn!(
                    height = proof.block.number,
                    recorded = %hex::encode(proof.block.hash),
                    live = %hex::encode(live.hash),
                    "Block hash mismatch"
                );
                VerificationResult::invalid(kind, InvalidReason::BlockHashMismatch)
            }
            Ok(Ok(None)) => VerificationResult::invalid(kind, InvalidReason::BlockNotFound),
            Ok(Err(e)) => VerificationResult::new(
                kind,
                Verdict::Unavailable {
                    reason: e.to_string(),
                },
            ),
            Err(_) => VerificationResult::new(
                kind,
                Verdict::Unavailable {
                    reason: "block lookup timed out".to_string(),
                },
            ),
        }
    }

    /// Valid once any contributing calendar serves a Bitcoin-attested
    /// timestamp. Unreachable calendars leave the proof pending.
    async fn verify_calendar(&self, proof: &CalendarProof) -> VerificationResult {
        let kind = Some(ProofKind::Calendar);

        // The proof names its calendars; the configured list may have moved on.
        let contributing: Vec<Arc<dyn CalendarEndpoint>> = proof
            .contributing_servers()
            .map(|server| {
                self.calendars
                    .iter()
                    .find(|c| c.identity() == server)
                    .cloned()
                    .unwrap_or_else(|| (self.calendar_factory)(server))
            })
            .collect();

        let lookups = contributing.iter().map(|calendar| async move {
            match tokio::time::timeout(self.timeout, calendar.fetch_timestamp(&proof.commitment)).await {
                Ok(Ok(Some(timestamp))) => has_bitcoin_attestation(&timestamp),
                Ok(Ok(None)) => false,
                Ok(Err(e)) => {
                    warn!(server = %calendar.identity(), error = %e, "Calendar lookup failed");
                    false
                }
                Err(_) => {
                    warn!(server = %calendar.identity(), "Calendar lookup timed out");
                    false
                }
            }
        });

        if join_all(lookups).await.into_iter().any(|attested| attested) {
            VerificationResult::new(kind, Verdict::Valid)
        } else {
            VerificationResult::new(kind, Verdict::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::calendar::{BITCOIN_ATTESTATION_TAG, PENDING_ATTESTATION_TAG};
    use crate::anchor::testing::{block, FakeCalendar, FakeOracle, TEST_HASH};
    use crate::anchor::{BlockHeader, CalendarReceipt};
    use crate::proof::codec;
    use crate::storage::memory::MemoryStore;

    fn commitment() -> Commitment {
        Commitment::parse(TEST_HASH).unwrap()
    }

    fn anchored_block() -> BlockHeader {
        block(19_000_000, 0xab, 1_700_000_000)
    }

    fn chain_bytes(header: BlockHeader) -> Vec<u8> {
        ProofEnvelope::chain_anchor(commitment(), header, "ethereum", "https://etherscan.io").to_bytes()
    }

    fn verifier_with(oracle: FakeOracle) -> Verifier {
        Verifier::new(vec![], Arc::new(oracle), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_chain_anchor_valid_when_hash_matches() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));

        let result = verifier.verify(&chain_bytes(anchored_block())).await;

        assert_eq!(result.verdict, Verdict::Valid);
        assert_eq!(result.is_valid(), Some(true));
        assert_eq!(result.matched_block_height, Some(19_000_000));
        assert_eq!(result.matched_timestamp, Some(1_700_000_000));
        assert_eq!(
            result.matched_block_hash.as_deref(),
            Some(format!("0x{}", "ab".repeat(32)).as_str())
        );
    }

    #[tokio::test]
    async fn test_mutated_hash_byte_is_invalid() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let mut bytes = chain_bytes(anchored_block());
        // first byte of the recorded block hash
        let hash_offset = codec::HEADER_LEN + 32 + 8;
        bytes[hash_offset] ^= 0x01;

        let result = verifier.verify(&bytes).await;

        assert_eq!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::BlockHashMismatch
            }
        );
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_reorged_block_is_invalid() {
        let oracle = FakeOracle::at(anchored_block()).with_block(block(19_000_000, 0xcd, 1_700_000_000));
        let result = verifier_with(oracle).verify(&chain_bytes(anchored_block())).await;
        assert_eq!(result.is_valid(), Some(false));
    }

    #[tokio::test]
    async fn test_missing_block_is_invalid() {
        let oracle = FakeOracle::at(anchored_block()).without_block(19_000_000);
        let result = verifier_with(oracle).verify(&chain_bytes(anchored_block())).await;
        assert_eq!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::BlockNotFound
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_rpc_is_retryable() {
        let result = verifier_with(FakeOracle::unreachable())
            .verify(&chain_bytes(anchored_block()))
            .await;

        assert!(matches!(result.verdict, Verdict::Unavailable { .. }));
        assert_eq!(result.is_valid(), None);
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_foreign_chain_is_unavailable() {
        let bytes = ProofEnvelope::chain_anchor(commitment(), anchored_block(), "polygon", "https://x")
            .to_bytes();
        let oracle = FakeOracle::at(anchored_block());
        let result = verifier_with(oracle).verify(&bytes).await;
        assert!(matches!(result.verdict, Verdict::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_format_reported_not_raised() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let mut bytes = chain_bytes(anchored_block());
        bytes[5] = 0x09;

        let result = verifier.verify(&bytes).await;

        assert!(matches!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::UnknownProofFormat(_)
            }
        ));
        assert_eq!(result.kind, None);

        let garbage = verifier.verify(b"not a proof").await;
        assert_eq!(garbage.is_valid(), Some(false));
    }

    #[tokio::test]
    async fn test_truncated_envelope_is_malformed() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let bytes = chain_bytes(anchored_block());

        let result = verifier.verify(&bytes[..bytes.len() - 3]).await;

        assert!(matches!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::MalformedProof(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_local_timestamp_never_valid() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let result = verifier.verify(&ProofEnvelope::local(commitment()).to_bytes()).await;
        assert_eq!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::NoIndependentWitness
            }
        );
    }

    fn calendar_bytes(servers: &[&str]) -> Vec<u8> {
        let receipts = servers
            .iter()
            .map(|s| CalendarReceipt {
                server: s.to_string(),
                response: PENDING_ATTESTATION_TAG.to_vec(),
            })
            .collect();
        ProofEnvelope::calendar(commitment(), receipts).to_bytes()
    }

    fn calendar_verifier(calendars: Vec<FakeCalendar>) -> Verifier {
        Verifier::new(
            calendars
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn CalendarEndpoint>)
                .collect(),
            Arc::new(FakeOracle::unreachable()),
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_calendar_pending_until_upgraded() {
        let verifier = calendar_verifier(vec![
            FakeCalendar::responding("https://alice", vec![]).with_timestamp(PENDING_ATTESTATION_TAG.to_vec()),
            FakeCalendar::responding("https://bob", vec![]),
        ]);

        let result = verifier.verify(&calendar_bytes(&["https://alice", "https://bob"])).await;

        assert_eq!(result.verdict, Verdict::Pending);
        assert_eq!(result.kind, Some(ProofKind::Calendar));
        assert_eq!(result.is_valid(), None);
    }

    #[tokio::test]
    async fn test_calendar_valid_once_bitcoin_attested() {
        let mut upgraded = vec![0xf0, 0x20];
        upgraded.extend_from_slice(&BITCOIN_ATTESTATION_TAG);
        let verifier = calendar_verifier(vec![
            FakeCalendar::responding("https://alice", vec![]).with_unreachable_lookup(),
            FakeCalendar::responding("https://bob", vec![]).with_timestamp(upgraded),
        ]);

        let result = verifier.verify(&calendar_bytes(&["https://alice", "https://bob"])).await;

        assert_eq!(result.verdict, Verdict::Valid);
    }

    #[tokio::test]
    async fn test_calendar_only_consults_contributors() {
        let mut upgraded = vec![];
        upgraded.extend_from_slice(&BITCOIN_ATTESTATION_TAG);
        let verifier = calendar_verifier(vec![
            FakeCalendar::responding("https://alice", vec![]),
            FakeCalendar::responding("https://other", vec![]).with_timestamp(upgraded),
        ]);

        let result = verifier.verify(&calendar_bytes(&["https://alice"])).await;

        assert_eq!(result.verdict, Verdict::Pending);
    }

    #[tokio::test]
    async fn test_calendar_reached_after_config_change() {
        let mut upgraded = vec![0xf0, 0x20];
        upgraded.extend_from_slice(&BITCOIN_ATTESTATION_TAG);
        let requested = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let seen = requested.clone();
        let factory: CalendarFactory = Arc::new(move |url: &str| {
            seen.lock().unwrap().push(url.to_string());
            Arc::new(FakeCalendar::responding(url, vec![]).with_timestamp(upgraded.clone()))
                as Arc<dyn CalendarEndpoint>
        });
        // Anchored against alice; the deployment now only lists another calendar.
        let verifier = calendar_verifier(vec![FakeCalendar::responding("https://other", vec![])])
            .with_calendar_factory(factory);

        let result = verifier.verify(&calendar_bytes(&["https://alice"])).await;

        assert_eq!(result.verdict, Verdict::Valid);
        assert_eq!(*requested.lock().unwrap(), vec!["https://alice".to_string()]);
    }

    #[tokio::test]
    async fn test_configured_calendar_preferred_over_factory() {
        let requested = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let seen = requested.clone();
        let factory: CalendarFactory = Arc::new(move |url: &str| {
            seen.lock().unwrap().push(url.to_string());
            Arc::new(FakeCalendar::responding(url, vec![])) as Arc<dyn CalendarEndpoint>
        });
        let verifier = calendar_verifier(vec![FakeCalendar::responding("https://alice", vec![])])
            .with_calendar_factory(factory);

        let result = verifier.verify(&calendar_bytes(&["https://alice"])).await;

        assert_eq!(result.verdict, Verdict::Pending);
        assert!(requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_is_repeatable() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let bytes = chain_bytes(anchored_block());

        let first = verifier.verify(&bytes).await;
        let second = verifier.verify(&bytes).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_verify_for_detects_wrong_commitment() {
        let verifier = verifier_with(FakeOracle::at(anchored_block()));
        let other = "11".repeat(32);

        let result = verifier
            .verify_for(&other, &chain_bytes(anchored_block()))
            .await
            .unwrap();
        assert_eq!(
            result.verdict,
            Verdict::Invalid {
                reason: InvalidReason::CommitmentMismatch
            }
        );

        let matching = verifier
            .verify_for(&format!("0x{TEST_HASH}"), &chain_bytes(anchored_block()))
            .await
            .unwrap();
        assert_eq!(matching.verdict, Verdict::Valid);

        assert!(verifier.verify_for("xyz", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_stored_reads_from_store() {
        let store = Arc::new(MemoryStore::new());
        let envelope =
            ProofEnvelope::chain_anchor(commitment(), anchored_block(), "ethereum", "https://etherscan.io");
        store
            .put(&envelope.storage_key(), &envelope.to_bytes())
            .await
            .unwrap();
        let verifier = Verifier::new(vec![], Arc::new(FakeOracle::at(anchored_block())), store);

        let result = verifier.verify_stored(TEST_HASH, ProofKind::Chain).await.unwrap();
        assert_eq!(result.verdict, Verdict::Valid);

        assert!(matches!(
            verifier.verify_stored(TEST_HASH, ProofKind::Calendar).await,
            Err(AnchorError::ProofNotFound(_))
        ));
    }
}
