/// Anchoring orchestrator.
///
/// Turns a content hash into a proof envelope by walking three tiers in
/// strict order, stopping at the first that yields something usable:
///
/// ```text
/// commitment ──▶ calendars ──(none answered)──▶ chain RPC ──(down)──▶ local
///                   │                              │                   │
///                pending                       confirmed             failed
/// ```
///
/// Only a malformed content hash is an error. Every provider failure just
/// moves the flow to the next tier, and the outcome always says which
/// trust level it ended at.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::anchor::calendar::{self, HttpCalendar};
use crate::anchor::ethereum::{EthereumConfig, EthereumOracle};
use crate::anchor::{BlockHeader, CalendarEndpoint, CalendarFactory, CalendarReceipt, ChainOracle};
use crate::commitment::Commitment;
use crate::config::{AnchorConfig, DEFAULT_EXPLORER_URL};
use crate::error::{AnchorError, Result};
use crate::proof::{ProofEnvelope, ProofKind};
use crate::storage::filesystem::FilesystemStore;
use crate::storage::ProofStore;
use crate::verify::Verifier;

/// Trust level of a freshly produced envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Calendar attestation, not yet committed on-chain.
    Pending,
    /// Bound to an already-mined block.
    Confirmed,
    /// Local clock only.
    Failed,
}

/// Result of one anchoring request.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorOutcome {
    pub envelope: ProofEnvelope,
    pub status: VerificationStatus,
    /// Pages where a human can check the proof independently.
    pub verification_links: Vec<String>,
    /// Where the binary envelope was persisted. `None` if the write failed.
    pub storage_key: Option<String>,
    /// Why persistence failed, if it did.
    pub storage_error: Option<String>,
}

impl AnchorOutcome {
    /// Anchored and persisted, so it can be re-verified later.
    pub fn is_durable(&self) -> bool {
        self.storage_key.is_some()
    }
}

/// What the tier walk settled on.
enum TierResult {
    Calendar(Vec<CalendarReceipt>),
    Chain(BlockHeader),
    Local,
}

pub struct Anchorer {
    calendars: Vec<Arc<dyn CalendarEndpoint>>,
    oracle: Arc<dyn ChainOracle>,
    store: Arc<dyn ProofStore>,
    explorer_url: String,
    timeout: Duration,
    calendar_factory: Option<CalendarFactory>,
}

impl Anchorer {
    pub fn new(
        calendars: Vec<Arc<dyn CalendarEndpoint>>,
        oracle: Arc<dyn ChainOracle>,
        store: Arc<dyn ProofStore>,
    ) -> Self {
        Self {
            calendars,
            oracle,
            store,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            timeout: Duration::from_secs(5),
            calendar_factory: None,
        }
    }

    pub fn with_explorer_url(mut self, explorer_url: &str) -> Self {
        self.explorer_url = explorer_url.to_string();
        self
    }

    /// Per-provider ceiling for each outbound call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How the verifier reaches recorded calendars that are no longer configured.
    pub fn with_calendar_factory(mut self, factory: CalendarFactory) -> Self {
        self.calendar_factory = Some(factory);
        self
    }

    /// Wire up HTTP calendars, the JSON-RPC oracle and a filesystem store.
    pub fn from_config(config: &AnchorConfig) -> Result<Self> {
        if config.calendar_urls.is_empty() {
            return Err(AnchorError::CalendarAttestationUnavailable { attempted: 0 });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        let calendars = config
            .calendar_urls
            .iter()
            .map(|url| Arc::new(HttpCalendar::with_client(client.clone(), url)) as Arc<dyn CalendarEndpoint>)
            .collect();

        let oracle = EthereumOracle::new(EthereumConfig {
            rpc_url: config.rpc_url.clone(),
            chain_name: config.chain_name.clone(),
            timeout: config.request_timeout,
        })?;

        let store = FilesystemStore::new(config.proof_dir.clone());

        let factory: CalendarFactory = Arc::new(move |url: &str| {
            Arc::new(HttpCalendar::with_client(client.clone(), url)) as Arc<dyn CalendarEndpoint>
        });

        Ok(Self::new(calendars, Arc::new(oracle), Arc::new(store))
            .with_explorer_url(&config.explorer_url)
            .with_timeout(config.request_timeout)
            .with_calendar_factory(factory))
    }

    /// Verifier sharing this anchorer's providers and store.
    pub fn verifier(&self) -> Verifier {
        let verifier = Verifier::new(self.calendars.clone(), self.oracle.clone(), self.store.clone())
            .with_timeout(self.timeout);
        match &self.calendar_factory {
            Some(factory) => verifier.with_calendar_factory(factory.clone()),
            None => verifier,
        }
    }

    /// Anchor a hex content hash. Fails only if the hash is malformed.
    pub async fn anchor(&self, content_hash: &str) -> Result<AnchorOutcome> {
        let commitment = Commitment::parse(content_hash)?;
        Ok(self.anchor_commitment(commitment).await)
    }

    pub async fn anchor_commitment(&self, commitment: Commitment) -> AnchorOutcome {
        info!(commitment = %commitment, "Anchoring commitment");

        let (envelope, status, verification_links) = match self.resolve_tier(&commitment).await {
            TierResult::Calendar(receipts) => {
                let links = self
                    .calendars
                    .iter()
                    .filter(|c| receipts.iter().any(|r| r.server == c.identity()))
                    .map(|c| c.verification_url(&commitment))
                    .collect();
                (
                    ProofEnvelope::calendar(commitment, receipts),
                    VerificationStatus::Pending,
                    links,
                )
            }
            TierResult::Chain(block) => {
                let envelope = ProofEnvelope::chain_anchor(
                    commitment,
                    block,
                    self.oracle.chain_name(),
                    &self.explorer_url,
                );
                let links = match &envelope {
                    ProofEnvelope::ChainAnchor(p) => vec![p.verification_url.clone()],
                    _ => Vec::new(),
                };
                (envelope, VerificationStatus::Confirmed, links)
            }
            TierResult::Local => (
                ProofEnvelope::local(commitment),
                VerificationStatus::Failed,
                Vec::new(),
            ),
        };

        let (storage_key, storage_error) = match self.persist(&envelope).await {
            Ok(key) => (Some(key), None),
            Err(e) => {
                warn!(commitment = %commitment, error = %e, "Proof not persisted, returning in-memory envelope");
                (None, Some(e.to_string()))
            }
        };

        info!(
            commitment = %commitment,
            kind = envelope.kind().suffix(),
            status = ?status,
            durable = storage_key.is_some(),
            "Anchoring complete"
        );

        AnchorOutcome {
            envelope,
            status,
            verification_links,
            storage_key,
            storage_error,
        }
    }

    /// Walk the tiers in order; each runs only if the previous produced nothing.
    async fn resolve_tier(&self, commitment: &Commitment) -> TierResult {
        match self.try_calendars(commitment).await {
            Ok(receipts) => return TierResult::Calendar(receipts),
            Err(e) => warn!(error = %e, "Calendar tier failed, falling back to chain anchor"),
        }

        match self.try_chain().await {
            Ok(block) => return TierResult::Chain(block),
            Err(e) => warn!(error = %e, "Chain tier failed, falling back to local timestamp"),
        }

        TierResult::Local
    }

    async fn try_calendars(&self, commitment: &Commitment) -> Result<Vec<CalendarReceipt>> {
        let results = calendar::submit_to_all(commitment, &self.calendars, self.timeout).await;
        calendar::collect_receipts(results)
    }

    async fn try_chain(&self) -> Result<BlockHeader> {
        match tokio::time::timeout(self.timeout, self.oracle.latest_block()).await {
            Ok(result) => result,
            Err(_) => Err(AnchorError::ChainRpcUnavailable("latest block query timed out".into())),
        }
    }

    async fn persist(&self, envelope: &ProofEnvelope) -> Result<String> {
        let key = envelope.storage_key();
        self.store.put(&key, &envelope.to_bytes()).await?;

        if envelope.kind() == ProofKind::Chain {
            let mirror_key = ProofKind::Chain.mirror_key(envelope.commitment());
            let mirrored = match envelope.to_json() {
                Ok(json) => self.store.put(&mirror_key, &json).await,
                Err(e) => Err(e),
            };
            if let Err(e) = mirrored {
                warn!(key = %mirror_key, error = %e, "JSON mirror not written");
            }
        }

        info!(store = self.store.name(), key = %key, "Proof persisted");
        Ok(key)
    }
}
