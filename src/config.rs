/// Anchoring configuration.
///
/// Everything the orchestrator talks to is configured here rather than
/// hardcoded, so deployments and tests can point it at their own
/// calendars, RPC node and proof directory.
use std::path::PathBuf;
use std::time::Duration;

/// Public calendar servers used when nothing else is configured.
pub const DEFAULT_CALENDARS: [&str; 3] = [
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
];

pub const DEFAULT_RPC_URL: &str = "https://cloudflare-eth.com";
pub const DEFAULT_EXPLORER_URL: &str = "https://etherscan.io";

#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Calendar server base URLs (at least one).
    pub calendar_urls: Vec<String>,
    /// Chain JSON-RPC endpoint for chain anchors and their verification.
    pub rpc_url: String,
    /// Chain identity recorded in chain-anchor proofs.
    pub chain_name: String,
    /// Block explorer base URL for human verification links.
    pub explorer_url: String,
    /// Directory for persisted proofs.
    pub proof_dir: PathBuf,
    /// Upper bound for any single outbound request.
    pub request_timeout: Duration,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            calendar_urls: DEFAULT_CALENDARS.iter().map(|s| s.to_string()).collect(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_name: "ethereum".to_string(),
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            proof_dir: PathBuf::from("proofs"),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl AnchorConfig {
    /// Read `PROOF_ANCHOR_*` variables, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let calendar_urls = lookup("PROOF_ANCHOR_CALENDARS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|urls| !urls.is_empty())
            .unwrap_or(defaults.calendar_urls);

        Self {
            calendar_urls,
            rpc_url: lookup("PROOF_ANCHOR_RPC_URL").unwrap_or(defaults.rpc_url),
            chain_name: lookup("PROOF_ANCHOR_CHAIN").unwrap_or(defaults.chain_name),
            explorer_url: lookup("PROOF_ANCHOR_EXPLORER_URL").unwrap_or(defaults.explorer_url),
            proof_dir: lookup("PROOF_ANCHOR_PROOF_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.proof_dir),
            request_timeout: lookup("PROOF_ANCHOR_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}
