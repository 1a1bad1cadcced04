use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use proof_anchor::commitment::Commitment;
use proof_anchor::config::AnchorConfig;
use proof_anchor::error::{AnchorError, Result};
use proof_anchor::pipeline::Anchorer;
use proof_anchor::proof::{ProofEnvelope, ProofKind};
use proof_anchor::telemetry;

#[derive(Parser)]
#[command(name = "proof-anchor")]
#[command(about = "Timestamp content hashes against public blockchains and verify the proofs")]
#[command(version)]
struct Cli {
    /// Calendar server base URL (repeatable). Overrides PROOF_ANCHOR_CALENDARS.
    #[arg(long = "calendar", global = true)]
    calendars: Vec<String>,

    /// Chain JSON-RPC endpoint.
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Chain name recorded in chain proofs. Overrides PROOF_ANCHOR_CHAIN.
    #[arg(long, global = true)]
    chain: Option<String>,

    /// Block explorer base URL for verification links. Overrides PROOF_ANCHOR_EXPLORER_URL.
    #[arg(long, global = true)]
    explorer_url: Option<String>,

    /// Directory where proofs are stored.
    #[arg(long, global = true)]
    proof_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor a content hash (or a file's SHA-256)
    Anchor {
        /// Hex content hash, optionally 0x-prefixed
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        hash: Option<String>,
        /// Hash this file and anchor the digest
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Verify an envelope file
    Verify {
        path: PathBuf,
        /// Content hash the envelope must commit to
        #[arg(long)]
        expect: Option<String>,
    },
    /// Verify the stored envelope for a content hash
    VerifyStored {
        hash: String,
        /// calendar, chain or local
        #[arg(long, default_value = "chain")]
        kind: String,
    },
    /// Print an envelope as JSON
    Inspect { path: PathBuf },
}

impl Cli {
    fn config(&self) -> AnchorConfig {
        let mut config = AnchorConfig::from_env();
        if !self.calendars.is_empty() {
            config.calendar_urls = self.calendars.clone();
        }
        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(chain) = &self.chain {
            config.chain_name = chain.clone();
        }
        if let Some(url) = &self.explorer_url {
            config.explorer_url = url.clone();
        }
        if let Some(dir) = &self.proof_dir {
            config.proof_dir = dir.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AnchorError::Serialization(e.to_string()))?;
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config();

    match cli.command {
        Commands::Anchor { hash, file } => {
            let anchorer = Anchorer::from_config(&config)?;
            let outcome = match (hash, file) {
                (Some(hash), _) => anchorer.anchor(&hash).await?,
                (None, Some(path)) => {
                    let data = tokio::fs::read(&path).await?;
                    anchorer.anchor_commitment(Commitment::digest(&data)).await
                }
                (None, None) => {
                    return Err(AnchorError::InvalidCommitmentFormat(
                        "a hash or --file is required".into(),
                    ))
                }
            };
            print_json(&outcome)
        }
        Commands::Verify { path, expect } => {
            let verifier = Anchorer::from_config(&config)?.verifier();
            let bytes = tokio::fs::read(&path).await?;
            let result = match expect {
                Some(hash) => verifier.verify_for(&hash, &bytes).await?,
                None => verifier.verify(&bytes).await,
            };
            print_json(&result)
        }
        Commands::VerifyStored { hash, kind } => {
            let kind: ProofKind = kind.parse()?;
            let verifier = Anchorer::from_config(&config)?.verifier();
            print_json(&verifier.verify_stored(&hash, kind).await?)
        }
        Commands::Inspect { path } => {
            let bytes = tokio::fs::read(&path).await?;
            let envelope = ProofEnvelope::from_bytes(&bytes)?;
            let json = envelope.to_json()?;
            println!("{}", String::from_utf8_lossy(&json));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("proof-anchor: {e}");
            ExitCode::FAILURE
        }
    }
}
