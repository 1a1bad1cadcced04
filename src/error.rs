use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Invalid commitment format: {0}")]
    InvalidCommitmentFormat(String),

    #[error("No calendar server accepted the commitment ({attempted} attempted)")]
    CalendarAttestationUnavailable { attempted: usize },

    #[error("Chain RPC unavailable: {0}")]
    ChainRpcUnavailable(String),

    #[error("Proof store write failed for {key}: {reason}")]
    ProofStoreWriteFailed { key: String, reason: String },

    #[error("Proof not found: {0}")]
    ProofNotFound(String),

    #[error("Unknown proof format: {0}")]
    UnknownProofFormat(String),

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, AnchorError>;
