/// Timestamp calendar client.
///
/// Calendar servers accept a 32-byte digest, fold it into a Merkle tree
/// with everyone else's, and later commit the tree root to Bitcoin.
/// Until then the server's reply is a pending attestation: a promise
/// that can be upgraded by asking the same server again.
///
/// ```text
///              ┌──▶ alice  ─┐
/// commitment ──┼──▶ bob    ─┼──▶ receipts (whoever answered in time)
///              └──▶ finney ─┘
/// ```
///
/// All servers are contacted concurrently. One slow or broken server never
/// blocks the others beyond its own timeout.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use super::{CalendarEndpoint, CalendarReceipt, CalendarSubmissionResult};
use crate::commitment::Commitment;
use crate::error::{AnchorError, Result};

/// Media type calendar servers speak.
const OTS_MEDIA_TYPE: &str = "application/vnd.opentimestamps.v1";

/// Attestation tag marking a Bitcoin block-header attestation inside a
/// serialized timestamp.
pub const BITCOIN_ATTESTATION_TAG: [u8; 8] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];

/// Attestation tag marking a pending (calendar-only) attestation.
pub const PENDING_ATTESTATION_TAG: [u8; 8] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

/// Whether a serialized timestamp has been upgraded to a Bitcoin attestation.
pub fn has_bitcoin_attestation(timestamp: &[u8]) -> bool {
    timestamp
        .windows(BITCOIN_ATTESTATION_TAG.len())
        .any(|w| w == BITCOIN_ATTESTATION_TAG)
}

/// Calendar server reached over HTTP.
pub struct HttpCalendar {
    client: Client,
    base_url: String,
}

impl HttpCalendar {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Share one connection pool across several calendars.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CalendarEndpoint for HttpCalendar {
    fn identity(&self) -> &str {
        &self.base_url
    }

    async fn submit(&self, commitment: &Commitment) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(format!("{}/digest", self.base_url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .body(commitment.as_bytes().to_vec())
            .send()
            .await
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::Io(std::io::Error::other(format!(
                "calendar {} rejected digest ({status}): {body}",
                self.base_url
            ))));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        Ok(bytes.to_vec())
    }

    async fn fetch_timestamp(&self, commitment: &Commitment) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get(format!("{}/timestamp/{}", self.base_url, commitment.to_hex()))
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            return Err(AnchorError::Io(std::io::Error::other(format!(
                "calendar {} timestamp lookup failed: {}",
                self.base_url,
                resp.status()
            ))));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AnchorError::Io(std::io::Error::other(e)))?;

        Ok(Some(bytes.to_vec()))
    }
}

/// Submit a commitment to every calendar at once and wait for all of them
/// to settle, each bounded by `timeout`.
pub async fn submit_to_all(
    commitment: &Commitment,
    calendars: &[Arc<dyn CalendarEndpoint>],
    timeout: Duration,
) -> Vec<CalendarSubmissionResult> {
    let attempts = calendars.iter().map(|calendar| async move {
        let server = calendar.identity();

        match tokio::time::timeout(timeout, calendar.submit(commitment)).await {
            Ok(Ok(response)) => {
                info!(server = %server, bytes = response.len(), "Calendar accepted commitment");
                CalendarSubmissionResult::succeeded(server, response)
            }
            Ok(Err(e)) => {
                warn!(server = %server, error = %e, "Calendar submission failed");
                CalendarSubmissionResult::failed(server, e.to_string())
            }
            Err(_) => {
                warn!(server = %server, timeout_ms = timeout.as_millis() as u64, "Calendar submission timed out");
                CalendarSubmissionResult::failed(server, "timed out")
            }
        }
    });

    join_all(attempts).await
}

/// Keep the successful submissions. Errors only if nobody answered.
pub fn collect_receipts(results: Vec<CalendarSubmissionResult>) -> Result<Vec<CalendarReceipt>> {
    let attempted = results.len();

    let receipts: Vec<CalendarReceipt> = results
        .into_iter()
        .filter(|r| r.success)
        .map(|r| CalendarReceipt {
            server: r.server,
            response: r.response,
        })
        .collect();

    if receipts.is_empty() {
        return Err(AnchorError::CalendarAttestationUnavailable { attempted });
    }

    Ok(receipts)
}
