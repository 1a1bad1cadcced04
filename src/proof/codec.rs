/// Binary envelope codec.
///
/// Layout (all integers big-endian):
///
/// ```text
/// magic "POEX" (4) | version (1) | tag (1) | commitment (32) | body
///
/// tag 0x01 calendar: created_at_ms i64 | count u16
///                    { server_len u16 | server | receipt_len u32 | receipt }*
/// tag 0x02 chain:    number u64 | hash (32) | parent_hash (32) | timestamp u64
///                    | chain_len u16 | chain | url_len u16 | url
/// tag 0x03 local:    recorded_at_ms i64
/// ```
///
/// The header alone identifies the variant. Trailing bytes are rejected.
use chrono::{DateTime, Utc};

use super::{CalendarProof, ChainAnchorProof, LocalTimestamp, ProofEnvelope, PROOF_FORMAT_VERSION};
use crate::anchor::{BlockHeader, CalendarReceipt};
use crate::commitment::{Commitment, COMMITMENT_LEN};
use crate::error::{AnchorError, Result};

pub const MAGIC: [u8; 4] = *b"POEX";

pub const TAG_CALENDAR: u8 = 0x01;
pub const TAG_CHAIN: u8 = 0x02;
pub const TAG_LOCAL: u8 = 0x03;

/// magic + version + tag
pub const HEADER_LEN: usize = MAGIC.len() + 2;

pub fn encode(envelope: &ProofEnvelope) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + COMMITMENT_LEN + 128);
    out.extend_from_slice(&MAGIC);
    out.push(PROOF_FORMAT_VERSION);

    match envelope {
        ProofEnvelope::Calendar(p) => {
            out.push(TAG_CALENDAR);
            out.extend_from_slice(p.commitment.as_bytes());
            out.extend_from_slice(&p.created_at.timestamp_millis().to_be_bytes());
            // The count field is u16; receipts past the cap are not encoded.
            let servers = &p.servers[..p.servers.len().min(u16::MAX as usize)];
            out.extend_from_slice(&(servers.len() as u16).to_be_bytes());
            for receipt in servers {
                put_str(&mut out, &receipt.server);
                out.extend_from_slice(&(receipt.response.len() as u32).to_be_bytes());
                out.extend_from_slice(&receipt.response);
            }
        }
        ProofEnvelope::ChainAnchor(p) => {
            out.push(TAG_CHAIN);
            out.extend_from_slice(p.commitment.as_bytes());
            out.extend_from_slice(&p.block.number.to_be_bytes());
            out.extend_from_slice(&p.block.hash);
            out.extend_from_slice(&p.block.parent_hash);
            out.extend_from_slice(&p.block.timestamp.to_be_bytes());
            put_str(&mut out, &p.chain);
            put_str(&mut out, &p.verification_url);
        }
        ProofEnvelope::Local(p) => {
            out.push(TAG_LOCAL);
            out.extend_from_slice(p.commitment.as_bytes());
            out.extend_from_slice(&p.recorded_at.timestamp_millis().to_be_bytes());
        }
    }

    out
}

/// Strings are capped at u16::MAX bytes; longer input is truncated on a
/// char boundary.
fn put_str(out: &mut Vec<u8>, s: &str) {
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out.extend_from_slice(&(end as u16).to_be_bytes());
    out.extend_from_slice(&s.as_bytes()[..end]);
}

/// Read just the variant tag, checking magic and version.
pub fn peek_tag(data: &[u8]) -> Result<u8> {
    if data.len() < HEADER_LEN || data[..MAGIC.len()] != MAGIC {
        return Err(AnchorError::UnknownProofFormat(
            "missing proof envelope header".into(),
        ));
    }

    let version = data[MAGIC.len()];
    if version != PROOF_FORMAT_VERSION {
        return Err(AnchorError::UnknownProofFormat(format!(
            "unsupported envelope version {version}"
        )));
    }

    let tag = data[MAGIC.len() + 1];
    match tag {
        TAG_CALENDAR | TAG_CHAIN | TAG_LOCAL => Ok(tag),
        other => Err(AnchorError::UnknownProofFormat(format!(
            "unknown envelope tag 0x{other:02x}"
        ))),
    }
}

pub fn decode(data: &[u8]) -> Result<ProofEnvelope> {
    let tag = peek_tag(data)?;
    let mut r = Reader::new(&data[HEADER_LEN..]);
    let commitment = Commitment::from_bytes(r.array32()?);

    let envelope = match tag {
        TAG_CALENDAR => {
            let created_at = r.millis()?;
            let count = r.u16()? as usize;
            let mut servers = Vec::with_capacity(count);
            for _ in 0..count {
                let server = r.string()?;
                let len = r.u32()? as usize;
                let response = r.take(len)?.to_vec();
                servers.push(CalendarReceipt { server, response });
            }
            ProofEnvelope::Calendar(CalendarProof {
                version: PROOF_FORMAT_VERSION,
                commitment,
                servers,
                created_at,
            })
        }
        TAG_CHAIN => {
            let block = BlockHeader {
                number: r.u64()?,
                hash: r.array32()?,
                parent_hash: r.array32()?,
                timestamp: r.u64()?,
            };
            ProofEnvelope::ChainAnchor(ChainAnchorProof {
                commitment,
                block,
                chain: r.string()?,
                verification_url: r.string()?,
            })
        }
        _ => ProofEnvelope::Local(LocalTimestamp {
            commitment,
            recorded_at: r.millis()?,
        }),
    };

    if r.remaining() != 0 {
        return Err(AnchorError::MalformedProof(format!(
            "{} trailing bytes after envelope",
            r.remaining()
        )));
    }

    Ok(envelope)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(AnchorError::MalformedProof(format!(
                "truncated envelope: needed {n} bytes at offset {}, {} left",
                HEADER_LEN + self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn array32(&mut self) -> Result<[u8; 32]> {
        self.array::<32>()
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn millis(&mut self) -> Result<DateTime<Utc>> {
        let ms = i64::from_be_bytes(self.array()?);
        DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| AnchorError::MalformedProof(format!("timestamp out of range: {ms}")))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AnchorError::MalformedProof(format!("invalid utf-8 string: {e}")))
    }
}
