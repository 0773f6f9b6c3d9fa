//! Audit chain hashing and verification.
//!
//! Each entry's `previous_hash` is a SHA-256 digest over a pipe-delimited
//! string of the preceding entry's `log_id` and `timestamp` plus the new
//! entry's `log_id` and `action`. The first entry of an agent links to a
//! fixed genesis digest. The hash intentionally covers identity, order,
//! and action only; `resource`/`context`/`metadata` are protected solely
//! by the immutability of inserted rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `SHA256("GENESIS")` — the `previous_hash` of an agent's first entry.
pub fn genesis_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"GENESIS");
    format!("{:x}", hasher.finalize())
}

/// Canonical timestamp rendering used inside the hash input.
///
/// Writer and verifier must agree on this byte-for-byte, so both call
/// here: ISO-8601 with microseconds, UTC, no offset suffix.
pub fn chain_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Digest linking a new entry to its predecessor.
pub fn link_hash(
    prev_log_id: Uuid,
    prev_timestamp: DateTime<Utc>,
    new_log_id: Uuid,
    new_action: &str,
) -> String {
    let raw = format!(
        "{prev_log_id}|{}|{new_log_id}|{new_action}",
        chain_timestamp(prev_timestamp)
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Result of walking one agent's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<Uuid>,
}

/// The fields of a stored entry the verifier needs, in insertion order.
#[derive(Debug, Clone)]
pub struct ChainRow {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub previous_hash: String,
}

/// Walk rows in insertion order and report the first broken link.
///
/// The first row must carry the genesis digest; every later row must
/// carry the digest recomputed from its predecessor and its own
/// `log_id`/`action`.
pub fn verify_rows(rows: &[ChainRow]) -> ChainVerification {
    let mut prev: Option<&ChainRow> = None;

    for row in rows {
        let expected = match prev {
            None => genesis_hash(),
            Some(p) => link_hash(p.log_id, p.timestamp, row.log_id, &row.action),
        };
        if row.previous_hash != expected {
            return ChainVerification {
                valid: false,
                total_entries: rows.len() as i64,
                broken_at: Some(row.log_id),
            };
        }
        prev = Some(row);
    }

    ChainVerification {
        valid: true,
        total_entries: rows.len() as i64,
        broken_at: None,
    }
}
