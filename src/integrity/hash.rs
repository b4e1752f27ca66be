//! Filing digests.
//!
//! A filing's digest covers its content bytes plus a canonical
//! serialization of the metadata snapshot. Any metadata change yields a
//! different digest, which is what makes the ledger comparison meaningful.

use sha2::{Digest, Sha256};

use crate::models::HashMetadata;

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonical metadata serialization: fixed key order, one `key=value` line
/// per field, RFC 3339 timestamps.
fn canonical_metadata(meta: &HashMetadata) -> String {
    format!(
        "case_number={}\ndocument_kind={}\nfiled_at={}\nfiler_id={}\n",
        meta.case_number,
        meta.document_kind.as_str(),
        meta.filed_at.to_rfc3339(),
        meta.filer_id,
    )
}

/// Deterministic SHA-256 over content + canonical metadata, rendered as
/// lowercase hex.
pub fn compute_filing_hash(content: &[u8], meta: &HashMetadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(canonical_metadata(meta).as_bytes());
    hex(&hasher.finalize())
}

/// SHA-256 of content alone; intake uses this for duplicate detection.
pub fn content_digest(content: &[u8]) -> String {
    hex(&Sha256::digest(content))
}
