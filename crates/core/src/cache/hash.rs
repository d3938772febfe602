//! Content-addressed identifiers.

use sha2::{Digest, Sha256};

/// Stable id of a catalog entry: SHA-256 of `source_id`, a newline, and the
/// entry path within the source.
pub fn compute_catalog_entry_id(source_id: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of `content`, hex encoded.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
