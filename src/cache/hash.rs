//! Content hashing utilities for cache keys.

use sha2::{Digest, Sha256};

/// Compute the SHA256 hash of a dataset query body.
///
/// Returns a 64-character lowercase hexadecimal string. Editing the query
/// in any way changes the hash, which is what invalidates cached metadata.
pub fn hash_query(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    format!("{:x}", hasher.finalize())
}
