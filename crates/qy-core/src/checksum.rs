//! SHA-256 content hashing for change detection.

use sha2::{Digest, Sha256};

/// Length of the truncated hex digest stored per file.
const HASH_LEN: usize = 16;

/// Compute a short content hash of raw file bytes.
///
/// SHA-256 truncated to 16 hex chars: plenty for change detection, which is
/// the only use. This is not an integrity check.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_LEN].to_string()
}
