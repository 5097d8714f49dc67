//! Content digest helpers
//!
//! All checksums are SHA256, rendered as `sha256:<hex>`. Comparison is
//! tolerant of the `sha256:` / `sha256-` prefixes and casing so that
//! caller-supplied and upstream-supplied digests in either form match.

use sha2::{Digest, Sha256};

/// Compute the SHA256 digest of data
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("sha256:{}", hex::encode(result))
}

/// Check if two digests match (supports various formats)
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}

fn normalize(digest: &str) -> String {
    digest
        .trim()
        .to_lowercase()
        .replace("sha256:", "")
        .replace("sha256-", "")
}
