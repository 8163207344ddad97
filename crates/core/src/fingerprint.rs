//! Content fingerprint for analysis dedup.

use sha2::{Digest, Sha256};

/// SHA-256 hex of the ordered, whitespace-trimmed thread text.
///
/// Each text is trimmed, the texts are joined with `\n`, and the join is
/// trimmed again. Two threads with identical ordered trimmed texts alias to
/// the same hash; order matters.
#[must_use]
pub fn thread_hash(texts: &[String]) -> String {
    let joined = texts.iter().map(|t| t.trim()).collect::<Vec<_>>().join("\n");
    let mut hasher = Sha256::new();
    hasher.update(joined.trim().as_bytes());
    hex::encode(hasher.finalize())
}
