//! Deterministic content hash over a whole model.

use serde::{Deserialize, Serialize};

/// Aggregate digest of every component in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Combine per-component digests.
    ///
    /// Digests are sorted before hashing, so the result does not depend on the
    /// order in which components are visited.
    pub fn aggregate(digests: impl IntoIterator<Item = blake3::Hash>) -> Self {
        let mut sorted: Vec<[u8; 32]> = digests.into_iter().map(|h| *h.as_bytes()).collect();
        sorted.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&(sorted.len() as u64).to_le_bytes());
        for digest in &sorted {
            hasher.update(digest);
        }
        ContentHash(*hasher.finalize().as_bytes())
    }

    /// Hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = blake3::hash(b"a");
        let b = blake3::hash(b"b");

        assert_eq!(
            ContentHash::aggregate([a, b]),
            ContentHash::aggregate([b, a])
        );
        assert_ne!(ContentHash::aggregate([a]), ContentHash::aggregate([a, b]));
    }

    #[test]
    fn test_hex_display() {
        let hash = ContentHash::aggregate([]);
        assert_eq!(hash.to_string().len(), 64);
    }
}
