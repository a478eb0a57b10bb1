//! Stand-in for the out-of-scope "content-hash computation primitive."
//! The differ calls through this trait instead of hashing directly, so a
//! host can swap in a bounded worker pool without touching differ logic.

use sha1::{Digest, Sha1};

/// Well-known SHA-1 of the empty string; used for size-zero files so they
/// never need to be read from disk to compare as "equal."
pub const EMPTY_CONTENT_HASH: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

pub trait ContentHasher: Send + Sync {
    /// Lowercase hex SHA-1 digest of `bytes`.
    fn hash(&self, bytes: &[u8]) -> String;
}

#[derive(Default, Clone, Copy)]
pub struct Sha1Hasher;

impl ContentHasher for Sha1Hasher {
    fn hash(&self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return EMPTY_CONTENT_HASH.to_string();
        }
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_empty_content_to_the_well_known_constant() {
        assert_eq!(Sha1Hasher.hash(&[]), EMPTY_CONTENT_HASH);
    }

    #[test]
    fn hashes_are_lowercase_hex() {
        let digest = Sha1Hasher.hash(b"hello world");
        assert_eq!(digest.len(), 40);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
