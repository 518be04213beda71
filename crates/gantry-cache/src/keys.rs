//! Cache key derivation.
//!
//! Keys compose deterministically as `<os>-<purpose>-<digest>` so a job
//! whose dependencies are unchanged between runs gets an exact hit, and
//! a changed lock descriptor still finds the previous entry through the
//! `<os>-<purpose>-` prefix.

use sha2::{Digest, Sha256};

/// Digest of a dependency lock descriptor's contents.
pub fn lockfile_digest(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Compose a cache key. Identical inputs always produce identical keys.
pub fn derive_key(os: &str, purpose: &str, lockfile_digest: &str) -> String {
    format!("{}-{}-{}", os, purpose, lockfile_digest)
}

/// Prefix shared by every key for an (os, purpose) pair.
pub fn restore_prefix(os: &str, purpose: &str) -> String {
    format!("{}-{}-", os, purpose)
}

/// Check if a key matches a prefix pattern.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let digest = lockfile_digest(b"serde = \"1.0\"\n");
        let a = derive_key("linux", "cargo", &digest);
        let b = derive_key("linux", "cargo", &digest);
        assert_eq!(a, b);
        assert!(a.starts_with("linux-cargo-"));
    }

    #[test]
    fn test_different_lockfiles_differ() {
        let a = derive_key("linux", "cargo", &lockfile_digest(b"serde = \"1.0\""));
        let b = derive_key("linux", "cargo", &lockfile_digest(b"serde = \"1.1\""));
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_covers_derived_keys() {
        let prefix = restore_prefix("macos", "cargo");
        let key = derive_key("macos", "cargo", &lockfile_digest(b"x"));
        assert!(matches_prefix(&key, &prefix));
        assert!(!matches_prefix(&key, &restore_prefix("linux", "cargo")));
    }
}
