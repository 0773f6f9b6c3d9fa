//! Static API key generation and hashing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a prefixed API key carrying 32 bytes of OS entropy
/// (43 base64url characters after the prefix).
///
/// The raw key is shown to the caller exactly once; only
/// [`hash_key`] output is persisted.
pub fn generate_key(prefix: &str) -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{prefix}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a short random identifier (`agt_…`, `adm_…`).
pub fn random_id(prefix: &str, entropy_bytes: usize) -> String {
    let mut bytes = vec![0u8; entropy_bytes];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{prefix}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 of the raw key, lowercase hex. This is the stored credential.
pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 12 characters of the raw key, stored so operators can tell keys
/// apart without ever seeing them again.
pub fn key_prefix(raw: &str) -> String {
    raw.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_prefix_and_entropy() {
        let key = generate_key("agk_");
        assert!(key.starts_with("agk_"));
        // 32 bytes -> 43 unpadded base64url chars.
        assert_eq!(key.len(), 4 + 43);
        assert_ne!(generate_key("agk_"), generate_key("agk_"));
    }

    #[test]
    fn hash_is_sha256_hex() {
        let hash = hash_key("agk_test");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_key("agk_test"));
        assert_ne!(hash, hash_key("agk_test2"));
    }

    #[test]
    fn prefix_is_first_twelve_chars() {
        let key = "agk_0123456789abcdef";
        assert_eq!(key_prefix(key), "agk_01234567");
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn random_ids_are_unique() {
        let a = random_id("agt_", 12);
        let b = random_id("agt_", 12);
        assert!(a.starts_with("agt_"));
        assert_ne!(a, b);
    }
}
