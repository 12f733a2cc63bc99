use std::time::Duration;

use sha2::{Digest, Sha256};

/// An access token as it is written to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    /// remaining lifetime reported by the provider (`expires_in`)
    pub ttl: Duration,
}

impl CachedToken {
    pub fn new(value: String, ttl: Duration) -> Self {
        Self { value, ttl }
    }
}

/// Cache key for an account: prefix + hex(sha256(account_code)).
///
/// The raw account code never reaches the cache backend.
pub fn token_key(prefix: &str, account_code: &str) -> String {
    format!("{}{:x}", prefix, Sha256::digest(account_code.as_bytes()))
}

/// Key of the backend lock guarding a refresh for the same account.
pub fn lock_key(token_key: &str) -> String {
    format!("{}:lock", token_key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn token_key_is_deterministic_and_hides_account_code() {
        let a = token_key("rounder:token:", "acc-1");
        let b = token_key("rounder:token:", "acc-1");
        assert_eq!(a, b);
        assert!(a.starts_with("rounder:token:"));
        assert!(!a.contains("acc-1"));
        // 32 byte digest, hex encoded
        assert_eq!(a.len(), "rounder:token:".len() + 64);
    }

    #[test]
    fn token_key_does_not_collide_for_test_accounts() {
        let codes = ["acc-1", "acc-2", "acc-3", "ACC-1", "acc-1 ", "", "acc-10", "acc-01"];
        let keys: HashSet<String> = codes.iter().map(|c| token_key("p:", c)).collect();
        assert_eq!(keys.len(), codes.len());
    }

    #[test]
    fn lock_key_differs_from_token_key() {
        let key = token_key("p:", "acc-1");
        assert_ne!(lock_key(&key), key);
    }
}
