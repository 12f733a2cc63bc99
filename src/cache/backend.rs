use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;

/// Key/value store with backend-enforced expiry.
///
/// Every call is a round-trip; callers must not layer an in-process cache
/// on top because the backend is shared between pollers.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `GET key`; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `SET key value EX ttl`, overwriting any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// `SET key owner NX PX ttl`; true when the lock was taken.
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Release the lock only if `owner` still holds it.
    async fn unlock(&self, key: &str, owner: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process backend driven by the tokio clock.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let map = self.inner.read().await;
        Ok(map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.to_owned()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut map = self.inner.write().await;
        let now = Instant::now();
        map.retain(|_, entry| entry.is_live(now));
        map.insert(key.to_owned(), Entry { value: value.to_owned(), expires_at: now + ttl });
        Ok(())
    }

    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.inner.write().await;
        let now = Instant::now();
        if map.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        map.insert(key.to_owned(), Entry { value: owner.to_owned(), expires_at: now + ttl });
        Ok(true)
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        let mut map = self.inner.write().await;
        if map.get(key).is_some_and(|entry| entry.value == owner) {
            map.remove(key);
        }
        Ok(())
    }
}
