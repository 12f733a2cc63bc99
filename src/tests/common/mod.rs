// tests/common/mod.rs
pub use serde_json::json;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::MockServer;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::cache::backend::{CacheBackend, MemoryBackend};
use crate::cache::token::CachedToken;
use crate::cache::token_cache::TokenCache;
use crate::config::service::ServiceConfig;
use crate::config::settings::RefreshLockConfig;
use crate::error::Result;
use crate::poller::publisher::Publisher;
use crate::provider::oauth2::TokenGrantResult;
use crate::provider::transactions::Transaction;
use crate::provider::Refresh;
use crate::store::{Account, MemoryAccountStore};

pub const TOKEN_PATH: &str = "/connect/token";
pub const DATA_PATH: &str = "/data";

/// Config pointing both provider endpoints at `server`, fast retries.
pub fn service_config(server: &MockServer) -> ServiceConfig {
    service_config_with_token_url(&server.url(TOKEN_PATH), &server.url(DATA_PATH))
}

pub fn service_config_with_token_url(token_url: &str, data_api_url: &str) -> ServiceConfig {
    let yaml = format!(
        r#"
settings:
  request_timeout_ms: 2000
  retry:
    attempts: 2
    base_delay_ms: 10
    max_delay_ms: 20
  refresh_lock:
    ttl_ms: 10000
    wait_ms: 2000
provider:
  token_url: {token_url}
  data_api_url: {data_api_url}
  api_version: v1
  client_id: test-client
  client_secret: test-secret
  redirect_uri: https://console.example.com/redirect
cache:
  type: memory
store:
  type: memory
"#
    );
    serde_yaml::from_str(&yaml).expect("test config")
}

/// Pipeline on in-memory backends; the cache backend records every write.
pub struct TestApp {
    pub app: App,
    pub backend: RecordingBackend,
    pub store: MemoryAccountStore,
    pub publisher: RecordingPublisher,
}

pub fn build_app(cfg: &ServiceConfig, accounts: Vec<Account>) -> TestApp {
    let backend = RecordingBackend::default();
    let store = MemoryAccountStore::new(accounts);
    let publisher = RecordingPublisher::default();
    let app = App::with_backends(
        cfg,
        Arc::new(backend.clone()),
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
    )
    .expect("app");
    TestApp { app, backend, store, publisher }
}

pub fn token_cache(backend: Arc<dyn CacheBackend>) -> TokenCache {
    TokenCache::new(
        backend,
        "test:token:".to_owned(),
        Duration::from_secs(1),
        RefreshLockConfig { ttl_ms: 5000, wait_ms: 2000 },
    )
}

pub fn grant_body(access_token: &str, refresh_token: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_in": expires_in,
        "token_type": "Bearer",
        "scope": "info accounts balance transactions offline_access"
    })
}

pub fn transaction_body(amount: f64, category: &str, description: &str) -> serde_json::Value {
    json!({
        "timestamp": "2024-03-01T10:00:00+00:00",
        "description": description,
        "transaction_type": if amount < 0.0 { "DEBIT" } else { "CREDIT" },
        "transaction_category": category,
        "amount": amount,
        "currency": "GBP",
        "transaction_id": "ignored"
    })
}

/// MemoryBackend that remembers every `set_ex`.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    pub writes: Arc<Mutex<Vec<(String, String, Duration)>>>,
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.writes.lock().await.push((key.to_owned(), value.to_owned(), ttl));
        self.inner.set_ex(key, value, ttl).await
    }

    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.inner.try_lock(key, owner, ttl).await
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        self.inner.unlock(key, owner).await
    }
}

/// Publisher that keeps what it was given.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub published: Arc<Mutex<Vec<(String, Vec<Transaction>)>>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, account_code: &str, transactions: &[Transaction]) -> Result<()> {
        self.published
            .lock()
            .await
            .push((account_code.to_owned(), transactions.to_vec()));
        Ok(())
    }
}

/// Refresher that counts calls and writes `tok-<n>` into the cache after
/// a delay, standing in for the provider round-trip.
pub struct CountingRefresher {
    pub cache: TokenCache,
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl CountingRefresher {
    pub fn new(cache: TokenCache, delay: Duration) -> Self {
        Self { cache, calls: AtomicUsize::new(0), delay }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresh for CountingRefresher {
    async fn refresh(&self, account: &Account, _cancel: &CancellationToken) -> Result<TokenGrantResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        let access_token = format!("tok-{}", n);
        self.cache
            .put(&account.account_code, &CachedToken::new(access_token.to_owned(), Duration::from_secs(3600)))
            .await?;
        Ok(TokenGrantResult {
            access_token,
            refresh_token: Some(format!("rt-{}", n)),
            token_type: "Bearer".to_owned(),
            expires_in: 3600,
            scope: None,
        })
    }
}
