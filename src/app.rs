//! Wires the components described by a `ServiceConfig`.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::backend::{CacheBackend, MemoryBackend};
use crate::cache::redis_backend::RedisBackend;
use crate::cache::token_cache::TokenCache;
use crate::config::service::{CacheType, ServiceConfig, StoreType};
use crate::error::{Error, Result};
use crate::poller::cycle::Poller;
use crate::poller::publisher::{LogPublisher, Publisher};
use crate::provider::build_client;
use crate::provider::oauth2::TokenRefresher;
use crate::provider::transactions::TransactionFetcher;
use crate::resilience::retry::RetrySettings;
use crate::store::postgres::PgAccountStore;
use crate::store::{AccountStore, MemoryAccountStore};

#[derive(Clone)]
pub struct App {
    pub cache: TokenCache,
    pub store: Arc<dyn AccountStore>,
    pub refresher: Arc<TokenRefresher>,
    pub fetcher: TransactionFetcher,
    pub poller: Poller,
}

impl App {
    /// Connect the configured backends and assemble the pipeline.
    pub async fn build(cfg: &ServiceConfig) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match cfg.cache.cache_type {
            CacheType::Redis => {
                let url = cfg.cache.url.as_deref()
                    .ok_or_else(|| Error::Config("cache.url is required for cache type 'redis'".to_owned()))?;
                Arc::new(RedisBackend::connect(url).await?)
            }
            CacheType::Memory => Arc::new(MemoryBackend::new()),
        };

        let store: Arc<dyn AccountStore> = match cfg.store.store_type {
            StoreType::Postgres => {
                let url = cfg.store.url.as_deref()
                    .ok_or_else(|| Error::Config("store.url is required for store type 'postgres'".to_owned()))?;
                Arc::new(PgAccountStore::connect(url, cfg.store.max_connections).await?)
            }
            StoreType::Memory => Arc::new(MemoryAccountStore::new(cfg.store.accounts.clone())),
        };

        Self::with_backends(cfg, backend, store, Arc::new(LogPublisher))
    }

    /// Assemble the pipeline on already connected backends.
    pub fn with_backends(
        cfg: &ServiceConfig,
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn AccountStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self> {
        let settings = &cfg.settings;
        let client = build_client(settings)?;
        let provider = Arc::new(cfg.provider.clone());
        let retry = RetrySettings::from(&settings.retry);

        let cache = TokenCache::new(
            backend,
            cfg.cache.key_prefix.to_owned(),
            Duration::from_millis(settings.request_timeout_ms),
            settings.refresh_lock.clone(),
        );
        let refresher = Arc::new(TokenRefresher::new(
            client.clone(),
            provider.clone(),
            retry.clone(),
            cache.clone(),
            store.clone(),
        ));
        let fetcher = TransactionFetcher::new(client, provider, retry);
        let poller = Poller::new(store.clone(), cache.clone(), refresher.clone(), fetcher.clone(), publisher);

        Ok(Self { cache, store, refresher, fetcher, poller })
    }
}
