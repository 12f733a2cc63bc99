use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::backend::CacheBackend;
use crate::cache::token::{lock_key, token_key, CachedToken};
use crate::config::settings::RefreshLockConfig;
use crate::error::{Error, Result};
use crate::observability::metrics::get_metrics;
use crate::provider::Refresh;
use crate::store::Account;
use crate::utils::constants::LOCK_POLL_INTERVAL_MS;

type Flight = Arc<tokio::sync::Mutex<()>>;

/// Cache-aside token cache: account_code -> access token.
///
/// Reads and writes always go to the backend. Refreshes are coalesced
/// per account, locally through an async mutex and across processes
/// through a backend lock.
#[derive(Clone)]
pub struct TokenCache {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    op_timeout: Duration,
    lock: RefreshLockConfig,
    flights: Arc<Mutex<HashMap<String, Flight>>>,
}

impl TokenCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        key_prefix: String,
        op_timeout: Duration,
        lock: RefreshLockConfig,
    ) -> Self {
        Self {
            backend,
            key_prefix,
            op_timeout,
            lock,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Token for the account if present and not expired.
    pub async fn get(&self, account_code: &str) -> Result<Option<String>> {
        self.get_by_key(&token_key(&self.key_prefix, account_code)).await
    }

    /// Overwrite the account's token, expiring after `token.ttl`.
    pub async fn put(&self, account_code: &str, token: &CachedToken) -> Result<()> {
        if token.ttl.is_zero() {
            return Err(Error::Cache(format!(
                "refusing to cache token for '{}' with zero ttl",
                account_code
            )));
        }
        let key = token_key(&self.key_prefix, account_code);
        self.with_timeout(self.backend.set_ex(&key, &token.value, token.ttl)).await?;
        debug!(account = account_code, ttl_seconds = token.ttl.as_secs(), "token cached");
        Ok(())
    }

    /// Cache-aside lookup: on miss the account is refreshed once, however
    /// many callers are asking at the same time.
    pub async fn get_or_refresh<R: Refresh + ?Sized>(
        &self,
        account: &Account,
        refresher: &R,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let metrics = get_metrics().await;
        let key = token_key(&self.key_prefix, &account.account_code);
        if let Some(token) = self.get_by_key(&key).await? {
            metrics.token_cache_lookups.with_label_values(&["hit"]).inc();
            return Ok(token);
        }
        metrics.token_cache_lookups.with_label_values(&["miss"]).inc();
        info!(account = %account.account_code, "no cached token, refreshing");
        self.refresh_single_flight(account, &key, None, refresher, cancel).await
    }

    /// Refresh after the data API rejected `stale`. Returns the newer token
    /// directly when another caller has already replaced it.
    pub async fn refresh_stale<R: Refresh + ?Sized>(
        &self,
        account: &Account,
        stale: &str,
        refresher: &R,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let key = token_key(&self.key_prefix, &account.account_code);
        info!(account = %account.account_code, "cached token rejected, refreshing");
        self.refresh_single_flight(account, &key, Some(stale), refresher, cancel).await
    }

    async fn refresh_single_flight<R: Refresh + ?Sized>(
        &self,
        account: &Account,
        key: &str,
        stale: Option<&str>,
        refresher: &R,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let flight = self.flight(key);
        let _local = tokio::select! {
            guard = flight.lock_owned() => guard,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        // the previous holder may have refreshed already
        if let Some(token) = self.fresh_token(key, stale).await? {
            debug!(account = %account.account_code, "token refreshed by concurrent caller");
            return Ok(token);
        }

        let owner = Uuid::new_v4().to_string();
        let lock_key = lock_key(key);
        if let Some(token) = self
            .acquire_backend_lock(account, key, &lock_key, &owner, stale, cancel)
            .await?
        {
            // another poller finished the refresh while we waited
            return Ok(token);
        }

        let result: Result<String> = async {
            if let Some(token) = self.fresh_token(key, stale).await? {
                return Ok(token);
            }
            refresher.refresh(account, cancel).await.map(|grant| grant.access_token)
        }
        .await;

        if let Err(e) = self.with_timeout(self.backend.unlock(&lock_key, &owner)).await {
            warn!(account = %account.account_code, error = %e, "failed to release refresh lock");
        }
        result
    }

    /// Take the backend lock. `Ok(Some(token))` means another process
    /// refreshed while we were waiting and the lock is not needed.
    async fn acquire_backend_lock(
        &self,
        account: &Account,
        key: &str,
        lock_key: &str,
        owner: &str,
        stale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let lock_ttl = Duration::from_millis(self.lock.ttl_ms);
        let deadline = Instant::now() + Duration::from_millis(self.lock.wait_ms);
        loop {
            if self.with_timeout(self.backend.try_lock(lock_key, owner, lock_ttl)).await? {
                return Ok(None);
            }
            debug!(account = %account.account_code, "refresh in flight elsewhere, waiting");
            tokio::select! {
                _ = sleep(Duration::from_millis(LOCK_POLL_INTERVAL_MS)) => {},
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
            if let Some(token) = self.fresh_token(key, stale).await? {
                return Ok(Some(token));
            }
            if Instant::now() >= deadline {
                return Err(Error::LockTimeout(account.account_code.to_owned()));
            }
        }
    }

    async fn fresh_token(&self, key: &str, stale: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .get_by_key(key)
            .await?
            .filter(|token| stale != Some(token.as_str())))
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<String>> {
        self.with_timeout(self.backend.get(key)).await
    }

    fn flight(&self, key: &str) -> Flight {
        let mut flights = self.flights.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // drop flights nobody is holding or waiting on
        flights.retain(|_, flight| Arc::strong_count(flight) > 1);
        flights.entry(key.to_owned()).or_default().clone()
    }

    async fn with_timeout<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        timeout(self.op_timeout, op).await.map_err(|_| {
            Error::Cache(format!("cache round-trip timed out after {:?}", self.op_timeout))
        })?
    }
}
