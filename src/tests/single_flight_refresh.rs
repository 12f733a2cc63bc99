// Concurrent cache misses for one account must reach the provider once,
// whether the callers share a TokenCache or only the backend.

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::task::JoinSet;
    use tokio_util::sync::CancellationToken;

    use crate::cache::backend::{CacheBackend, MemoryBackend};
    use crate::cache::token::CachedToken;
    use crate::error::Error;
    use crate::store::Account;
    use crate::tests::common::{token_cache, CountingRefresher};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_refresh_once() {
        let cache = token_cache(Arc::new(MemoryBackend::new()));
        let refresher = Arc::new(CountingRefresher::new(cache.clone(), Duration::from_millis(50)));
        let account = Account::new("acc-2", "rt-2");

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let refresher = refresher.clone();
            let account = account.clone();
            tasks.spawn(async move {
                cache
                    .get_or_refresh(&account, refresher.as_ref(), &CancellationToken::new())
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "tok-1");
        }
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pollers_sharing_only_the_backend_refresh_once() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        // two processes: separate TokenCache, same backend
        let cache_a = token_cache(backend.clone());
        let cache_b = token_cache(backend);
        let refresher = Arc::new(CountingRefresher::new(cache_a.clone(), Duration::from_millis(150)));
        let account = Account::new("acc-2", "rt-2");

        let mut tasks = JoinSet::new();
        for i in 0..8 {
            let cache = if i % 2 == 0 { cache_a.clone() } else { cache_b.clone() };
            let refresher = refresher.clone();
            let account = account.clone();
            tasks.spawn(async move {
                cache
                    .get_or_refresh(&account, refresher.as_ref(), &CancellationToken::new())
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "tok-1");
        }
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn cached_token_skips_refresh() {
        let cache = token_cache(Arc::new(MemoryBackend::new()));
        let refresher = CountingRefresher::new(cache.clone(), Duration::ZERO);
        let account = Account::new("acc-1", "rt-1");
        cache.put("acc-1", &CachedToken::new("tok-A".into(), Duration::from_secs(600))).await.unwrap();

        let token = cache.get_or_refresh(&account, &refresher, &CancellationToken::new()).await.unwrap();

        assert_eq!(token, "tok-A");
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn stale_refresh_is_skipped_when_token_already_replaced() {
        let cache = token_cache(Arc::new(MemoryBackend::new()));
        let refresher = CountingRefresher::new(cache.clone(), Duration::ZERO);
        let account = Account::new("acc-5", "rt-5");
        let cancel = CancellationToken::new();
        cache.put("acc-5", &CachedToken::new("tok-new".into(), Duration::from_secs(600))).await.unwrap();

        // someone else already replaced tok-old
        let token = cache.refresh_stale(&account, "tok-old", &refresher, &cancel).await.unwrap();
        assert_eq!(token, "tok-new");
        assert_eq!(refresher.calls(), 0);

        // the current token itself was rejected
        let token = cache.refresh_stale(&account, "tok-new", &refresher, &cancel).await.unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_held_elsewhere_times_out_without_refreshing() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = token_cache(backend.clone());
        let refresher = CountingRefresher::new(cache.clone(), Duration::ZERO);
        let account = Account::new("acc-2", "rt-2");

        // a crashed poller left its lock behind
        let key = crate::cache::token::token_key("test:token:", "acc-2");
        let lock = crate::cache::token::lock_key(&key);
        assert!(backend.try_lock(&lock, "other", Duration::from_secs(60)).await.unwrap());

        let err = cache
            .get_or_refresh(&account, &refresher, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LockTimeout(ref code) if code == "acc-2"));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_gives_up() {
        let cache = token_cache(Arc::new(MemoryBackend::new()));
        let refresher = Arc::new(CountingRefresher::new(cache.clone(), Duration::from_secs(30)));
        let account = Account::new("acc-2", "rt-2");

        let first = {
            let cache = cache.clone();
            let refresher = refresher.clone();
            let account = account.clone();
            tokio::spawn(async move {
                cache.get_or_refresh(&account, refresher.as_ref(), &CancellationToken::new()).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cache.get_or_refresh(&account, refresher.as_ref(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        first.abort();
    }
}
