use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::token_cache::TokenCache;
use crate::error::{Error, Result};
use crate::helpers::time::{elapsed_secs, get_instant, next_tick_rfc3339};
use crate::observability::metrics::get_metrics;
use crate::poller::publisher::Publisher;
use crate::provider::transactions::TransactionFetcher;
use crate::provider::Refresh;
use crate::store::{Account, AccountStore};

/// An account skipped in a cycle, and why.
#[derive(Debug)]
pub struct AccountFailure {
    pub account_code: String,
    pub error: Error,
}

/// Outcome of one pass over all accounts.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub published: usize,
    pub failures: Vec<AccountFailure>,
}

/// Walks every account: token, transactions, publish.
#[derive(Clone)]
pub struct Poller {
    store: Arc<dyn AccountStore>,
    cache: TokenCache,
    refresher: Arc<dyn Refresh>,
    fetcher: TransactionFetcher,
    publisher: Arc<dyn Publisher>,
}

impl Poller {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: TokenCache,
        refresher: Arc<dyn Refresh>,
        fetcher: TransactionFetcher,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self { store, cache, refresher, fetcher, publisher }
    }

    /// Repeat cycles every `interval` until cancelled. A store error ends
    /// the loop; other per-account errors never do.
    pub async fn run(&self, interval: Duration, cancel: &CancellationToken) -> Result<()> {
        loop {
            match self.run_cycle(cancel).await {
                Ok(report) => info!(
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    failed = report.failures.len(),
                    published = report.published,
                    "poll cycle finished"
                ),
                Err(Error::Cancelled) => break,
                Err(e) => {
                    error!(error = %e, "poll cycle aborted");
                    return Err(e);
                }
            }

            info!(
                "sleep interval {} seconds, next cycle start at {}",
                interval.as_secs(),
                next_tick_rfc3339(interval)
            );
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = cancel.cancelled() => break,
            }
        }
        info!("poller stopped");
        Ok(())
    }

    /// One pass over all accounts.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let metrics = get_metrics().await;
        let start = get_instant();
        info!("poll cycle start");

        let accounts = self.store.list_accounts().await?;
        metrics.accounts_last_cycle.set(accounts.len() as i64);

        let mut report = CycleReport::default();
        for account in &accounts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.attempted += 1;
            match self.process_account(account, cancel).await {
                Ok(published) => {
                    report.succeeded += 1;
                    report.published += published;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                // stop before another refresh rotates a token the store cannot keep
                Err(e @ Error::Store(_)) => {
                    error!(account = %account.account_code, error = %e, "account store failed, aborting cycle");
                    metrics.account_failures.with_label_values(&[e.reason()]).inc();
                    return Err(e);
                }
                Err(e) => {
                    error!(account = %account.account_code, reason = e.reason(), error = %e, "account skipped this cycle");
                    metrics.account_failures.with_label_values(&[e.reason()]).inc();
                    report.failures.push(AccountFailure {
                        account_code: account.account_code.to_owned(),
                        error: e,
                    });
                }
            }
        }

        metrics.poll_cycles.inc();
        metrics.poll_cycle_duration.observe(elapsed_secs(start));
        Ok(report)
    }

    async fn process_account(&self, account: &Account, cancel: &CancellationToken) -> Result<usize> {
        let token = self
            .cache
            .get_or_refresh(account, self.refresher.as_ref(), cancel)
            .await?;

        let transactions = match self.fetcher.fetch(&account.account_code, &token, cancel).await {
            Err(Error::Auth(reason)) => {
                // treat the rejected token as a miss, once
                warn!(account = %account.account_code, reason = %reason, "data api rejected token");
                let token = self
                    .cache
                    .refresh_stale(account, &token, self.refresher.as_ref(), cancel)
                    .await?;
                self.fetcher.fetch(&account.account_code, &token, cancel).await?
            }
            outcome => outcome?,
        };

        self.publisher.publish(&account.account_code, &transactions).await?;
        Ok(transactions.len())
    }
}
