use std::sync::Arc;

use http::header::{ACCEPT, AUTHORIZATION};
use http::StatusCode;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::service::ProviderConfig;
use crate::error::{Error, Result};
use crate::helpers::time::{elapsed_secs, get_instant};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::utils::constants::CATEGORY_PURCHASE;

/// One booked transaction as reported by the data API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub timestamp: String,
    pub description: String,
    #[serde(rename = "transaction_type")]
    pub kind: String,
    #[serde(rename = "transaction_category")]
    pub category: String,
    /// negative for money leaving the account
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    results: Vec<Transaction>,
    #[serde(default)]
    status: Option<String>,
    /// present when the provider paginates; not followed
    #[serde(default)]
    next: Option<String>,
}

/// Outgoing purchase debits are the only spend eligible for round-ups;
/// refunds, transfers and incoming credits are dropped.
pub fn is_round_up_eligible(transaction: &Transaction) -> bool {
    transaction.amount < 0.0 && transaction.category == CATEGORY_PURCHASE
}

/// Reads an account's transactions with a bearer token. Holds no state
/// besides the shared HTTP client.
#[derive(Clone)]
pub struct TransactionFetcher {
    client: Client,
    provider: Arc<ProviderConfig>,
    retry: RetrySettings,
}

impl TransactionFetcher {
    pub fn new(client: Client, provider: Arc<ProviderConfig>, retry: RetrySettings) -> Self {
        Self { client, provider, retry }
    }

    /// Round-up eligible transactions of the account.
    pub async fn fetch(&self, account_code: &str, token: &str, cancel: &CancellationToken) -> Result<Vec<Transaction>> {
        let metrics = get_metrics().await;
        let start = get_instant();
        let url = self.transactions_url(account_code)?;

        let outcome = self
            .retry
            .run_with_retry(cancel, || self.get_transactions(url.clone(), token))
            .await;
        metrics.transactions_fetch_duration.observe(elapsed_secs(start));

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                metrics.transactions_fetches.with_label_values(&[e.reason()]).inc();
                return Err(e);
            }
        };
        metrics.transactions_fetches.with_label_values(&["ok"]).inc();

        if response.next.as_deref().is_some_and(|next| !next.is_empty()) {
            warn!(account = account_code, "transactions response has further pages, only the first is read");
        }

        let total = response.results.len();
        let kept: Vec<Transaction> = response
            .results
            .into_iter()
            .filter(is_round_up_eligible)
            .collect();
        metrics.transactions_kept.inc_by(kept.len() as u64);
        debug!(
            account = account_code,
            status = response.status.as_deref().unwrap_or_default(),
            total,
            kept = kept.len(),
            "transactions filtered"
        );
        Ok(kept)
    }

    /// `{data_api_url}/{api_version}/accounts/{account_code}/transactions`
    pub fn transactions_url(&self, account_code: &str) -> Result<Url> {
        let mut url = Url::parse(&self.provider.data_api_url)
            .map_err(|e| Error::Config(format!("provider.data_api_url is not a valid url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config("provider.data_api_url cannot be a base url".to_owned()))?
            .pop_if_empty()
            .extend([self.provider.api_version.as_str(), "accounts", account_code, "transactions"]);
        Ok(url)
    }

    async fn get_transactions(&self, url: Url, token: &str) -> Result<TransactionsResponse> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("transactions request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading transactions response failed: {e}")))?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Auth(format!("transactions endpoint responded {}", status)))
            }
            s if s.is_success() => Ok(serde_json::from_str(&body)?),
            s => Err(Error::Upstream { status: s.as_u16(), body }),
        }
    }
}
