//! Open Banking provider calls: the OAuth token endpoint and the
//! transactions data API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::settings::SettingsConfig;
use crate::error::{Error, Result};
use crate::store::Account;

pub mod oauth2;
pub mod transactions;

use oauth2::TokenGrantResult;

/// Something that can obtain a fresh access token for an account.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self, account: &Account, cancel: &CancellationToken) -> Result<TokenGrantResult>;
}

/// Shared HTTP client; every request is bounded by `request_timeout_ms`.
pub fn build_client(settings: &SettingsConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(settings.request_timeout_ms))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}
