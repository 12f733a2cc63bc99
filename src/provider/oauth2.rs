use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::token::CachedToken;
use crate::cache::token_cache::TokenCache;
use crate::config::service::ProviderConfig;
use crate::error::{Error, Result};
use crate::helpers::time::{elapsed_secs, get_instant};
use crate::observability::metrics::get_metrics;
use crate::provider::Refresh;
use crate::resilience::retry::RetrySettings;
use crate::store::{Account, AccountStore};
use crate::utils::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};

/// Token endpoint response.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct TokenGrantResult {
    pub access_token: String,
    /// rotating: must replace the stored one
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrantResult {
    fn validate(self) -> Result<Self> {
        if self.access_token.trim().is_empty() {
            return Err(Error::Decode("token response has an empty access_token".to_owned()));
        }
        if self.expires_in == 0 {
            return Err(Error::Decode("token response has expires_in = 0".to_owned()));
        }
        Ok(self)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }
}

impl fmt::Debug for TokenGrantResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrantResult")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Performs OAuth grants against the provider's token endpoint and
/// persists the outcome: access token to the cache, rotated refresh
/// token to the account store.
#[derive(Clone)]
pub struct TokenRefresher {
    client: Client,
    provider: Arc<ProviderConfig>,
    retry: RetrySettings,
    cache: TokenCache,
    store: Arc<dyn AccountStore>,
}

impl TokenRefresher {
    pub fn new(
        client: Client,
        provider: Arc<ProviderConfig>,
        retry: RetrySettings,
        cache: TokenCache,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        Self { client, provider, retry, cache, store }
    }

    /// `grant_type=refresh_token` for an already linked account.
    pub async fn refresh_account(&self, account: &Account, cancel: &CancellationToken) -> Result<TokenGrantResult> {
        // another poller may have rotated the token since the account list was read
        let refresh_token = self
            .store
            .refresh_token(&account.account_code)
            .await?
            .unwrap_or_else(|| account.refresh_token.to_owned());

        info!(account = %account.account_code, "refreshing token");
        let form = [
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        let grant = self.request_grant(&account.account_code, GRANT_REFRESH_TOKEN, &form, cancel).await?;
        self.persist(&account.account_code, &grant).await?;
        Ok(grant)
    }

    /// `grant_type=authorization_code`: first exchange after the user linked
    /// the bank connection.
    pub async fn exchange_code(
        &self,
        account_code: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrantResult> {
        let redirect_uri = self.provider.redirect_uri.as_deref().ok_or_else(|| {
            Error::Config("provider.redirect_uri is required for the authorization code exchange".to_owned())
        })?;

        info!(account = account_code, "exchanging authorization code");
        let form = [
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        let grant = self.request_grant(account_code, GRANT_AUTHORIZATION_CODE, &form, cancel).await?;
        if grant.refresh_token.is_none() {
            return Err(Error::Decode("authorization code exchange returned no refresh_token".to_owned()));
        }
        self.persist(account_code, &grant).await?;
        Ok(grant)
    }

    async fn request_grant(
        &self,
        account_code: &str,
        grant_type: &str,
        form: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<TokenGrantResult> {
        let metrics = get_metrics().await;
        let start = get_instant();
        let outcome = self
            .retry
            .run_with_retry(cancel, || self.post_token_form(form))
            .await;
        metrics.token_refresh_duration.with_label_values(&[grant_type]).observe(elapsed_secs(start));

        match &outcome {
            Ok(grant) => {
                metrics.token_refreshes.with_label_values(&[grant_type, "ok"]).inc();
                info!(account = account_code, expires_in = grant.expires_in, "token granted");
            }
            Err(e) => {
                metrics.token_refreshes.with_label_values(&[grant_type, e.reason()]).inc();
                error!(account = account_code, error = %e, "token grant failed");
            }
        }
        outcome
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenGrantResult> {
        let response = self
            .client
            .post(&self.provider.token_url)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading token response failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Auth(format!("token endpoint responded {}: {}", status, body)));
        }

        serde_json::from_str::<TokenGrantResult>(&body)?.validate()
    }

    // runs to completion once the grant is in hand: the provider has already
    // rotated the refresh token, dropping it here would lock the account out
    async fn persist(&self, account_code: &str, grant: &TokenGrantResult) -> Result<()> {
        self.cache
            .put(account_code, &CachedToken::new(grant.access_token.to_owned(), grant.ttl()))
            .await?;

        match &grant.refresh_token {
            Some(refresh_token) => self
                .store
                .save_refresh_token(account_code, refresh_token)
                .await
                .inspect_err(|e| {
                    error!(account = account_code, error = %e, "rotated refresh token was not saved");
                }),
            None => {
                warn!(account = account_code, "provider did not rotate the refresh token");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Refresh for TokenRefresher {
    async fn refresh(&self, account: &Account, cancel: &CancellationToken) -> Result<TokenGrantResult> {
        self.refresh_account(account, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_without_lifetime_is_rejected() {
        let grant: TokenGrantResult =
            serde_json::from_str(r#"{"access_token":"tok","expires_in":0,"token_type":"Bearer"}"#).unwrap();
        assert!(matches!(grant.validate(), Err(Error::Decode(_))));
    }

    #[test]
    fn grant_debug_is_redacted() {
        let grant: TokenGrantResult = serde_json::from_str(
            r#"{"access_token":"tok-secret","refresh_token":"rt-secret","expires_in":3600,"token_type":"Bearer","scope":"transactions"}"#,
        )
        .unwrap();
        let rendered = format!("{:?}", grant);
        assert!(!rendered.contains("tok-secret"));
        assert!(!rendered.contains("rt-secret"));
        assert!(rendered.contains("3600"));
    }
}
