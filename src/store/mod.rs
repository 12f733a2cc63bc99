//! Account store: where linked bank connections and their rotating
//! refresh tokens live.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

pub mod postgres;

/// A linked bank connection.
#[derive(Clone, Deserialize, sqlx::FromRow, PartialEq, Eq)]
pub struct Account {
    pub account_code: String,
    pub refresh_token: String,
}

impl Account {
    pub fn new(account_code: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { account_code: account_code.into(), refresh_token: refresh_token.into() }
    }
}

// refresh tokens never reach the logs
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_code", &self.account_code)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All linked accounts, read fresh on every call.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Current refresh token for one account, if the account is known.
    async fn refresh_token(&self, account_code: &str) -> Result<Option<String>>;

    /// Insert or overwrite the refresh token of an account.
    async fn save_refresh_token(&self, account_code: &str, refresh_token: &str) -> Result<()>;
}

/// Process-local store, seeded from config or tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    // account_code -> refresh_token, insertion order kept separately
    inner: Arc<RwLock<(Vec<String>, HashMap<String, String>)>>,
}

impl MemoryAccountStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        let mut order = Vec::with_capacity(accounts.len());
        let mut tokens = HashMap::with_capacity(accounts.len());
        for account in accounts {
            if tokens.insert(account.account_code.clone(), account.refresh_token).is_none() {
                order.push(account.account_code);
            }
        }
        Self { inner: Arc::new(RwLock::new((order, tokens))) }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let guard = self.inner.read().await;
        let (order, tokens) = &*guard;
        order
            .iter()
            .map(|code| {
                tokens
                    .get(code)
                    .map(|token| Account::new(code.to_owned(), token.to_owned()))
                    .ok_or_else(|| Error::Store(format!("account '{}' has no refresh token", code)))
            })
            .collect()
    }

    async fn refresh_token(&self, account_code: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.1.get(account_code).cloned())
    }

    async fn save_refresh_token(&self, account_code: &str, refresh_token: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let (order, tokens) = &mut *guard;
        if tokens.insert(account_code.to_owned(), refresh_token.to_owned()).is_none() {
            order.push(account_code.to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_keeps_order_and_overwrites() {
        let store = MemoryAccountStore::new(vec![
            Account::new("acc-1", "rt-1"),
            Account::new("acc-2", "rt-2"),
        ]);

        store.save_refresh_token("acc-1", "rt-1b").await.unwrap();
        store.save_refresh_token("acc-3", "rt-3").await.unwrap();

        let accounts = store.list_accounts().await.unwrap();
        let codes: Vec<&str> = accounts.iter().map(|a| a.account_code.as_str()).collect();
        assert_eq!(codes, vec!["acc-1", "acc-2", "acc-3"]);
        assert_eq!(store.refresh_token("acc-1").await.unwrap().as_deref(), Some("rt-1b"));
        assert_eq!(store.refresh_token("missing").await.unwrap(), None);
    }

    #[test]
    fn debug_hides_refresh_token() {
        let rendered = format!("{:?}", Account::new("acc-1", "super-secret"));
        assert!(rendered.contains("acc-1"));
        assert!(!rendered.contains("super-secret"));
    }
}
