//! PostgreSQL-backed account store.
//!
//! Reads the `"Rounder".users` table; the schema itself is managed elsewhere.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{Account, AccountStore};

pub struct PgAccountStore {
    pub pool: PgPool,
}

impl PgAccountStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::Store(format!("unable to connect to database: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let accounts: Vec<Account> = sqlx::query_as(
            r#"SELECT account_code, refresh_token FROM "Rounder".users"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("query to database failed: {e}")))?;

        debug!("loaded {} accounts", accounts.len());
        Ok(accounts)
    }

    async fn refresh_token(&self, account_code: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT refresh_token FROM "Rounder".users WHERE account_code = $1"#,
        )
        .bind(account_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token,)| token))
    }

    async fn save_refresh_token(&self, account_code: &str, refresh_token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO "Rounder".users (account_code, refresh_token)
            VALUES ($1, $2)
            ON CONFLICT (account_code)
            DO UPDATE SET refresh_token = EXCLUDED.refresh_token
            "#,
        )
        .bind(account_code)
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
