//! Shared constants and invariants

pub const APPLICATION_NAME: &str = "rounder";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_REFRESH_LOCK_TTL_MS: u64 = 30_000;
pub const DEFAULT_REFRESH_LOCK_WAIT_MS: u64 = 10_000;
pub const DEFAULT_STORE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;

// TrueLayer sandbox
pub const DEFAULT_TOKEN_URL: &str = "https://auth.truelayer-sandbox.com/connect/token";
pub const DEFAULT_DATA_API_URL: &str = "https://api.truelayer-sandbox.com/data";
pub const DEFAULT_API_VERSION: &str = "v1";

// OAuth grant types
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

// the only category eligible for round-ups
pub const CATEGORY_PURCHASE: &str = "PURCHASE";

// pause between attempts to take a refresh lock held by another poller
pub const LOCK_POLL_INTERVAL_MS: u64 = 100;
