//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Checks provider endpoints and credentials, backend urls,
//!   retry / lock / logging invariants

use std::collections::HashSet;

use tracing::{error, info};

use crate::config::service::{CacheConfig, CacheType, ProviderConfig, ServiceConfig, StoreConfig, StoreType};
use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_provider(&cfg.provider, &mut errors);
    validate_cache(&cfg.cache, &mut errors);
    validate_store(&cfg.store, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if settings.poll_interval_seconds == 0 {
        errors.push("settings.poll_interval_seconds must be > 0".to_string());
    }
    if settings.request_timeout_ms == 0 {
        errors.push("settings.request_timeout_ms must be > 0".to_string());
    }
    if settings.refresh_lock.ttl_ms == 0 {
        errors.push("settings.refresh_lock.ttl_ms must be > 0".to_string());
    }
    if settings.refresh_lock.wait_ms == 0 {
        errors.push("settings.refresh_lock.wait_ms must be > 0".to_string());
    }

    // every attempt timing out, the backoff between them, then the cache write
    let worst_case_refresh_ms = RetrySettings::from(&settings.retry)
        .worst_case_ms(settings.request_timeout_ms)
        .saturating_add(settings.request_timeout_ms);
    if settings.refresh_lock.ttl_ms <= worst_case_refresh_ms {
        errors.push(format!(
            "settings.refresh_lock.ttl_ms ({}) must be > worst-case refresh time ({}ms: retry attempts x request_timeout_ms + backoff + cache write)",
            settings.refresh_lock.ttl_ms, worst_case_refresh_ms
        ));
    }

    if settings.server.host.is_empty() {
        errors.push(format!(
            "settings.server.host '{}' must be valid",
            settings.server.host
        ));
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

/// PROVIDER
fn validate_provider(provider: &ProviderConfig, errors: &mut Vec<String>) {
    validate_http_url("provider.token_url", &provider.token_url, errors);
    validate_http_url("provider.data_api_url", &provider.data_api_url, errors);

    if provider.api_version.trim().is_empty() || provider.api_version.contains('/') {
        errors.push(format!(
            "provider.api_version '{}' must be a single path segment",
            provider.api_version
        ));
    }
    if provider.client_id.trim().is_empty() {
        errors.push("provider.client_id cannot be empty".to_string());
    }
    if provider.client_secret.trim().is_empty() {
        errors.push("provider.client_secret cannot be empty".to_string());
    }
    if let Some(redirect_uri) = &provider.redirect_uri {
        validate_http_url("provider.redirect_uri", redirect_uri, errors);
    }
}

fn validate_http_url(path: &str, url: &str, errors: &mut Vec<String>) {
    if url.trim().is_empty() {
        errors.push(format!("{} cannot be empty", path));
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("{} '{}' must start with http:// or https://", path, url));
    }
}

/// CACHE BACKEND
fn validate_cache(cache: &CacheConfig, errors: &mut Vec<String>) {
    if cache.key_prefix.is_empty() {
        errors.push("cache.key_prefix cannot be empty".to_string());
    }
    if cache.cache_type == CacheType::Redis {
        match &cache.url {
            Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {}
            Some(url) => errors.push(format!(
                "cache.url '{}' must start with redis:// or rediss://",
                url
            )),
            None => errors.push("cache.url is required for cache type 'redis'".to_string()),
        }
    }
}

/// ACCOUNT STORE
fn validate_store(store: &StoreConfig, errors: &mut Vec<String>) {
    match store.store_type {
        StoreType::Postgres => {
            match &store.url {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(url) => errors.push(format!(
                    "store.url '{}' must start with postgres:// or postgresql://",
                    url
                )),
                None => errors.push("store.url is required for store type 'postgres'".to_string()),
            }
            if store.max_connections == 0 {
                errors.push("store.max_connections must be > 0".to_string());
            }
        }
        StoreType::Memory => {
            let mut seen = HashSet::new();
            for account in &store.accounts {
                if account.account_code.trim().is_empty() {
                    errors.push("store.accounts: account_code cannot be empty".to_string());
                }
                if !seen.insert(account.account_code.as_str()) {
                    errors.push(format!(
                        "store.accounts: duplicate account_code '{}'",
                        account.account_code
                    ));
                }
            }
        }
    }
}
