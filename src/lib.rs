//! # Rounder
//!
//! Polls an Open Banking data API for the transactions of every linked
//! account and keeps round-up eligible spend.
//!
//! Modules:
//! - `cache`: shared token cache with single-flight refresh
//! - `provider`: OAuth token grants and the transactions endpoint
//! - `poller`: per-cycle orchestration and publishing
//! - `store`: linked accounts and their rotating refresh tokens
//! - `config`: service configuration loading and validation

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod poller;
pub mod provider;
pub mod resilience;
pub mod server;
pub mod store;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::service::ServiceConfig;
pub use crate::error::{Error, Result};
