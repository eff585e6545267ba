//! # Token Broker
//!
//! Serves short-lived bearer tokens for Google, Microsoft and Rancher over
//! HTTP. Each configured provider caches its token and refreshes it on demand,
//! with at most one upstream call in flight per provider.
//!
//! Modules:
//! - `config`: service settings and provider records
//! - `cache`: cached token and single-flight refresh cell
//! - `sources`: provider adapters behind the `Tokenizer` trait
//! - `broker`: provider registry and lookup
//! - `server`: axum HTTP boundary
//! - `client`: caller library for the `/tokens` endpoint

pub mod broker;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod observability;
pub mod server;
pub mod sources;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::config::settings::ServiceConfig;
pub use crate::errors::{BrokerError, BrokerResult};
