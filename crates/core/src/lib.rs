//! Core types and shared functionality for folio-cache.
//!
//! This crate provides:
//! - Partitioned response store with SQLite backend
//! - Expiration enforcement
//! - Request routing rules
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod rules;

pub use cache::{CacheDb, CacheEntry, ExpirationReport};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use rules::{CacheRule, ExpirationPolicy, Route, RuleSet, Strategy};
