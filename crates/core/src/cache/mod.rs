//! SQLite-backed partitioned response store.
//!
//! This module provides the persistent cache behind the offline cache
//! manager using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions created implicitly on first write
//! - Entries keyed by a SHA-256 request identity (method + URL)
//! - Atomic batch writes for precaching
//! - Age and count based expiration
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod expiration;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CACHED_AT_HEADER, CacheEntry, EntryKey};
pub use expiration::ExpirationReport;
pub use partitions::PartitionInfo;

/// Current time in epoch milliseconds, the unit of entry capture timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
