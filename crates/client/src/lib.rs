//! Request-handling side of folio-cache.
//!
//! This crate provides the network fetcher, the caching strategies, offline
//! fallbacks and the cache worker that ties them to the store in
//! `folio-core`.

pub mod fallback;
pub mod fetch;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fallback::OfflineFallback;
pub use fetch::{Destination, FetchConfig, Fetcher, HttpFetcher, Request, Response, ResponseSource};
pub use strategy::StrategyExecutor;
pub use worker::{
    ActivationReport, AdminCommand, AdminMessage, AdminReply, CacheWorker, InstallReport, Interception, Lifecycle,
    MaintenanceReport, WorkerConfig, WorkerState,
};
