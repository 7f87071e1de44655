//! Client side of vfs-sync.
//!
//! - `MessageChannel`: request/response correlation over a `WorkerTransport`
//! - `VfsService`: file operations, watchers, readiness handshake, reconnection
//! - `Store`: a small reactive store split into synced data and actions
//! - `sync` / `SyncMiddleware`: keeps a store's data in a worker-backed file

pub mod channel;
pub mod config;
pub mod manifest;
pub mod middleware;
pub mod service;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{MessageChannel, RequestIdGenerator};
pub use config::{Config, ServiceConfig};
pub use middleware::{merge_data, sync, SyncData, SyncMiddleware, SyncOptions, SyncPhase};
pub use service::{ConnectionSubscription, ReestablishReport, VfsService, WatchKind};
pub use stats::StatsSnapshot;
pub use store::{Store, StoreConfig, StoreMiddleware, WeakStore};
pub use vfs_sync_core::{
    ConnectionState, DirectoryChange, DirectoryEntry, DocumentContent, VfsError, WorkerTransport,
};
