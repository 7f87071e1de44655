//! Reference worker for vfs-sync.
//!
//! Stands in for the CRDT-backed worker the client talks to:
//! - `MemoryEngine`: in-memory `DocumentEngine` with a change feed
//! - `WorkerHost`: serves the message protocol on top of an engine
//! - `InProcessTransport`: runs a host as a tokio task behind `WorkerTransport`

mod engine;
mod host;
mod transport;

pub use engine::MemoryEngine;
pub use host::WorkerHost;
pub use transport::{InProcessOptions, InProcessTransport};
