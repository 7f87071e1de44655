//! Core traits and types shared by the vfs-sync client and worker crates.
//!
//! This crate defines:
//! - `VfsError`: the error taxonomy surfaced by every layer
//! - the worker message protocol (`RequestEnvelope`, `WorkerRequest`, `WorkerMessage`)
//! - `DocumentContent`: the file payload envelope
//! - `DocumentEngine`: the boundary to the document store owned by the worker
//! - `WorkerTransport`: the message channel to the worker execution context

mod connection;
mod content;
mod engine;
mod error;
mod protocol;
mod transport;

pub use connection::ConnectionState;
pub use content::DocumentContent;
pub use engine::{ChangeKind, DirectoryEntry, DocumentEngine, EngineChange};
pub use error::VfsError;
pub use protocol::{
    DirectoryChange, PushMessage, RequestEnvelope, WorkerMessage, WorkerRequest, WorkerResponse,
};
pub use transport::{InboundReceiver, InboundSender, WorkerTransport};
