use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::content::DocumentContent;
use crate::error::VfsError;

/// Entry returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Basename
    pub name: String,
    /// Absolute path
    pub path: String,
    pub is_directory: bool,
}

/// Kinds of changes the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A change applied to the document store, local or merged from a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineChange {
    pub path: String,
    pub kind: ChangeKind,
    /// Document after the change (`None` for deletions)
    pub document: Option<DocumentContent>,
    /// Previous path for renames
    pub previous_path: Option<String>,
}

impl EngineChange {
    /// Payload used for `directoryChanged` pushes.
    pub fn change_data(&self) -> Value {
        let mut data = serde_json::json!({
            "kind": self.kind,
            "path": self.path,
        });
        if let Some(previous) = &self.previous_path {
            data["previousPath"] = Value::String(previous.clone());
        }
        data
    }
}

/// Boundary to the document store owned by the worker.
///
/// This is the only surface the worker needs from the CRDT layer. Conflict
/// resolution happens behind it.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Read a document.
    async fn read_file(&self, path: &str) -> Result<DocumentContent, VfsError>;

    /// Write a document.
    ///
    /// With `create = true` the file must not exist yet; with `create = false`
    /// it must already exist.
    async fn write_file(&self, path: &str, content: Value, create: bool) -> Result<(), VfsError>;

    /// Delete a document.
    async fn delete_file(&self, path: &str) -> Result<(), VfsError>;

    /// Move a document to a new path.
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), VfsError>;

    /// List the direct children of a directory.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, VfsError>;

    /// Check if a file or directory exists.
    async fn exists(&self, path: &str) -> Result<bool, VfsError>;

    /// Serialize the entire store.
    async fn export_bundle(&self) -> Result<Vec<u8>, VfsError>;

    /// Replace the store contents from a serialized bundle.
    async fn load_bundle(&self, bundle: &[u8]) -> Result<(), VfsError>;

    /// Subscribe to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<EngineChange>;
}
