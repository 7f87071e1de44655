use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, instrument};
use vfs_sync_core::{
    ChangeKind, DirectoryEntry, DocumentContent, DocumentEngine, EngineChange, VfsError,
};

/// Capacity of the change feed before slow subscribers start lagging.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Bundle schema version.
const BUNDLE_VERSION: u32 = 1;

/// A document as held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    content: DocumentContent,
    /// Hex SHA-256 of the serialized content
    content_hash: String,
    modified_at: DateTime<Utc>,
}

impl StoredDocument {
    fn new(content: DocumentContent) -> Result<Self, VfsError> {
        let content_hash = Self::hash(&content)?;
        Ok(Self {
            content,
            content_hash,
            modified_at: Utc::now(),
        })
    }

    fn hash(content: &DocumentContent) -> Result<String, VfsError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(content)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Serialized form of the whole store.
#[derive(Debug, Serialize, Deserialize)]
struct Bundle {
    version: u32,
    documents: BTreeMap<String, StoredDocument>,
}

/// In-memory document engine.
///
/// Directories are implicit: a directory exists as long as some document
/// lives below it. Writes whose content hash matches the stored document are
/// accepted but produce no change event.
pub struct MemoryEngine {
    documents: RwLock<BTreeMap<String, StoredDocument>>,
    changes: broadcast::Sender<EngineChange>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine").finish_non_exhaustive()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            documents: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the engine holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Apply a change as if it had been merged from a remote peer.
    ///
    /// Creates or overwrites the document regardless of its current state.
    pub async fn apply_remote(&self, path: &str, content: DocumentContent) -> Result<(), VfsError> {
        let path = normalize_path(path)?;
        let kind = {
            let mut documents = self.documents.write().await;
            let kind = if documents.contains_key(&path) {
                ChangeKind::Modified
            } else {
                ChangeKind::Created
            };
            documents.insert(path.clone(), StoredDocument::new(content.clone())?);
            kind
        };
        debug!("Applied remote change to {}", path);
        self.emit(EngineChange {
            path,
            kind,
            document: Some(content),
            previous_path: None,
        });
        Ok(())
    }

    fn emit(&self, change: EngineChange) {
        // No subscribers is fine: nobody is watching yet.
        let _ = self.changes.send(change);
    }

    fn directory_exists(documents: &BTreeMap<String, StoredDocument>, path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let prefix = format!("{}/", path);
        documents
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }
}

/// Normalize a path to `/a/b` form.
fn normalize_path(path: &str) -> Result<String, VfsError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(VfsError::InvalidArgument("path must not be empty".to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(VfsError::InvalidArgument(format!(
            "relative segments are not allowed: {}",
            path
        )));
    }
    Ok(format!("/{}", segments.join("/")))
}

#[async_trait]
impl DocumentEngine for MemoryEngine {
    #[instrument(skip(self), level = "debug")]
    async fn read_file(&self, path: &str) -> Result<DocumentContent, VfsError> {
        let path = normalize_path(path)?;
        self.documents
            .read()
            .await
            .get(&path)
            .map(|doc| doc.content.clone())
            .ok_or(VfsError::NotFound(path))
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn write_file(&self, path: &str, content: Value, create: bool) -> Result<(), VfsError> {
        let path = normalize_path(path)?;
        let document = DocumentContent::json(content);
        let stored = StoredDocument::new(document.clone())?;

        let kind = {
            let mut documents = self.documents.write().await;
            let kind = match (documents.get(&path), create) {
                (Some(_), true) => return Err(VfsError::AlreadyExists(path)),
                (None, false) => return Err(VfsError::NotFound(path)),
                (Some(existing), false) if existing.content_hash == stored.content_hash => {
                    debug!("Content of {} unchanged, skipping change event", path);
                    return Ok(());
                }
                (Some(_), false) => ChangeKind::Modified,
                (None, true) => ChangeKind::Created,
            };
            documents.insert(path.clone(), stored);
            kind
        };

        self.emit(EngineChange {
            path,
            kind,
            document: Some(document),
            previous_path: None,
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_file(&self, path: &str) -> Result<(), VfsError> {
        let path = normalize_path(path)?;
        if self.documents.write().await.remove(&path).is_none() {
            return Err(VfsError::NotFound(path));
        }
        self.emit(EngineChange {
            path,
            kind: ChangeKind::Deleted,
            document: None,
            previous_path: None,
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), VfsError> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;

        let document = {
            let mut documents = self.documents.write().await;
            if documents.contains_key(&new_path) {
                return Err(VfsError::AlreadyExists(new_path));
            }
            let mut stored = documents
                .remove(&old_path)
                .ok_or_else(|| VfsError::NotFound(old_path.clone()))?;
            stored.modified_at = Utc::now();
            let document = stored.content.clone();
            documents.insert(new_path.clone(), stored);
            document
        };

        self.emit(EngineChange {
            path: new_path,
            kind: ChangeKind::Renamed,
            document: Some(document),
            previous_path: Some(old_path),
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, VfsError> {
        let path = normalize_path(path)?;
        let documents = self.documents.read().await;

        if !Self::directory_exists(&documents, &path) {
            return Err(VfsError::NotFound(path));
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        // name -> is_directory
        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        for key in documents.keys().filter(|k| k.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            match rest.split_once('/') {
                Some((dir, _)) => {
                    children.insert(dir.to_string(), true);
                }
                None => {
                    children.entry(rest.to_string()).or_insert(false);
                }
            }
        }

        Ok(children
            .into_iter()
            .map(|(name, is_directory)| DirectoryEntry {
                path: format!("{}{}", prefix, name),
                name,
                is_directory,
            })
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, VfsError> {
        let path = normalize_path(path)?;
        let documents = self.documents.read().await;
        Ok(documents.contains_key(&path) || Self::directory_exists(&documents, &path))
    }

    async fn export_bundle(&self) -> Result<Vec<u8>, VfsError> {
        let documents = self.documents.read().await.clone();
        let bundle = Bundle {
            version: BUNDLE_VERSION,
            documents,
        };
        Ok(serde_json::to_vec(&bundle)?)
    }

    async fn load_bundle(&self, bundle: &[u8]) -> Result<(), VfsError> {
        let bundle: Bundle = serde_json::from_slice(bundle)?;
        if bundle.version > BUNDLE_VERSION {
            return Err(VfsError::InvalidArgument(format!(
                "unsupported bundle version {}",
                bundle.version
            )));
        }

        let loaded: Vec<(String, DocumentContent)> = bundle
            .documents
            .iter()
            .map(|(path, doc)| (path.clone(), doc.content.clone()))
            .collect();
        *self.documents.write().await = bundle.documents;
        debug!("Loaded bundle with {} documents", loaded.len());

        for (path, document) in loaded {
            self.emit(EngineChange {
                path,
                kind: ChangeKind::Modified,
                document: Some(document),
                previous_path: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineChange> {
        self.changes.subscribe()
    }
}
