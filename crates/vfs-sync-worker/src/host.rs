use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use vfs_sync_core::{
    DocumentEngine, EngineChange, InboundSender, PushMessage, RequestEnvelope, VfsError,
    WorkerMessage, WorkerRequest, WorkerResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    File,
    Directory,
}

/// Worker-side watch entry.
#[derive(Debug, Clone)]
struct WatchTarget {
    path: String,
    kind: WatchKind,
}

impl WatchTarget {
    fn matches(&self, change: &EngineChange) -> bool {
        match self.kind {
            WatchKind::File => {
                change.path == self.path || change.previous_path.as_deref() == Some(&self.path)
            }
            WatchKind::Directory => {
                let prefix = if self.path == "/" {
                    "/".to_string()
                } else {
                    format!("{}/", self.path.trim_end_matches('/'))
                };
                change.path.starts_with(&prefix)
                    || change
                        .previous_path
                        .as_deref()
                        .is_some_and(|p| p.starts_with(&prefix))
            }
        }
    }
}

/// Serves the worker message protocol on top of a `DocumentEngine`.
///
/// Requests are handled concurrently, so responses may leave in a different
/// order than requests arrived. Watches are keyed by the client's watch id;
/// registering an id again replaces the previous target.
///
/// The host also models the relay link the real worker keeps to its sync
/// server: dropping the link forgets every watch, just like a worker that
/// lost its relay subscriptions.
pub struct WorkerHost {
    engine: Arc<dyn DocumentEngine>,
    outbound: InboundSender,
    watches: DashMap<String, WatchTarget>,
    server_url: Mutex<Option<String>>,
    relay_connected: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl std::fmt::Debug for WorkerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHost")
            .field("watches", &self.watches.len())
            .field("relay_connected", &self.relay_connected)
            .finish_non_exhaustive()
    }
}

impl WorkerHost {
    /// Create a host that reports to `outbound`.
    pub fn new(engine: Arc<dyn DocumentEngine>, outbound: InboundSender) -> Arc<Self> {
        Arc::new(Self {
            engine,
            outbound,
            watches: DashMap::new(),
            server_url: Mutex::new(None),
            relay_connected: AtomicBool::new(true),
            reconnect_attempts: AtomicU32::new(0),
        })
    }

    /// Run the request loop and the change feed until `requests` closes.
    pub fn spawn(self: &Arc<Self>, mut requests: mpsc::UnboundedReceiver<RequestEnvelope>) -> JoinHandle<()> {
        // Subscribe before spawning so no change slips through in between
        let mut changes = self.engine.subscribe();
        let host = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = requests.recv() => match envelope {
                        Some(envelope) => {
                            let host = Arc::clone(&host);
                            tokio::spawn(async move { host.serve(envelope).await });
                        }
                        None => break,
                    },
                    change = changes.recv() => match change {
                        Ok(change) => host.dispatch_change(&change),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Change feed lagged, {} changes not delivered to watchers", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Worker host stopped");
        })
    }

    /// Send an unsolicited message to the client.
    pub fn push(&self, message: PushMessage) {
        if self.outbound.send(WorkerMessage::Push(message)).is_err() {
            debug!("Client gone, dropping push message");
        }
    }

    /// Number of active worker-side watches.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Whether a watch with this id is registered.
    pub fn has_watch(&self, watch_id: &str) -> bool {
        self.watches.contains_key(watch_id)
    }

    /// Whether the relay link is up.
    pub fn is_relay_connected(&self) -> bool {
        self.relay_connected.load(Ordering::SeqCst)
    }

    /// Drop the relay link. Every worker-side watch is lost.
    pub fn disconnect(&self) {
        self.relay_connected.store(false, Ordering::SeqCst);
        let dropped = self.watches.len();
        self.watches.clear();
        info!("Relay link dropped ({} watches lost)", dropped);
        self.push(PushMessage::Disconnected);
    }

    /// Restore the relay link after a drop.
    pub fn reconnect(&self) {
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(PushMessage::Reconnecting { attempt });
        self.relay_connected.store(true, Ordering::SeqCst);
        info!("Relay link restored after {} attempt(s)", attempt);
        self.push(PushMessage::Reconnected);
    }

    /// Give up reconnecting.
    pub fn fail_reconnect(&self) {
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(PushMessage::Reconnecting { attempt });
        warn!("Relay reconnection failed after {} attempt(s)", attempt);
        self.push(PushMessage::ReconnectionFailed);
    }

    async fn serve(&self, envelope: RequestEnvelope) {
        let response = match self.handle(&envelope.request).await {
            Ok(data) => WorkerResponse::ok(&envelope, data),
            Err(e) => {
                debug!("{} request {} failed: {}", envelope.request.kind(), envelope.id, e);
                WorkerResponse::failed(&envelope, e.to_string())
            }
        };
        if self.outbound.send(WorkerMessage::Response(response)).is_err() {
            debug!("Client gone, dropping response to {}", envelope.id);
        }
    }

    /// Execute a request and return the response payload.
    #[instrument(skip(self), level = "debug")]
    pub async fn handle(&self, request: &WorkerRequest) -> Result<Option<Value>, VfsError> {
        match request {
            WorkerRequest::ReadFile { path } => {
                let document = self.engine.read_file(path).await?;
                Ok(Some(serde_json::to_value(document)?))
            }
            WorkerRequest::WriteFile {
                path,
                content,
                create,
            } => {
                self.engine.write_file(path, content.clone(), *create).await?;
                Ok(None)
            }
            WorkerRequest::DeleteFile { path } => {
                self.engine.delete_file(path).await?;
                Ok(None)
            }
            WorkerRequest::Rename { old_path, new_path } => {
                self.engine.rename(old_path, new_path).await?;
                Ok(None)
            }
            WorkerRequest::ListDirectory { path } => {
                let entries = self.engine.list_directory(path).await?;
                Ok(Some(serde_json::to_value(entries)?))
            }
            WorkerRequest::Exists { path } => {
                Ok(Some(Value::Bool(self.engine.exists(path).await?)))
            }
            WorkerRequest::WatchFile { watch_id, path } => {
                self.register_watch(watch_id, path, WatchKind::File)
            }
            WorkerRequest::WatchDirectory { watch_id, path } => {
                self.register_watch(watch_id, path, WatchKind::Directory)
            }
            WorkerRequest::UnwatchFile { watch_id } | WorkerRequest::UnwatchDirectory { watch_id } => {
                if self.watches.remove(watch_id).is_none() {
                    debug!("Unwatch for unknown watch {}", watch_id);
                }
                Ok(None)
            }
            WorkerRequest::ToBytes | WorkerRequest::ForkToBytes | WorkerRequest::ExportBundle => {
                let bytes = self.engine.export_bundle().await?;
                Ok(Some(Value::String(STANDARD.encode(bytes))))
            }
            WorkerRequest::LoadBundle { bundle, server_url } => {
                let bytes = STANDARD.decode(bundle)?;
                self.engine.load_bundle(&bytes).await?;
                if let Some(url) = server_url {
                    self.set_server_url(url.clone());
                }
                Ok(None)
            }
            WorkerRequest::InitializeFromUrl { url } => {
                self.set_server_url(url.clone());
                Ok(None)
            }
            WorkerRequest::InitializeFromBytes { bytes } => {
                let bytes = STANDARD.decode(bytes)?;
                self.engine.load_bundle(&bytes).await?;
                Ok(None)
            }
            WorkerRequest::GetServerUrl => Ok(Some(
                self.server_url()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            )),
        }
    }

    fn register_watch(
        &self,
        watch_id: &str,
        path: &str,
        kind: WatchKind,
    ) -> Result<Option<Value>, VfsError> {
        if watch_id.is_empty() {
            return Err(VfsError::InvalidArgument("watchId must not be empty".to_string()));
        }
        let replaced = self
            .watches
            .insert(
                watch_id.to_string(),
                WatchTarget {
                    path: path.to_string(),
                    kind,
                },
            )
            .is_some();
        debug!(
            "Registered {:?} watch {} on {} (replaced: {})",
            kind, watch_id, path, replaced
        );
        Ok(Some(json!({ "watchId": watch_id })))
    }

    fn dispatch_change(&self, change: &EngineChange) {
        let targets: Vec<(String, WatchTarget)> = self
            .watches
            .iter()
            .filter(|entry| entry.value().matches(change))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (watch_id, target) in targets {
            let message = match target.kind {
                WatchKind::File => PushMessage::FileChanged {
                    watch_id,
                    document_data: change.document.clone().unwrap_or_default(),
                },
                WatchKind::Directory => PushMessage::DirectoryChanged {
                    watch_id,
                    path: target.path,
                    change_data: change.change_data(),
                },
            };
            self.push(message);
        }
    }

    fn set_server_url(&self, url: String) {
        *self.server_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url);
    }

    fn server_url(&self) -> Option<String> {
        self.server_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEngine;
    use serde_json::json;
    use tokio::time::{timeout, Duration};
    use vfs_sync_core::InboundReceiver;

    fn setup() -> (Arc<WorkerHost>, InboundReceiver, mpsc::UnboundedSender<RequestEnvelope>) {
        let engine: Arc<dyn DocumentEngine> = Arc::new(MemoryEngine::new());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let host = WorkerHost::new(engine, out_tx);
        host.spawn(req_rx);
        (host, out_rx, req_tx)
    }

    async fn next(rx: &mut InboundReceiver) -> WorkerMessage {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for worker message")
            .expect("worker channel closed")
    }

    #[tokio::test]
    async fn test_request_gets_correlated_response() {
        let (_host, mut rx, tx) = setup();

        tx.send(RequestEnvelope::new(
            "req-1",
            WorkerRequest::Exists {
                path: "/missing.json".to_string(),
            },
        ))
        .unwrap();

        match next(&mut rx).await {
            WorkerMessage::Response(resp) => {
                assert_eq!(resp.id.as_deref(), Some("req-1"));
                assert_eq!(resp.kind, "existsResponse");
                assert!(resp.success);
                assert_eq!(resp.data, Some(json!(false)));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_engine_errors_become_failed_responses() {
        let (_host, mut rx, tx) = setup();

        tx.send(RequestEnvelope::new(
            "req-1",
            WorkerRequest::WriteFile {
                path: "/absent.json".to_string(),
                content: json!({}),
                create: false,
            },
        ))
        .unwrap();

        match next(&mut rx).await {
            WorkerMessage::Response(resp) => {
                assert!(!resp.success);
                assert!(resp.error.unwrap().contains("/absent.json"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_watch_pushes_changes() {
        let (host, mut rx, tx) = setup();
        host.handle(&WorkerRequest::WatchFile {
            watch_id: "w1".to_string(),
            path: "/x.json".to_string(),
        })
        .await
        .unwrap();

        tx.send(RequestEnvelope::new(
            "req-1",
            WorkerRequest::WriteFile {
                path: "/x.json".to_string(),
                content: json!({"counter": 100}),
                create: true,
            },
        ))
        .unwrap();

        let mut saw_push = false;
        let mut saw_response = false;
        while !(saw_push && saw_response) {
            match next(&mut rx).await {
                WorkerMessage::Push(PushMessage::FileChanged {
                    watch_id,
                    document_data,
                }) => {
                    assert_eq!(watch_id, "w1");
                    assert_eq!(document_data.content, json!({"counter": 100}));
                    saw_push = true;
                }
                WorkerMessage::Response(resp) => {
                    assert!(resp.success);
                    saw_response = true;
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_directory_watch_reports_nested_changes() {
        let (host, mut rx, _tx) = setup();
        host.handle(&WorkerRequest::WatchDirectory {
            watch_id: "d1".to_string(),
            path: "/notes".to_string(),
        })
        .await
        .unwrap();

        host.handle(&WorkerRequest::WriteFile {
            path: "/notes/today.md".to_string(),
            content: json!("hello"),
            create: true,
        })
        .await
        .unwrap();
        host.handle(&WorkerRequest::WriteFile {
            path: "/elsewhere.md".to_string(),
            content: json!("ignored"),
            create: true,
        })
        .await
        .unwrap();

        match next(&mut rx).await {
            WorkerMessage::Push(PushMessage::DirectoryChanged {
                watch_id,
                path,
                change_data,
            }) => {
                assert_eq!(watch_id, "d1");
                assert_eq!(path, "/notes");
                assert_eq!(change_data["kind"], "created");
                assert_eq!(change_data["path"], "/notes/today.md");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_drops_watches() {
        let (host, mut rx, _tx) = setup();
        host.handle(&WorkerRequest::WatchFile {
            watch_id: "w1".to_string(),
            path: "/x.json".to_string(),
        })
        .await
        .unwrap();
        assert!(host.has_watch("w1"));

        host.disconnect();
        assert_eq!(host.watch_count(), 0);
        assert!(!host.is_relay_connected());
        assert_eq!(next(&mut rx).await, WorkerMessage::Push(PushMessage::Disconnected));

        host.reconnect();
        assert_eq!(
            next(&mut rx).await,
            WorkerMessage::Push(PushMessage::Reconnecting { attempt: 1 })
        );
        assert_eq!(next(&mut rx).await, WorkerMessage::Push(PushMessage::Reconnected));
        assert!(host.is_relay_connected());
    }

    #[tokio::test]
    async fn test_bundle_round_trip_through_protocol() {
        let (host, _rx, _tx) = setup();
        host.handle(&WorkerRequest::WriteFile {
            path: "/a.json".to_string(),
            content: json!({"a": 1}),
            create: true,
        })
        .await
        .unwrap();

        let exported = host.handle(&WorkerRequest::ExportBundle).await.unwrap().unwrap();
        let bundle = exported.as_str().unwrap().to_string();

        let (other, _rx2, _tx2) = setup();
        other
            .handle(&WorkerRequest::LoadBundle {
                bundle,
                server_url: Some("wss://relay.example/sync".to_string()),
            })
            .await
            .unwrap();

        let read = other
            .handle(&WorkerRequest::ReadFile {
                path: "/a.json".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read["content"], json!({"a": 1}));

        let url = other.handle(&WorkerRequest::GetServerUrl).await.unwrap();
        assert_eq!(url, Some(json!("wss://relay.example/sync")));
    }
}
