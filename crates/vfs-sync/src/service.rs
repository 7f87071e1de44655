//! VFS service: file operations, watchers and connection state on top of a
//! worker transport.

mod reconnect;

pub use reconnect::ReestablishReport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use vfs_sync_core::{
    ConnectionState, DirectoryChange, DirectoryEntry, DocumentContent, InboundReceiver,
    PushMessage, VfsError, WorkerMessage, WorkerRequest, WorkerTransport,
};

use crate::channel::{MessageChannel, RequestIdGenerator};
use crate::config::ServiceConfig;
use crate::manifest::{derive_server_url, ManifestLoader};
use crate::stats::{StatsRecorder, StatsSnapshot};

type FileCallback = Arc<dyn Fn(DocumentContent) + Send + Sync>;
type DirectoryCallback = Arc<dyn Fn(DirectoryChange) + Send + Sync>;
type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type ReestablishListener = Arc<dyn Fn(&ReestablishReport) + Send + Sync>;

/// What a watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    File,
    Directory,
}

#[derive(Clone)]
enum WatchCallback {
    File(FileCallback),
    Directory(DirectoryCallback),
}

/// Client-side watcher registration.
#[derive(Clone)]
struct WatcherEntry {
    path: String,
    callback: WatchCallback,
}

impl WatcherEntry {
    fn kind(&self) -> WatchKind {
        match self.callback {
            WatchCallback::File(_) => WatchKind::File,
            WatchCallback::Directory(_) => WatchKind::Directory,
        }
    }

    fn watch_request(&self, watch_id: &str) -> WorkerRequest {
        watch_request(self.kind(), watch_id, &self.path)
    }
}

fn watch_request(kind: WatchKind, watch_id: &str, path: &str) -> WorkerRequest {
    match kind {
        WatchKind::File => WorkerRequest::WatchFile {
            watch_id: watch_id.to_string(),
            path: path.to_string(),
        },
        WatchKind::Directory => WorkerRequest::WatchDirectory {
            watch_id: watch_id.to_string(),
            path: path.to_string(),
        },
    }
}

fn unwatch_request(kind: WatchKind, watch_id: &str) -> WorkerRequest {
    match kind {
        WatchKind::File => WorkerRequest::UnwatchFile {
            watch_id: watch_id.to_string(),
        },
        WatchKind::Directory => WorkerRequest::UnwatchDirectory {
            watch_id: watch_id.to_string(),
        },
    }
}

/// Contents of the worker's `swReady` message.
#[derive(Debug, Clone, Copy)]
struct Handshake {
    auto_initialized: bool,
    needs_bundle: Option<bool>,
}

struct ServiceInner {
    config: ServiceConfig,
    transport: Arc<dyn WorkerTransport>,
    channel: MessageChannel,
    ids: RequestIdGenerator,
    watchers: DashMap<String, WatcherEntry>,
    stats: StatsRecorder,
    manifest: ManifestLoader,
    initialized: AtomicBool,
    offline: AtomicBool,
    /// Set when the state leaves `Connected`, consumed by the next reconnect
    dropped_since_connected: AtomicBool,
    state: watch::Sender<ConnectionState>,
    listeners: DashMap<u64, StateListener>,
    /// Held while a transition is applied and delivered, and while a new
    /// listener receives its first state
    delivery: Mutex<()>,
    next_listener_id: AtomicU64,
    reestablish_listener: Mutex<Option<ReestablishListener>>,
    ready_signal: Mutex<Option<oneshot::Sender<Handshake>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Handle to a worker-backed virtual file system.
///
/// Cloning is cheap and every clone drives the same worker. Nothing works
/// before `initialize` has completed the readiness handshake.
#[derive(Clone)]
pub struct VfsService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for VfsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsService")
            .field("state", &self.connection_state())
            .field("initialized", &self.is_initialized())
            .field("offline", &self.is_offline())
            .field("watchers", &self.watcher_count())
            .field("channel", &self.inner.channel)
            .finish()
    }
}

/// Keeps a connection state listener registered until dropped.
#[must_use = "dropping the subscription detaches the listener"]
pub struct ConnectionSubscription {
    service: Weak<ServiceInner>,
    id: u64,
}

impl ConnectionSubscription {
    /// Detach the listener now.
    pub fn unsubscribe(self) {}
}

impl Drop for ConnectionSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.service.upgrade() {
            inner.listeners.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for ConnectionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl VfsService {
    /// Create an uninitialized service over `transport`.
    pub fn new(transport: Arc<dyn WorkerTransport>, config: ServiceConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ServiceInner {
                channel: MessageChannel::new(config.request_timeout),
                stats: StatsRecorder::new(config.timing_window),
                manifest: ManifestLoader::new(config.manifest_timeout),
                config,
                transport,
                ids: RequestIdGenerator::new(),
                watchers: DashMap::new(),
                initialized: AtomicBool::new(false),
                offline: AtomicBool::new(false),
                dropped_since_connected: AtomicBool::new(false),
                state,
                listeners: DashMap::new(),
                delivery: Mutex::new(()),
                next_listener_id: AtomicU64::new(1),
                reestablish_listener: Mutex::new(None),
                ready_signal: Mutex::new(None),
                dispatcher: Mutex::new(None),
                init_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Start the worker and wait until it can serve requests.
    ///
    /// A worker that restored its state from cache is ready as soon as it
    /// says so. Otherwise the manifest at `manifest_source` is fetched and
    /// loaded as the worker's bundle; if that fails the service still comes
    /// up, in offline mode. Only a missing readiness signal is an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn initialize(
        &self,
        manifest_source: &str,
        transport_target: Option<&str>,
    ) -> Result<(), VfsError> {
        let _guard = self.inner.init_lock.lock().await;
        if self.is_initialized() {
            debug!("VFS service already initialized");
            return Ok(());
        }

        self.inner.dropped_since_connected.store(false, Ordering::SeqCst);
        self.inner.offline.store(false, Ordering::SeqCst);
        self.set_connection_state(ConnectionState::Connecting);

        let (ready_tx, ready_rx) = oneshot::channel();
        *self
            .inner
            .ready_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(ready_tx);

        let inbound = match self.inner.transport.connect().await {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Failed to start worker: {}", e);
                self.abandon_initialize().await;
                return Err(e);
            }
        };
        self.inner.channel.attach(Arc::clone(&self.inner.transport));
        let dispatcher = self.spawn_dispatcher(inbound);
        if let Some(previous) = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(dispatcher)
        {
            previous.abort();
        }

        let handshake_timeout = self.inner.config.handshake_timeout;
        let handshake = match timeout(handshake_timeout, ready_rx).await {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(_)) => {
                self.abandon_initialize().await;
                return Err(VfsError::Transport(
                    "worker stopped before signalling readiness".to_string(),
                ));
            }
            Err(_) => {
                warn!("Worker did not signal readiness within {:?}", handshake_timeout);
                self.abandon_initialize().await;
                return Err(VfsError::Timeout {
                    id: "swReady".to_string(),
                    timeout_ms: handshake_timeout.as_millis() as u64,
                });
            }
        };

        if handshake.auto_initialized {
            info!("Worker restored its state from cache, skipping bundle");
        } else {
            debug!("Worker needs bundle: {:?}", handshake.needs_bundle);
            self.load_manifest(manifest_source, transport_target).await;
        }

        self.inner.channel.set_ready(true);
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.set_connection_state(ConnectionState::Connected);
        info!(
            "VFS service initialized (offline: {})",
            self.is_offline()
        );

        if self.watcher_count() > 0 {
            self.reestablish_watchers().await;
        }
        Ok(())
    }

    async fn load_manifest(&self, manifest_url: &str, transport_target: Option<&str>) {
        let bytes = match self.inner.manifest.fetch(manifest_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Manifest unavailable, continuing offline: {}", e);
                self.inner.offline.store(true, Ordering::SeqCst);
                return;
            }
        };

        let server_url = derive_server_url(manifest_url, &bytes, transport_target);
        debug!("Loading bundle ({} bytes, server {:?})", bytes.len(), server_url);
        let request = WorkerRequest::LoadBundle {
            bundle: STANDARD.encode(&bytes),
            server_url,
        };
        if let Err(e) = self.request(request).await {
            warn!("Worker rejected bundle, continuing offline: {}", e);
            self.inner.offline.store(true, Ordering::SeqCst);
        }
    }

    async fn abandon_initialize(&self) {
        self.teardown_worker().await;
        self.set_connection_state(ConnectionState::Disconnected);
    }

    async fn teardown_worker(&self) {
        self.inner.channel.detach();
        self.inner.channel.clear_pending();
        if let Some(handle) = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.inner
            .ready_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.transport.terminate().await;
    }

    fn spawn_dispatcher(&self, mut inbound: InboundReceiver) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                VfsService { inner }.dispatch(message);
            }
            debug!("Worker message loop stopped");
        })
    }

    fn dispatch(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Response(response) => {
                self.inner.channel.handle_response(response);
            }
            WorkerMessage::Push(push) => self.handle_push(push),
        }
    }

    fn handle_push(&self, push: PushMessage) {
        match push {
            PushMessage::SwReady {
                auto_initialized,
                needs_bundle,
            } => {
                let signal = self
                    .inner
                    .ready_signal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match signal {
                    Some(tx) => {
                        let _ = tx.send(Handshake {
                            auto_initialized,
                            needs_bundle,
                        });
                    }
                    None => debug!("Ignoring swReady outside of a handshake"),
                }
            }
            PushMessage::FileChanged {
                watch_id,
                document_data,
            } => {
                let callback = self.watcher_callback(&watch_id);
                match callback {
                    Some(WatchCallback::File(callback)) => callback(document_data),
                    Some(WatchCallback::Directory(_)) => {
                        warn!("fileChanged for directory watcher {}", watch_id)
                    }
                    None => debug!("Dropping fileChanged for unknown watcher {}", watch_id),
                }
            }
            PushMessage::DirectoryChanged {
                watch_id,
                path,
                change_data,
            } => {
                let callback = self.watcher_callback(&watch_id);
                match callback {
                    Some(WatchCallback::Directory(callback)) => callback(DirectoryChange {
                        watch_id,
                        path,
                        change_data,
                    }),
                    Some(WatchCallback::File(_)) => {
                        warn!("directoryChanged for file watcher {}", watch_id)
                    }
                    None => debug!("Dropping directoryChanged for unknown watcher {}", watch_id),
                }
            }
            PushMessage::Disconnected => {
                self.set_connection_state(ConnectionState::Disconnected)
            }
            PushMessage::Reconnecting { attempt } => {
                debug!("Worker reconnecting (attempt {})", attempt);
                self.set_connection_state(ConnectionState::Reconnecting);
            }
            PushMessage::Reconnected => self.set_connection_state(ConnectionState::Connected),
            PushMessage::ReconnectionFailed => {
                warn!("Worker gave up reconnecting");
                self.set_connection_state(ConnectionState::Disconnected);
            }
            PushMessage::WatchersReestablished { count } => {
                debug!("Worker re-established {} watcher(s)", count)
            }
        }
    }

    fn watcher_callback(&self, watch_id: &str) -> Option<WatchCallback> {
        self.inner
            .watchers
            .get(watch_id)
            .map(|entry| entry.callback.clone())
    }

    fn set_connection_state(&self, next: ConnectionState) {
        {
            let _delivery = self
                .inner
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut previous = next;
            let changed = self.inner.state.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                previous = *current;
                *current = next;
                true
            });
            if !changed {
                return;
            }
            info!("Connection state: {} -> {}", previous, next);

            if previous == ConnectionState::Connected {
                self.inner.dropped_since_connected.store(true, Ordering::SeqCst);
            }

            let listeners: Vec<StateListener> = self
                .inner
                .listeners
                .iter()
                .map(|entry| Arc::clone(entry.value()))
                .collect();
            for listener in listeners {
                listener(next);
            }
        }

        if next == ConnectionState::Connected
            && self.is_initialized()
            && self.inner.dropped_since_connected.swap(false, Ordering::SeqCst)
        {
            let service = self.clone();
            tokio::spawn(async move {
                service.reestablish_watchers().await;
            });
        }
    }

    async fn request(&self, request: WorkerRequest) -> Result<Option<Value>, VfsError> {
        let id = self.inner.ids.next_id();
        let started = Instant::now();
        let result = self.inner.channel.send_message(id, request).await;
        match &result {
            Ok(_) => self.inner.stats.record_success(started.elapsed()),
            Err(_) => self.inner.stats.record_failure(),
        }
        result
    }

    async fn request_bytes(&self, request: WorkerRequest) -> Result<Vec<u8>, VfsError> {
        let kind = request.kind();
        let encoded: String = decode(kind, self.request(request).await?)?;
        Ok(STANDARD.decode(encoded)?)
    }

    // File operations

    #[instrument(skip(self), level = "debug")]
    pub async fn read_file(&self, path: &str) -> Result<DocumentContent, VfsError> {
        validate_path(path)?;
        let data = self
            .request(WorkerRequest::ReadFile {
                path: path.to_string(),
            })
            .await?;
        decode("readFile", data)
    }

    /// Write `content` to `path`. With `create` the file must not exist yet,
    /// without it the file must exist.
    #[instrument(skip(self, content), level = "debug")]
    pub async fn write_file(&self, path: &str, content: Value, create: bool) -> Result<(), VfsError> {
        validate_path(path)?;
        self.request(WorkerRequest::WriteFile {
            path: path.to_string(),
            content,
            create,
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn delete_file(&self, path: &str) -> Result<(), VfsError> {
        validate_path(path)?;
        self.request(WorkerRequest::DeleteFile {
            path: path.to_string(),
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), VfsError> {
        validate_path(old_path)?;
        validate_path(new_path)?;
        self.request(WorkerRequest::Rename {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, VfsError> {
        validate_path(path)?;
        let data = self
            .request(WorkerRequest::ListDirectory {
                path: path.to_string(),
            })
            .await?;
        decode("listDirectory", data)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn exists(&self, path: &str) -> Result<bool, VfsError> {
        validate_path(path)?;
        let data = self
            .request(WorkerRequest::Exists {
                path: path.to_string(),
            })
            .await?;
        decode("exists", data)
    }

    // Store-level operations

    /// Serialize the whole store.
    pub async fn to_bytes(&self) -> Result<Vec<u8>, VfsError> {
        self.request_bytes(WorkerRequest::ToBytes).await
    }

    /// Serialize the store for use as an independent copy.
    pub async fn fork_to_bytes(&self) -> Result<Vec<u8>, VfsError> {
        self.request_bytes(WorkerRequest::ForkToBytes).await
    }

    pub async fn export_bundle(&self) -> Result<Vec<u8>, VfsError> {
        self.request_bytes(WorkerRequest::ExportBundle).await
    }

    /// Replace the worker's contents with `bundle`, optionally pointing it
    /// at a sync server.
    #[instrument(skip(self, bundle), level = "debug")]
    pub async fn load_bundle(&self, bundle: &[u8], server_url: Option<&str>) -> Result<(), VfsError> {
        self.request(WorkerRequest::LoadBundle {
            bundle: STANDARD.encode(bundle),
            server_url: server_url.map(str::to_string),
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn initialize_from_url(&self, url: &str) -> Result<(), VfsError> {
        if url.is_empty() {
            return Err(VfsError::InvalidArgument("url must not be empty".to_string()));
        }
        self.request(WorkerRequest::InitializeFromUrl {
            url: url.to_string(),
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self, bytes), level = "debug")]
    pub async fn initialize_from_bytes(&self, bytes: &[u8]) -> Result<(), VfsError> {
        self.request(WorkerRequest::InitializeFromBytes {
            bytes: STANDARD.encode(bytes),
        })
        .await
        .map(|_| ())
    }

    /// Sync server the worker currently talks to.
    pub async fn get_server_url(&self) -> Result<Option<String>, VfsError> {
        let data = self.request(WorkerRequest::GetServerUrl).await?;
        match data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    // Watchers

    /// Watch a single file. `callback` receives the new content on every
    /// change and runs on the dispatcher task, so it must not block.
    #[instrument(skip(self, callback), level = "debug")]
    pub async fn watch_file<F>(&self, path: &str, callback: F) -> Result<String, VfsError>
    where
        F: Fn(DocumentContent) + Send + Sync + 'static,
    {
        validate_path(path)?;
        self.add_watcher(path, WatchCallback::File(Arc::new(callback)))
            .await
    }

    /// Watch every file below `path`.
    #[instrument(skip(self, callback), level = "debug")]
    pub async fn watch_directory<F>(&self, path: &str, callback: F) -> Result<String, VfsError>
    where
        F: Fn(DirectoryChange) + Send + Sync + 'static,
    {
        validate_path(path)?;
        self.add_watcher(path, WatchCallback::Directory(Arc::new(callback)))
            .await
    }

    pub async fn unwatch_file(&self, watch_id: &str) -> Result<(), VfsError> {
        self.remove_watcher(watch_id, WatchKind::File).await
    }

    pub async fn unwatch_directory(&self, watch_id: &str) -> Result<(), VfsError> {
        self.remove_watcher(watch_id, WatchKind::Directory).await
    }

    async fn add_watcher(&self, path: &str, callback: WatchCallback) -> Result<String, VfsError> {
        let watch_id = format!("watch-{}", Uuid::new_v4().simple());
        let entry = WatcherEntry {
            path: path.to_string(),
            callback,
        };
        let request = entry.watch_request(&watch_id);

        // Registered before sending so no early change push is lost
        self.inner.watchers.insert(watch_id.clone(), entry);
        if let Err(e) = self.request(request).await {
            self.inner.watchers.remove(&watch_id);
            warn!("Worker rejected watcher on {}: {}", path, e);
            return Err(e);
        }
        debug!("Watching {} as {}", path, watch_id);
        Ok(watch_id)
    }

    async fn remove_watcher(&self, watch_id: &str, kind: WatchKind) -> Result<(), VfsError> {
        let removed = self
            .inner
            .watchers
            .remove_if(watch_id, |_, entry| entry.kind() == kind);
        if removed.is_none() {
            if self.inner.watchers.contains_key(watch_id) {
                return Err(VfsError::InvalidArgument(format!(
                    "{} is not a {:?} watcher",
                    watch_id, kind
                )));
            }
            debug!("Unwatch for unknown watcher {}", watch_id);
            return Ok(());
        }
        self.request(unwatch_request(kind, watch_id))
            .await
            .map(|_| ())
    }

    /// Send the registration of an existing watcher again.
    ///
    /// Returns `false` if no watcher with this id is registered.
    pub async fn refresh_watcher(&self, watch_id: &str) -> Result<bool, VfsError> {
        let request = self
            .inner
            .watchers
            .get(watch_id)
            .map(|entry| entry.watch_request(watch_id));
        match request {
            Some(request) => self.request(request).await.map(|_| true),
            None => Ok(false),
        }
    }

    pub fn has_watcher(&self, watch_id: &str) -> bool {
        self.inner.watchers.contains_key(watch_id)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    // Connection state

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Call `callback` with the current state right away, then on every
    /// transition until the subscription is dropped.
    ///
    /// Callbacks run synchronously and must not register further listeners.
    pub fn on_connection_state_change<F>(&self, callback: F) -> ConnectionSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let callback: StateListener = Arc::new(callback);
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        {
            let _delivery = self
                .inner
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.listeners.insert(id, Arc::clone(&callback));
            callback(self.connection_state());
        }
        ConnectionSubscription {
            service: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Stream of connection states, starting with the current one.
    pub fn connection_states(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.inner.state.subscribe())
    }

    /// Register the listener told about every watcher re-establishment.
    pub fn on_watchers_reestablished<F>(&self, callback: F)
    where
        F: Fn(&ReestablishReport) + Send + Sync + 'static,
    {
        *self
            .inner
            .reestablish_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// True when initialization could not load the manifest.
    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Shut the service down.
    ///
    /// Pending requests fail with `Cancelled`. Watchers, listeners and
    /// statistics are cleared and the worker is terminated. The service can
    /// be initialized again afterwards.
    pub async fn destroy(&self) {
        let cancelled = self.inner.channel.clear_pending();
        self.set_connection_state(ConnectionState::Disconnected);
        self.inner.listeners.clear();
        self.inner.watchers.clear();
        self.inner
            .reestablish_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.teardown_worker().await;
        self.inner.stats.reset();
        self.inner.initialized.store(false, Ordering::SeqCst);
        self.inner.offline.store(false, Ordering::SeqCst);
        self.inner.dropped_since_connected.store(false, Ordering::SeqCst);
        info!("VFS service destroyed ({} pending requests cancelled)", cancelled);
    }
}

fn validate_path(path: &str) -> Result<(), VfsError> {
    if path.trim().is_empty() {
        return Err(VfsError::InvalidArgument("path must not be empty".to_string()));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(kind: &str, data: Option<Value>) -> Result<T, VfsError> {
    let value = data.ok_or_else(|| VfsError::Internal(format!("{} response carried no data", kind)))?;
    Ok(serde_json::from_value(value)?)
}
