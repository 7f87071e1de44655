//! Store middleware that keeps a store's data in a worker-backed file.
//!
//! Once the service is connected the file is loaded into the store (or
//! created from it), then watched. Every local mutation after that is
//! written back. Remote changes are merged in without being written again.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vfs_sync_core::{ConnectionState, VfsError};

use crate::service::VfsService;
use crate::store::{Store, StoreConfig, StoreMiddleware, WeakStore};

/// Where a synced store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    WaitingForConnection,
    Loading,
    Watching,
}

/// Options for `sync`.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// File the store is synced to. `None` disables syncing.
    pub path: Option<String>,
}

impl SyncOptions {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

/// Data that can be synced: serializable and shareable across tasks.
pub trait SyncData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> SyncData for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Add file syncing to a store configuration.
///
/// Without a path the configuration is returned unchanged.
pub fn sync<D, A>(config: StoreConfig<D, A>, service: &VfsService, options: SyncOptions) -> StoreConfig<D, A>
where
    D: SyncData,
    A: Send + Sync + 'static,
{
    match options.path {
        Some(path) => config.with_middleware(SyncMiddleware::<D>::new(service.clone(), path)),
        None => config,
    }
}

/// Decode file content into the full synced data.
///
/// The result replaces the store's data outright: a field missing from
/// `incoming` takes its serde default instead of keeping its current value.
/// Actions live outside `D` and are never touched.
pub fn merge_data<D: SyncData>(incoming: &Value) -> Result<D, VfsError> {
    if !incoming.is_object() {
        return Err(VfsError::InvalidArgument(format!(
            "synced content must be a JSON object, got {}",
            incoming
        )));
    }
    Ok(serde_json::from_value(incoming.clone())?)
}

/// Apply file content to the store. Returns the content as the store now
/// serializes it, or `None` once the store is gone.
fn apply_content<D, A>(store: &WeakStore<D, A>, content: &Value) -> Result<Option<Value>, VfsError>
where
    D: SyncData,
    A: Send + Sync + 'static,
{
    let next: D = merge_data(content)?;
    let Some(store) = store.upgrade() else {
        return Ok(None);
    };
    let applied = serde_json::to_value(&next)?;
    // Skipping an identical value changes nothing but spares subscribers
    if serde_json::to_value(store.get())? != applied {
        store.apply_remote(next);
    }
    Ok(Some(applied))
}

struct SyncState {
    service: VfsService,
    path: String,
    phase: watch::Sender<SyncPhase>,
    /// Set once the file has been loaded or created
    loaded: AtomicBool,
    watch_id: Mutex<Option<String>>,
    /// Latest data waiting to be written
    persist_tx: watch::Sender<Option<Value>>,
}

impl SyncState {
    fn set_phase(&self, next: SyncPhase) {
        let previous = self.phase.send_replace(next);
        if previous != next {
            debug!("Sync of {}: {:?} -> {:?}", self.path, previous, next);
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Handle a transition into `Connected`. Returns `false` once the store
    /// is gone.
    async fn on_connected<D, A>(&self, store: &WeakStore<D, A>) -> bool
    where
        D: SyncData,
        A: Send + Sync + 'static,
    {
        if !self.is_loaded() {
            self.set_phase(SyncPhase::Loading);
            match self.load(store).await {
                Ok(Some(written)) => {
                    self.loaded.store(true, Ordering::SeqCst);
                    if !self.catch_up(store, &written) {
                        return false;
                    }
                }
                Ok(None) => return false,
                Err(e) => {
                    warn!("Failed to load {}, waiting for the next connection: {}", self.path, e);
                    self.set_phase(SyncPhase::WaitingForConnection);
                    return true;
                }
            }
        }

        match self.ensure_watcher(store).await {
            Ok(()) => self.set_phase(SyncPhase::Watching),
            Err(e) => {
                warn!("Failed to watch {}: {}", self.path, e);
                self.set_phase(SyncPhase::WaitingForConnection);
            }
        }
        true
    }

    /// Load the file into the store, or create it from the store. Returns
    /// the content the file and the store agreed on.
    async fn load<D, A>(&self, store: &WeakStore<D, A>) -> Result<Option<Value>, VfsError>
    where
        D: SyncData,
        A: Send + Sync + 'static,
    {
        if self.service.exists(&self.path).await? {
            let document = self.service.read_file(&self.path).await?;
            let applied = apply_content(store, &document.content)?;
            if applied.is_some() {
                info!("Loaded {} into store", self.path);
            }
            Ok(applied)
        } else {
            let Some(data) = store.upgrade().map(|store| store.get()) else {
                return Ok(None);
            };
            let content = serde_json::to_value(data)?;
            self.service.write_file(&self.path, content.clone(), true).await?;
            info!("Created {} from store data", self.path);
            Ok(Some(content))
        }
    }

    /// Queue local changes made while the load was in flight. Returns
    /// `false` once the store is gone.
    fn catch_up<D, A>(&self, store: &WeakStore<D, A>, written: &Value) -> bool
    where
        D: SyncData,
        A: Send + Sync + 'static,
    {
        let Some(store) = store.upgrade() else {
            return false;
        };
        match serde_json::to_value(store.get()) {
            Ok(current) if current != *written => {
                debug!("{} changed while loading, writing it back", self.path);
                self.persist_tx.send_replace(Some(current));
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to serialize store for {}: {}", self.path, e),
        }
        true
    }

    /// Make sure the worker watches the file, reusing the existing watch id
    /// when the service still knows it.
    async fn ensure_watcher<D, A>(&self, store: &WeakStore<D, A>) -> Result<(), VfsError>
    where
        D: SyncData,
        A: Send + Sync + 'static,
    {
        let existing = self
            .watch_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(watch_id) = existing {
            if self.service.refresh_watcher(&watch_id).await? {
                return Ok(());
            }
            debug!("Watcher {} is gone, watching {} again", watch_id, self.path);
        }

        let target = store.clone();
        let path = self.path.clone();
        let watch_id = self
            .service
            .watch_file(&self.path, move |document| {
                if let Err(e) = apply_content(&target, &document.content) {
                    warn!("Ignoring change to {}: {}", path, e);
                }
            })
            .await?;
        *self.watch_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch_id);
        Ok(())
    }

    /// Write `content`, creating the file if the update is refused.
    async fn persist(&self, content: Value) {
        match self.service.write_file(&self.path, content.clone(), false).await {
            Ok(()) => debug!("Persisted {}", self.path),
            Err(first) => {
                debug!("Update of {} failed ({}), retrying as create", self.path, first);
                if let Err(e) = self.service.write_file(&self.path, content, true).await {
                    warn!("Failed to persist {}: {}", self.path, e);
                }
            }
        }
    }
}

/// Keeps one store in sync with one file.
pub struct SyncMiddleware<D> {
    state: Arc<SyncState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    _data: PhantomData<fn() -> D>,
}

impl<D> std::fmt::Debug for SyncMiddleware<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMiddleware")
            .field("path", &self.state.path)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<D: SyncData> SyncMiddleware<D> {
    pub fn new(service: VfsService, path: impl Into<String>) -> Arc<Self> {
        let (phase, _) = watch::channel(SyncPhase::Uninitialized);
        let (persist_tx, _) = watch::channel(None);
        Arc::new(Self {
            state: Arc::new(SyncState {
                service,
                path: path.into(),
                phase,
                loaded: AtomicBool::new(false),
                watch_id: Mutex::new(None),
                persist_tx,
            }),
            tasks: Mutex::new(Vec::new()),
            _data: PhantomData,
        })
    }
}

impl<D> SyncMiddleware<D> {
    pub fn path(&self) -> &str {
        &self.state.path
    }

    pub fn phase(&self) -> SyncPhase {
        *self.state.phase.borrow()
    }

    /// Wait until the store reaches `phase`.
    pub async fn wait_for_phase(&self, phase: SyncPhase) {
        let mut phases = self.state.phase.subscribe();
        // The sender lives as long as `self`
        let _ = phases.wait_for(|current| *current == phase).await;
    }

    /// Id of the file watcher, once installed.
    pub fn watch_id(&self) -> Option<String> {
        self.state
            .watch_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<D> Drop for SyncMiddleware<D> {
    fn drop(&mut self) {
        for task in self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

impl<D, A> StoreMiddleware<D, A> for SyncMiddleware<D>
where
    D: SyncData,
    A: Send + Sync + 'static,
{
    fn attach(&self, store: &Store<D, A>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime, {} will not be synced", self.state.path);
            return;
        };
        self.state.set_phase(SyncPhase::WaitingForConnection);

        let persist = runtime.spawn(persist_loop(
            Arc::clone(&self.state),
            self.state.persist_tx.subscribe(),
        ));
        let lifecycle = runtime.spawn(lifecycle_loop(
            Arc::clone(&self.state),
            store.downgrade(),
            self.state.service.subscribe_connection_state(),
        ));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([persist, lifecycle]);
    }

    fn after_set(&self, data: &D) {
        if !self.state.is_loaded() {
            debug!("{} not loaded yet, local change stays local", self.state.path);
            return;
        }
        match serde_json::to_value(data) {
            Ok(content) => {
                self.state.persist_tx.send_replace(Some(content));
            }
            Err(e) => warn!("Failed to serialize store for {}: {}", self.state.path, e),
        }
    }
}

/// Writes the most recent data. Values queued while a write is in flight
/// collapse into one.
async fn persist_loop(state: Arc<SyncState>, mut pending: watch::Receiver<Option<Value>>) {
    while pending.changed().await.is_ok() {
        let content = pending.borrow_and_update().clone();
        if let Some(content) = content {
            state.persist(content).await;
        }
    }
}

async fn lifecycle_loop<D, A>(
    state: Arc<SyncState>,
    store: WeakStore<D, A>,
    mut connection: watch::Receiver<ConnectionState>,
) where
    D: SyncData,
    A: Send + Sync + 'static,
{
    loop {
        let current = *connection.borrow_and_update();
        if current == ConnectionState::Connected && !state.on_connected(&store).await {
            break;
        }
        if connection.changed().await.is_err() {
            break;
        }
    }
    debug!("Sync of {} stopped", state.path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::test_support::{eventually, RecordingTransport, ScriptedTransport};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use vfs_sync_core::{
        DocumentContent, DocumentEngine, PushMessage, WorkerRequest, WorkerResponse,
    };
    use vfs_sync_worker::{InProcessOptions, MemoryEngine};

    const STATE_PATH: &str = "/counter-state.json";
    const MANIFEST: &str = "http://127.0.0.1:1/manifest.json";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        counter: i64,
        #[serde(default)]
        label: String,
    }

    type Action = Arc<dyn Fn(&Store<Counter, CounterActions>) + Send + Sync>;

    struct CounterActions {
        increment: Action,
    }

    fn counter_config() -> StoreConfig<Counter, CounterActions> {
        StoreConfig::new(
            Counter {
                counter: 0,
                label: "initial".to_string(),
            },
            CounterActions {
                increment: Arc::new(|store: &Store<Counter, CounterActions>| {
                    store.update(|data| data.counter += 1)
                }),
            },
        )
    }

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            request_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            manifest_timeout: Duration::from_secs(2),
            ..ServiceConfig::default()
        }
    }

    fn recorded_service() -> (VfsService, Arc<MemoryEngine>, Arc<RecordingTransport>) {
        let engine = Arc::new(MemoryEngine::new());
        let transport = RecordingTransport::with_options(
            engine.clone(),
            InProcessOptions {
                auto_initialized: true,
            },
        );
        let service = VfsService::new(transport.clone(), test_config());
        (service, engine, transport)
    }

    fn synced_store(
        service: &VfsService,
    ) -> (Store<Counter, CounterActions>, Arc<SyncMiddleware<Counter>>) {
        let middleware = SyncMiddleware::new(service.clone(), STATE_PATH);
        let store = Store::new(counter_config().with_middleware(middleware.clone()));
        (store, middleware)
    }

    async fn watching(middleware: &SyncMiddleware<Counter>) {
        timeout(Duration::from_secs(2), middleware.wait_for_phase(SyncPhase::Watching))
            .await
            .expect("store never reached Watching");
    }

    async fn wait_for_stored_counter(engine: &MemoryEngine, expected: i64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let stored = engine.read_file(STATE_PATH).await.ok();
            if stored.as_ref().map(|d| d.content["counter"].clone()) == Some(json!(expected)) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "stored counter never reached {}, last seen {:?}",
                expected,
                stored
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_absent_file_is_created_from_store() {
        let (service, engine, transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();

        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;

        assert_eq!(transport.count("exists"), 1);
        assert_eq!(transport.count("readFile"), 0);
        let writes = transport.posted_of("writeFile");
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            writes[0].request,
            WorkerRequest::WriteFile { create: true, .. }
        ));
        assert_eq!(
            engine.read_file(STATE_PATH).await.unwrap().content,
            json!({"counter": 0, "label": "initial"})
        );
        assert_eq!(store.get().counter, 0);
        assert!(middleware.watch_id().is_some());
    }

    #[tokio::test]
    async fn test_existing_file_is_loaded_with_actions_intact() {
        let (service, engine, transport) = recorded_service();
        engine
            .write_file(STATE_PATH, json!({"counter": 42}), true)
            .await
            .unwrap();
        service.initialize(MANIFEST, None).await.unwrap();

        let (store, middleware) = synced_store(&service);
        let increment = Arc::clone(&store.actions().increment);
        watching(&middleware).await;

        // Fields absent from the file take their defaults
        assert_eq!(
            store.get(),
            Counter {
                counter: 42,
                label: String::new(),
            }
        );
        assert!(Arc::ptr_eq(&increment, &store.actions().increment));
        assert_eq!(transport.count("readFile"), 1);
        assert_eq!(transport.count("writeFile"), 0);
    }

    #[tokio::test]
    async fn test_remote_change_replaces_data_only() {
        let (service, engine, transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;
        let increment = Arc::clone(&store.actions().increment);

        engine
            .apply_remote(STATE_PATH, DocumentContent::json(json!({"counter": 100})))
            .await
            .unwrap();

        eventually("remote counter", || store.get().counter == 100).await;
        assert!(Arc::ptr_eq(&increment, &store.actions().increment));
        // The label was removed remotely
        assert_eq!(store.get().label, "");
        // Merges are not written back
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count("writeFile"), 1);
    }

    #[tokio::test]
    async fn test_burst_of_local_changes_persists_final_state() {
        let (service, engine, _transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;

        for _ in 0..25 {
            (store.actions().increment)(&store);
        }

        wait_for_stored_counter(&engine, 25).await;
        eventually("store settles", || store.get().counter == 25).await;
    }

    #[tokio::test]
    async fn test_interleaved_writes_settle_on_last_value() {
        let (service, engine, _transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;

        // Change notifications for earlier writes race with later updates
        for value in 1..=25 {
            store.update(|data| data.counter = value);
            tokio::task::yield_now().await;
        }

        wait_for_stored_counter(&engine, 25).await;
        eventually("store settles", || store.get().counter == 25).await;
    }

    #[tokio::test]
    async fn test_remote_change_matching_an_earlier_write_is_applied() {
        let (service, engine, transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;

        // Same data as the file, so the worker reports no change
        store.update(|data| data.counter = 0);
        eventually("unchanged write sent", || transport.count("writeFile") == 2).await;

        engine
            .apply_remote(
                STATE_PATH,
                DocumentContent::json(json!({"counter": 5, "label": "initial"})),
            )
            .await
            .unwrap();
        eventually("remote counter", || store.get().counter == 5).await;

        engine
            .apply_remote(
                STATE_PATH,
                DocumentContent::json(json!({"counter": 0, "label": "initial"})),
            )
            .await
            .unwrap();
        eventually("remote reset", || store.get().counter == 0).await;
        assert_eq!(
            engine.read_file(STATE_PATH).await.unwrap().content,
            json!({"counter": 0, "label": "initial"})
        );
    }

    #[tokio::test]
    async fn test_change_during_create_is_written_after_load() {
        let transport = ScriptedTransport::auto_ready();
        transport.set_responder(|envelope| match &envelope.request {
            // Held until the test answers it
            WorkerRequest::WriteFile { create: true, .. } => None,
            WorkerRequest::Exists { .. } => Some(WorkerResponse::ok(envelope, Some(Value::Bool(false)))),
            _ => Some(WorkerResponse::ok(envelope, None)),
        });
        let service = VfsService::new(transport.clone(), test_config());
        service.initialize(MANIFEST, None).await.unwrap();

        let (store, middleware) = synced_store(&service);
        transport.wait_for_posts(2).await;
        let create = transport.posted_of("writeFile").remove(0);
        assert!(matches!(create.request, WorkerRequest::WriteFile { create: true, .. }));
        assert_eq!(middleware.phase(), SyncPhase::Loading);

        store.update(|data| data.counter = 7);
        transport.respond(WorkerResponse::ok(&create, None));
        watching(&middleware).await;

        eventually("change written", || {
            transport.posted_of("writeFile").iter().any(|envelope| {
                matches!(
                    &envelope.request,
                    WorkerRequest::WriteFile { content, create: false, .. } if content["counter"] == json!(7)
                )
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_deleted_file_is_recreated_on_write() {
        let (service, engine, transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;

        engine.delete_file(STATE_PATH).await.unwrap();
        store.update(|data| data.counter = 9);

        wait_for_stored_counter(&engine, 9).await;
        let creates = transport
            .posted_of("writeFile")
            .into_iter()
            .filter(|envelope| matches!(envelope.request, WorkerRequest::WriteFile { create: true, .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_local_changes_before_connection_are_not_written() {
        let (service, engine, transport) = recorded_service();
        let (store, middleware) = synced_store(&service);
        assert_eq!(middleware.phase(), SyncPhase::WaitingForConnection);

        (store.actions().increment)(&store);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count("writeFile"), 0);

        // The file is created from whatever the store holds on first connect
        service.initialize(MANIFEST, None).await.unwrap();
        watching(&middleware).await;
        wait_for_stored_counter(&engine, 1).await;
        assert_eq!(transport.count("writeFile"), 1);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_watcher_without_reloading() {
        let (service, engine, transport) = recorded_service();
        service.initialize(MANIFEST, None).await.unwrap();
        let (store, middleware) = synced_store(&service);
        watching(&middleware).await;
        let watch_id = middleware.watch_id().unwrap();

        let host = transport.host().unwrap();
        host.disconnect();
        eventually("disconnected", || {
            service.connection_state() == ConnectionState::Disconnected
        })
        .await;
        host.reconnect();
        eventually("watch restored", || host.has_watch(&watch_id)).await;

        engine
            .apply_remote(STATE_PATH, DocumentContent::json(json!({"counter": 7})))
            .await
            .unwrap();
        eventually("remote counter", || store.get().counter == 7).await;

        assert_eq!(middleware.watch_id(), Some(watch_id));
        assert_eq!(transport.count("exists"), 1);
        assert_eq!(middleware.phase(), SyncPhase::Watching);
    }

    #[tokio::test]
    async fn test_failed_load_retries_on_next_connection() {
        let transport = ScriptedTransport::auto_ready();
        transport.set_responder(|envelope| match envelope.request.kind() {
            "exists" => Some(WorkerResponse::failed(envelope, "store unavailable")),
            _ => Some(WorkerResponse::ok(envelope, None)),
        });
        let service = VfsService::new(transport.clone(), test_config());
        service.initialize(MANIFEST, None).await.unwrap();

        let (store, middleware) = synced_store(&service);
        transport.wait_for_posts(1).await;
        eventually("back to waiting", || {
            middleware.phase() == SyncPhase::WaitingForConnection
        })
        .await;
        assert_eq!(store.get().counter, 0);
        assert!(transport.posted_of("writeFile").is_empty());

        transport.set_responder(|envelope| {
            let data = (envelope.request.kind() == "exists").then_some(Value::Bool(false));
            Some(WorkerResponse::ok(envelope, data))
        });
        transport.push(PushMessage::Disconnected);
        transport.push(PushMessage::Reconnected);

        watching(&middleware).await;
        assert_eq!(transport.posted_of("exists").len(), 2);
        assert_eq!(transport.posted_of("writeFile").len(), 1);
    }

    #[tokio::test]
    async fn test_sync_without_path_is_passthrough() {
        let (service, _engine, _transport) = recorded_service();

        let config = sync(counter_config(), &service, SyncOptions::default());
        assert!(config.middleware.is_empty());

        let config = sync(counter_config(), &service, SyncOptions::path(STATE_PATH));
        assert_eq!(config.middleware.len(), 1);
    }

    #[test]
    fn test_merge_replaces_full_data() {
        let merged: Counter =
            merge_data(&json!({"counter": 5, "label": "remote", "unknown": true})).unwrap();
        assert_eq!(
            merged,
            Counter {
                counter: 5,
                label: "remote".to_string(),
            }
        );

        // A removed field does not survive the merge
        let merged: Counter = merge_data(&json!({"counter": 2})).unwrap();
        assert_eq!(merged.label, "");

        let err = merge_data::<Counter>(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, VfsError::InvalidArgument(_)));
        let err = merge_data::<Counter>(&json!({"counter": "five"})).unwrap_err();
        assert!(matches!(err, VfsError::Serialization(_)));
    }
}
