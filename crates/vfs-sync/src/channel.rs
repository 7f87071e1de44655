//! Request/response correlation over a `WorkerTransport`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};
use vfs_sync_core::{RequestEnvelope, VfsError, WorkerRequest, WorkerResponse, WorkerTransport};

/// Outcome delivered to a waiting caller.
type Responder = oneshot::Sender<Result<Option<Value>, VfsError>>;

/// Generates request ids that never repeat within a process.
///
/// Ids are `{prefix}-{counter}`; the prefix is random per generator so two
/// services sharing a worker cannot collide either.
#[derive(Debug)]
pub struct RequestIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self {
            prefix: format!("req-{}", &uuid[..8]),
            counter: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Correlates outbound requests with inbound responses.
///
/// Each request registers a one-shot responder under its id before it is
/// posted. The matching response resolves it; otherwise the timeout evicts it.
/// Whichever comes first wins, and a response arriving after eviction is
/// dropped.
pub struct MessageChannel {
    transport: RwLock<Option<Arc<dyn WorkerTransport>>>,
    ready: AtomicBool,
    pending: DashMap<String, Responder>,
    request_timeout: Duration,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("attached", &self.is_attached())
            .field("ready", &self.is_ready())
            .field("pending", &self.pending.len())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl MessageChannel {
    /// Create a detached channel.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            transport: RwLock::new(None),
            ready: AtomicBool::new(false),
            pending: DashMap::new(),
            request_timeout,
        }
    }

    /// Route requests through `transport`. The channel starts out not ready.
    pub fn attach(&self, transport: Arc<dyn WorkerTransport>) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = Some(transport);
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Forget the transport. Subsequent sends fail with `NotInitialized`.
    pub fn detach(&self) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Mark the worker as fully operational (or not).
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send `request` under `id` and wait for the correlated response.
    ///
    /// Resolves with the response payload (`None` for void operations).
    pub async fn send_message(
        &self,
        id: String,
        request: WorkerRequest,
    ) -> Result<Option<Value>, VfsError> {
        let transport = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(VfsError::NotInitialized)?;

        if !self.is_ready() && !request.is_bootstrap() {
            return Err(VfsError::NotReady(request.kind().to_string()));
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(VfsError::InvalidArgument(format!(
                    "request id {} is already pending",
                    id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        let kind = request.kind();
        if let Err(e) = transport.post(RequestEnvelope::new(id.clone(), request)) {
            self.pending.remove(&id);
            return Err(e);
        }
        debug!("Sent {} request {}", kind, id);

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(VfsError::Cancelled(id)),
            Err(_) => {
                self.pending.remove(&id);
                warn!(
                    "{} request {} timed out after {:?}",
                    kind, id, self.request_timeout
                );
                Err(VfsError::Timeout {
                    id,
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Resolve the pending request matching `response`.
    ///
    /// Returns `false` if no request was waiting (unknown id or already
    /// timed out).
    pub fn handle_response(&self, response: WorkerResponse) -> bool {
        let Some(id) = response.id.as_deref() else {
            debug!("Dropping {} without request id", response.kind);
            return false;
        };

        let Some((_, responder)) = self.pending.remove(id) else {
            debug!("Dropping {} for unknown or expired request {}", response.kind, id);
            return false;
        };

        let result = if response.success {
            Ok(response.data)
        } else {
            Err(VfsError::Remote(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        };
        // The caller may have given up already; nothing to do then
        let _ = responder.send(result);
        true
    }

    /// Drop every pending request. Waiting callers observe `Cancelled`.
    pub fn clear_pending(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}
