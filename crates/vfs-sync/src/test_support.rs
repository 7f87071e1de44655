//! Transports for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use vfs_sync_core::{
    DocumentEngine, InboundReceiver, InboundSender, PushMessage, RequestEnvelope, VfsError,
    WorkerMessage, WorkerResponse, WorkerTransport,
};
use vfs_sync_worker::{InProcessOptions, InProcessTransport, WorkerHost};

type Responder = dyn Fn(&RequestEnvelope) -> Option<WorkerResponse> + Send + Sync;

/// Transport whose worker is played by the test.
///
/// Every posted envelope is recorded. A responder closure may answer
/// requests automatically; anything it leaves unanswered can be answered
/// later with `respond`.
pub(crate) struct ScriptedTransport {
    posted: Mutex<Vec<RequestEnvelope>>,
    inbound: Mutex<Option<InboundSender>>,
    ready: Option<PushMessage>,
    responder: Mutex<Option<Arc<Responder>>>,
    fail_posts: AtomicBool,
    posts: Notify,
}

impl ScriptedTransport {
    pub(crate) fn new(ready: Option<PushMessage>) -> Arc<Self> {
        Arc::new(Self {
            posted: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            ready,
            responder: Mutex::new(None),
            fail_posts: AtomicBool::new(false),
            posts: Notify::new(),
        })
    }

    /// Never signals readiness and never answers.
    pub(crate) fn silent() -> Arc<Self> {
        Self::new(None)
    }

    /// Signals a cached worker on connect and answers every request
    /// successfully (`exists` answers `false`).
    pub(crate) fn auto_ready() -> Arc<Self> {
        let transport = Self::new(Some(PushMessage::SwReady {
            auto_initialized: true,
            needs_bundle: Some(false),
        }));
        transport.set_responder(|envelope| {
            let data = match envelope.request.kind() {
                "exists" => Some(Value::Bool(false)),
                _ => None,
            };
            Some(WorkerResponse::ok(envelope, data))
        });
        transport
    }

    pub(crate) fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&RequestEnvelope) -> Option<WorkerResponse> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(responder));
    }

    /// Deliver a push message to the client.
    pub(crate) fn push(&self, message: PushMessage) {
        self.deliver(WorkerMessage::Push(message));
    }

    /// Deliver a response to the client.
    pub(crate) fn respond(&self, response: WorkerResponse) {
        self.deliver(WorkerMessage::Response(response));
    }

    pub(crate) fn posted(&self) -> Vec<RequestEnvelope> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Posted envelopes of one request kind, e.g. `"watchFile"`.
    pub(crate) fn posted_of(&self, kind: &str) -> Vec<RequestEnvelope> {
        self.posted()
            .into_iter()
            .filter(|envelope| envelope.request.kind() == kind)
            .collect()
    }

    /// Wait until at least `count` envelopes were posted. Panics after 2s.
    pub(crate) async fn wait_for_posts(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.posts.notified();
                if self.posted.lock().unwrap_or_else(PoisonError::into_inner).len() >= count {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(2), wait).await.is_err() {
            panic!(
                "expected {} posted requests, saw {}",
                count,
                self.posted().len()
            );
        }
    }

    pub(crate) fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    fn deliver(&self, message: WorkerMessage) {
        if let Some(tx) = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(message);
        }
    }
}

#[async_trait]
impl WorkerTransport for ScriptedTransport {
    async fn connect(&self) -> Result<InboundReceiver, VfsError> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(ready) = &self.ready {
            let _ = tx.send(WorkerMessage::Push(ready.clone()));
        }
        *self.inbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }

    fn post(&self, envelope: RequestEnvelope) -> Result<(), VfsError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(VfsError::Transport("scripted post failure".to_string()));
        }
        let responder = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let reply = responder.and_then(|respond| respond(&envelope));

        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
        self.posts.notify_waiters();

        if let Some(reply) = reply {
            self.respond(reply);
        }
        Ok(())
    }

    async fn terminate(&self) {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// `InProcessTransport` that records what the client posts.
pub(crate) struct RecordingTransport {
    inner: InProcessTransport,
    posted: Mutex<Vec<RequestEnvelope>>,
}

impl RecordingTransport {
    pub(crate) fn new(engine: Arc<dyn DocumentEngine>) -> Arc<Self> {
        Self::with_options(engine, InProcessOptions::default())
    }

    pub(crate) fn with_options(engine: Arc<dyn DocumentEngine>, options: InProcessOptions) -> Arc<Self> {
        Arc::new(Self {
            inner: InProcessTransport::with_options(engine, options),
            posted: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn host(&self) -> Option<Arc<WorkerHost>> {
        self.inner.host()
    }

    /// Number of posted requests of one kind.
    pub(crate) fn count(&self, kind: &str) -> usize {
        self.posted_of(kind).len()
    }

    pub(crate) fn posted_of(&self, kind: &str) -> Vec<RequestEnvelope> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|envelope| envelope.request.kind() == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WorkerTransport for RecordingTransport {
    async fn connect(&self) -> Result<InboundReceiver, VfsError> {
        self.inner.connect().await
    }

    fn post(&self, envelope: RequestEnvelope) -> Result<(), VfsError> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
        self.inner.post(envelope)
    }

    async fn terminate(&self) {
        self.inner.terminate().await
    }
}

/// Poll `condition` every 10ms. Panics after 2s.
pub(crate) async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
