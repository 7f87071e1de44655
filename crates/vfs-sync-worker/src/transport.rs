use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vfs_sync_core::{
    DocumentEngine, InboundReceiver, PushMessage, RequestEnvelope, VfsError, WorkerTransport,
};

use crate::host::WorkerHost;

/// Startup behaviour of the in-process worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessOptions {
    /// Report that the worker restored its state from cache and needs no bundle.
    pub auto_initialized: bool,
}

/// A live worker context.
struct Connection {
    requests: mpsc::UnboundedSender<RequestEnvelope>,
    host: Arc<WorkerHost>,
    task: JoinHandle<()>,
}

/// `WorkerTransport` that runs a `WorkerHost` as a tokio task.
///
/// `connect` spawns a fresh host over the shared engine and immediately
/// queues the `swReady` handshake message.
pub struct InProcessTransport {
    engine: Arc<dyn DocumentEngine>,
    options: InProcessOptions,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl InProcessTransport {
    /// Create a transport over `engine` with default options.
    pub fn new(engine: Arc<dyn DocumentEngine>) -> Self {
        Self::with_options(engine, InProcessOptions::default())
    }

    /// Create a transport over `engine`.
    pub fn with_options(engine: Arc<dyn DocumentEngine>, options: InProcessOptions) -> Self {
        Self {
            engine,
            options,
            connection: Mutex::new(None),
        }
    }

    /// The host of the current connection, if connected.
    ///
    /// Used to drive relay drops and reconnects.
    pub fn host(&self) -> Option<Arc<WorkerHost>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|conn| Arc::clone(&conn.host))
    }
}

#[async_trait]
impl WorkerTransport for InProcessTransport {
    async fn connect(&self) -> Result<InboundReceiver, VfsError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let host = WorkerHost::new(Arc::clone(&self.engine), outbound_tx);
        let task = host.spawn(requests_rx);

        host.push(PushMessage::SwReady {
            auto_initialized: self.options.auto_initialized,
            needs_bundle: Some(!self.options.auto_initialized),
        });

        let previous = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Connection {
                requests: requests_tx,
                host,
                task,
            });
        if let Some(previous) = previous {
            debug!("Replacing previous worker context");
            previous.task.abort();
        }

        info!(
            "In-process worker started (auto_initialized={})",
            self.options.auto_initialized
        );
        Ok(outbound_rx)
    }

    fn post(&self, envelope: RequestEnvelope) -> Result<(), VfsError> {
        let guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => conn
                .requests
                .send(envelope)
                .map_err(|_| VfsError::Transport("worker stopped".to_string())),
            None => Err(VfsError::Transport("worker not connected".to_string())),
        }
    }

    async fn terminate(&self) {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = connection {
            conn.task.abort();
            info!("In-process worker terminated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEngine;
    use vfs_sync_core::{WorkerMessage, WorkerRequest};

    #[tokio::test]
    async fn test_connect_sends_ready_handshake() {
        let transport = InProcessTransport::with_options(
            Arc::new(MemoryEngine::new()),
            InProcessOptions {
                auto_initialized: true,
            },
        );

        let mut rx = transport.connect().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            WorkerMessage::Push(PushMessage::SwReady {
                auto_initialized: true,
                needs_bundle: Some(false)
            })
        );
        assert!(transport.host().is_some());
    }

    #[tokio::test]
    async fn test_post_requires_connection() {
        let transport = InProcessTransport::new(Arc::new(MemoryEngine::new()));
        let err = transport
            .post(RequestEnvelope::new("req-1", WorkerRequest::GetServerUrl))
            .unwrap_err();
        assert!(matches!(err, VfsError::Transport(_)));

        let mut rx = transport.connect().await.unwrap();
        rx.recv().await.unwrap(); // swReady
        transport
            .post(RequestEnvelope::new("req-2", WorkerRequest::GetServerUrl))
            .unwrap();
        match rx.recv().await.unwrap() {
            WorkerMessage::Response(resp) => assert_eq!(resp.id.as_deref(), Some("req-2")),
            other => panic!("unexpected message: {:?}", other),
        }

        transport.terminate().await;
        assert!(transport.host().is_none());
        assert!(transport
            .post(RequestEnvelope::new("req-3", WorkerRequest::GetServerUrl))
            .is_err());
    }
}
