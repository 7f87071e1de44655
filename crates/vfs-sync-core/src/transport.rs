use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::VfsError;
use crate::protocol::{RequestEnvelope, WorkerMessage};

/// Receiving half of the worker's inbound message stream.
pub type InboundReceiver = mpsc::UnboundedReceiver<WorkerMessage>;

/// Sending half of the worker's inbound message stream.
pub type InboundSender = mpsc::UnboundedSender<WorkerMessage>;

/// Message channel to the worker execution context.
///
/// The worker shares no memory with the client: requests go out through
/// `post`, and everything the worker says (responses and pushes) arrives on
/// the receiver handed out by `connect`.
///
/// Implementations:
/// - In-process worker task (reference implementation, tests)
/// - Web worker / service worker bridges
/// - Out-of-process workers over a pipe or socket
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Establish the worker context and return its inbound message stream.
    ///
    /// Calling `connect` again replaces the previous context.
    async fn connect(&self) -> Result<InboundReceiver, VfsError>;

    /// Deliver a request to the worker without waiting for the reply.
    fn post(&self, envelope: RequestEnvelope) -> Result<(), VfsError>;

    /// Tear down the worker context.
    async fn terminate(&self);
}
