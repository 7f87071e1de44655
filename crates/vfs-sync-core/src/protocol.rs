//! Worker message protocol.
//!
//! Requests are `{ type, id, ...fields }`. Responses are
//! `{ type, id?, success, data?, error? }`. Unsolicited pushes carry a `type`
//! and no `id`. All field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::DocumentContent;

/// Operations the worker understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: Value,
        create: bool,
    },
    DeleteFile {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
    ListDirectory {
        path: String,
    },
    Exists {
        path: String,
    },
    WatchFile {
        watch_id: String,
        path: String,
    },
    UnwatchFile {
        watch_id: String,
    },
    WatchDirectory {
        watch_id: String,
        path: String,
    },
    UnwatchDirectory {
        watch_id: String,
    },
    ToBytes,
    ForkToBytes,
    ExportBundle,
    LoadBundle {
        /// Base64 encoded bundle bytes
        bundle: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_url: Option<String>,
    },
    InitializeFromUrl {
        url: String,
    },
    InitializeFromBytes {
        /// Base64 encoded store bytes
        bytes: String,
    },
    GetServerUrl,
}

impl WorkerRequest {
    /// Wire name of the request type.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::ReadFile { .. } => "readFile",
            WorkerRequest::WriteFile { .. } => "writeFile",
            WorkerRequest::DeleteFile { .. } => "deleteFile",
            WorkerRequest::Rename { .. } => "rename",
            WorkerRequest::ListDirectory { .. } => "listDirectory",
            WorkerRequest::Exists { .. } => "exists",
            WorkerRequest::WatchFile { .. } => "watchFile",
            WorkerRequest::UnwatchFile { .. } => "unwatchFile",
            WorkerRequest::WatchDirectory { .. } => "watchDirectory",
            WorkerRequest::UnwatchDirectory { .. } => "unwatchDirectory",
            WorkerRequest::ToBytes => "toBytes",
            WorkerRequest::ForkToBytes => "forkToBytes",
            WorkerRequest::ExportBundle => "exportBundle",
            WorkerRequest::LoadBundle { .. } => "loadBundle",
            WorkerRequest::InitializeFromUrl { .. } => "initializeFromUrl",
            WorkerRequest::InitializeFromBytes { .. } => "initializeFromBytes",
            WorkerRequest::GetServerUrl => "getServerUrl",
        }
    }

    /// Bootstrap requests load initial data and may be sent before the
    /// worker is fully operational.
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            WorkerRequest::LoadBundle { .. }
                | WorkerRequest::InitializeFromUrl { .. }
                | WorkerRequest::InitializeFromBytes { .. }
        )
    }
}

/// A request together with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub request: WorkerRequest,
}

impl RequestEnvelope {
    pub fn new(id: impl Into<String>, request: WorkerRequest) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }
}

/// Reply to a request, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    /// Successful reply to `envelope`.
    pub fn ok(envelope: &RequestEnvelope, data: Option<Value>) -> Self {
        Self {
            kind: format!("{}Response", envelope.request.kind()),
            id: Some(envelope.id.clone()),
            success: true,
            data,
            error: None,
        }
    }

    /// Failed reply to `envelope`.
    pub fn failed(envelope: &RequestEnvelope, error: impl Into<String>) -> Self {
        Self {
            kind: format!("{}Response", envelope.request.kind()),
            id: Some(envelope.id.clone()),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Change notification delivered to directory watchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryChange {
    pub watch_id: String,
    pub path: String,
    pub change_data: Value,
}

/// Unsolicited messages from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushMessage {
    SwReady {
        auto_initialized: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        needs_bundle: Option<bool>,
    },
    FileChanged {
        watch_id: String,
        document_data: DocumentContent,
    },
    DirectoryChanged {
        watch_id: String,
        path: String,
        change_data: Value,
    },
    Disconnected,
    Reconnecting {
        attempt: u32,
    },
    Reconnected,
    ReconnectionFailed,
    WatchersReestablished {
        count: usize,
    },
}

/// Anything the worker can send to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Push(PushMessage),
    Response(WorkerResponse),
}
