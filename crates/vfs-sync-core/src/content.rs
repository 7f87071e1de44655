use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VfsError;

/// Payload of a file as exchanged with the worker.
///
/// `content` carries the JSON view of the document. `bytes` is an optional,
/// independent base64 encoding of the raw payload; when present it takes
/// precedence for anything that is not plain JSON (text files saved as raw
/// bytes, binary blobs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
}

impl DocumentContent {
    /// Envelope for a JSON document.
    pub fn json(content: Value) -> Self {
        Self {
            content,
            bytes: None,
        }
    }

    /// Envelope for a raw payload. `content` is left null.
    pub fn binary(data: &[u8]) -> Self {
        Self {
            content: Value::Null,
            bytes: Some(STANDARD.encode(data)),
        }
    }

    /// Whether a raw byte encoding is attached.
    pub fn has_bytes(&self) -> bool {
        self.bytes.is_some()
    }

    /// Decode the attached byte encoding, if any.
    pub fn decoded_bytes(&self) -> Result<Option<Vec<u8>>, VfsError> {
        match &self.bytes {
            Some(encoded) => Ok(Some(STANDARD.decode(encoded)?)),
            None => Ok(None),
        }
    }

    /// Reconstruct the raw payload.
    ///
    /// `bytes` wins when present. Otherwise a string `content` is returned as
    /// UTF-8 text and any other value as its JSON serialization.
    pub fn to_payload(&self) -> Result<Vec<u8>, VfsError> {
        if let Some(data) = self.decoded_bytes()? {
            return Ok(data);
        }
        match &self.content {
            Value::String(text) => Ok(text.clone().into_bytes()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }
}
