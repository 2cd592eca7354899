//! Client-facing error types.

use std::io;

use thiserror::Error;

use crate::protocol::ErrorRecord;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to callers of [`BridgeClient`](crate::client::BridgeClient).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Worker process could not be started. Terminal: no requests are
    /// possible on this client.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to write a frame to worker stdin.
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read from worker stdout.
    #[error("failed to read from worker: {0}")]
    ReadFailed(#[source] io::Error),

    /// Failed to serialize a request to JSON.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize a result value.
    #[error("failed to deserialize result: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// Placeholder count and parameter count disagree. Detected before
    /// anything crosses the wire; the call fails synchronously.
    #[error("number of parameters ({params}) doesn't match number of placeholders (at least {placeholders})")]
    ParameterCountMismatch {
        /// Placeholders consumed when the parameter list ran out.
        placeholders: usize,
        /// Parameters supplied.
        params: usize,
    },

    /// The pipe ended while requests were pending, or a send was attempted
    /// after the transport shut down.
    #[error("transport closed: {reason}")]
    TransportClosed { reason: String },

    /// The byte stream can no longer be trusted (bad length prefix or
    /// non-JSON payload). Fatal to the connection.
    #[error("protocol decode failure: {0}")]
    ProtocolDecode(String),

    /// A structured error reported by the worker, re-thrown to the caller
    /// of the matching request with its diagnostic fields preserved.
    #[error("worker error: {} (type: {})", .0.message, .0.kind)]
    Remote(ErrorRecord),
}

impl BridgeError {
    pub fn transport_closed(reason: impl Into<String>) -> Self {
        Self::TransportClosed {
            reason: reason.into(),
        }
    }

    /// The worker-reported record, when this error crossed the wire.
    pub fn remote(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Remote(record) => Some(record),
            _ => None,
        }
    }

    /// Whether the transport is gone and further sends would fail fast.
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed { .. })
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        Self::WriteFailed(err)
    }
}
