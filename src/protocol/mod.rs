//! Wire protocol types shared by the client and the worker.
//!
//! Both directions carry framed JSON envelopes (see [`frame`]): requests
//! hold a correlation `idx`, a command and its positional parameters;
//! responses echo the `idx` with exactly one of `result` or `error`.

pub mod frame;

pub use frame::{encode_frame, shutdown_frame, Frame, FrameDecoder, MAX_FRAME_LEN};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::worker::DriverFailure;

/// A fetched row: field-name-to-value mapping in column order.
pub type Row = serde_json::Map<String, Value>;

/// Commands the worker understands.
///
/// Closed set. Anything else on the wire deserializes as
/// [`Command::Unknown`] and is answered with an `UnknownCommand` error
/// response instead of tearing the connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish the driver connection.
    Open,
    /// Prepare and execute a statement; reply with a row-count summary.
    Exec,
    /// Execute and fetch a single row.
    QueryOne,
    /// Execute and fetch all rows.
    QueryAll,
    /// Fallback for unrecognized command strings.
    Unknown,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Open => "open",
            Command::Exec => "exec",
            Command::QueryOne => "queryOne",
            Command::QueryAll => "queryAll",
            Command::Unknown => "unknown",
        }
    }

    fn parse(tag: &str) -> Self {
        match tag {
            "open" => Command::Open,
            "exec" => Command::Exec,
            "queryOne" => Command::QueryOne,
            "queryAll" => Command::QueryAll,
            _ => Command::Unknown,
        }
    }
}

impl Serialize for Command {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Command::parse(&tag))
    }
}

/// Request envelope sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id; unique among in-flight requests.
    pub idx: u64,
    /// Operation to perform.
    pub cmd: Command,
    /// Positional parameters for the operation.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Response envelope received from the worker.
///
/// Exactly one of `result` / `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id of the request this answers.
    pub idx: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl ResponseEnvelope {
    pub fn ok(idx: u64, result: Value) -> Self {
        Self {
            idx,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(idx: u64, error: ErrorRecord) -> Self {
        Self {
            idx,
            result: None,
            error: Some(error),
        }
    }
}

/// Wire values for [`ErrorRecord::kind`].
pub mod error_kind {
    pub const DRIVER: &str = "DriverError";
    pub const UNKNOWN_COMMAND: &str = "UnknownCommand";
    pub const LEAKED_OUTPUT: &str = "LeakedOutput";
    pub const INVALID_REQUEST: &str = "InvalidRequest";
}

/// Structured failure reported by the worker, correlated by `idx`.
///
/// The three optional fields carry vendor diagnostics and are populated
/// only when the failure originated inside the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Failure classification; one of the [`error_kind`] values.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
    /// Worker-side context string, carried for composite reporting.
    #[serde(default)]
    pub stack: String,
    /// SQLSTATE code, when the driver exposed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    /// Vendor-specific error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_code: Option<String>,
    /// Vendor-specific error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_message: Option<String>,
}

impl ErrorRecord {
    /// A worker-detected failure with no vendor diagnostics.
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            stack: String::new(),
            sql_state: None,
            driver_code: None,
            driver_message: None,
        }
    }

    /// Build the record for a driver failure, attaching whatever vendor
    /// diagnostics the driver surfaced.
    pub fn from_driver(failure: DriverFailure) -> Self {
        Self {
            kind: error_kind::DRIVER.to_string(),
            message: failure.message,
            stack: failure.context,
            sql_state: failure.sql_state,
            driver_code: failure.driver_code,
            driver_message: failure.driver_message,
        }
    }

    /// Message and worker-side stack joined into one report, the way the
    /// controller re-throws it to the original caller.
    pub fn composite_stack(&self) -> String {
        if self.stack.is_empty() {
            self.message.clone()
        } else {
            format!("{}\n{}", self.message, self.stack)
        }
    }
}

/// Options fixed at connection-open time.
///
/// Immutable after construction. Serialized (camelCase) as the last
/// parameter of the `open` command so the worker applies the same
/// configuration the client was built with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    /// Path to the worker executable.
    pub worker_path: PathBuf,
    /// Rewrite `?` placeholders client-side before sending. Disable when
    /// the driver's native placeholder syntax is used directly.
    pub expand_placeholders: bool,
    /// Release the statement cursor as soon as `exec` completes.
    pub close_cursor_after_exec: bool,
    /// Fetch every column value as a string.
    pub stringify_fetches: bool,
    /// Ask the driver to emulate prepared statements.
    pub emulate_prepares: bool,
    /// Driver-level connection timeout in seconds; 0 keeps the driver
    /// default. Not a per-request timeout.
    pub timeout_seconds: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            worker_path: PathBuf::from("sqlbridge-worker"),
            expand_placeholders: true,
            close_cursor_after_exec: false,
            stringify_fetches: false,
            emulate_prepares: false,
            timeout_seconds: 0,
        }
    }
}

/// Result summary of an `exec` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecSummary {
    /// Rows affected (DML) or produced (queries).
    pub row_count: u64,
}
