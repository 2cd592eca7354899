//! Driver collaborator seam.
//!
//! The dispatcher talks to the embedded database driver exclusively
//! through this trait. The trait surface has no access to the dispatcher's
//! output sink, so driver activity cannot interleave with the framed
//! response stream.

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::Row;

/// Attributes applied when opening a driver connection, derived from
/// [`ConnectionOptions`](crate::protocol::ConnectionOptions).
#[derive(Debug, Clone, Default)]
pub struct DriverAttributes {
    /// Fetch every column value as a string.
    pub stringify_fetches: bool,
    /// Emulate prepared statements client-side, for drivers that support
    /// the distinction.
    pub emulate_prepares: bool,
    /// Connection-level timeout in seconds; 0 keeps the driver default.
    pub timeout_seconds: u64,
}

/// Failure raised by the driver collaborator.
///
/// Vendor diagnostics are attached when the underlying driver exposes
/// them; `context` carries whatever call-site detail the driver can offer
/// for composite reporting on the controller side.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DriverFailure {
    pub message: String,
    pub context: String,
    pub sql_state: Option<String>,
    pub driver_code: Option<String>,
    pub driver_message: Option<String>,
}

impl DriverFailure {
    /// A failure with no vendor diagnostics attached.
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: String::new(),
            sql_state: None,
            driver_code: None,
            driver_message: None,
        }
    }
}

/// The legacy database driver embedded in the worker.
///
/// Implementations own the actual connection; the dispatcher threads
/// handles through these calls and never exposes them to the controller.
#[async_trait]
pub trait Driver: Send {
    type Connection: Send;
    type Cursor: Send;

    /// Open a connection and apply the configured attributes.
    async fn connect(
        &self,
        dsn: &str,
        attrs: &DriverAttributes,
    ) -> Result<Self::Connection, DriverFailure>;

    /// Prepare a statement, bind `params` positionally and execute it.
    async fn prepare_and_execute(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<Self::Cursor, DriverFailure>;

    /// Fetch the next row, or `None` when the cursor is exhausted.
    async fn fetch_one(&self, cursor: &mut Self::Cursor) -> Result<Option<Row>, DriverFailure>;

    /// Fetch every remaining row.
    async fn fetch_all(&self, cursor: &mut Self::Cursor) -> Result<Vec<Row>, DriverFailure>;

    /// Rows the statement affected (DML) or produced (queries).
    fn row_count(&self, cursor: &Self::Cursor) -> u64;

    /// Release the cursor.
    async fn close_cursor(&self, cursor: Self::Cursor);
}
