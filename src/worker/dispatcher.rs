//! Worker-side request loop.
//!
//! Reads framed requests off the input stream, executes them one at a time
//! against the driver and writes a framed response for each. The loop
//! never reads the next frame before the current request has been fully
//! answered; pipelined client requests queue in the pipe and are served in
//! arrival order.

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::driver::{Driver, DriverAttributes};
use crate::protocol::{
    encode_frame, error_kind, Command, ConnectionOptions, ErrorRecord, Frame, FrameDecoder,
    RequestEnvelope, ResponseEnvelope,
};

/// Worker-side fatal error: the connection can no longer be trusted.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to read request stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write response stream: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// Malformed length prefix or non-JSON request payload. The stream is
    /// desynchronized; there is no recovery.
    #[error("protocol decode failure: {0}")]
    Decode(String),
}

/// Per-connection dispatcher state.
///
/// One instance owns at most one driver connection and the options that
/// arrived with it; there are no process globals.
pub struct Dispatcher<D: Driver> {
    driver: D,
    conn: Option<D::Connection>,
    close_cursor_after_exec: bool,
}

impl<D: Driver> Dispatcher<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            conn: None,
            close_cursor_after_exec: false,
        }
    }

    /// Serve framed requests from `input`, writing responses to `output`,
    /// until a zero-length frame or end of stream.
    ///
    /// `output` is exclusively owned here; nothing else in the worker can
    /// interleave bytes with the response frames.
    pub async fn serve<R, W>(&mut self, mut input: R, mut output: W) -> Result<(), ServeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 8 * 1024];

        loop {
            let n = input.read(&mut buf).await.map_err(ServeError::Read)?;
            if n == 0 {
                return Ok(());
            }
            decoder.extend(&buf[..n]);

            while let Some(frame) = decoder
                .next_frame()
                .map_err(|e| ServeError::Decode(e.to_string()))?
            {
                let payload = match frame {
                    Frame::Shutdown => return Ok(()),
                    Frame::Message(payload) => payload,
                };
                let request: RequestEnvelope = serde_json::from_slice(&payload)
                    .map_err(|e| ServeError::Decode(e.to_string()))?;

                let response = self.dispatch(request).await;
                let body = serde_json::to_vec(&response).map_err(ServeError::Encode)?;
                output
                    .write_all(&encode_frame(&body))
                    .await
                    .map_err(ServeError::Write)?;
                output.flush().await.map_err(ServeError::Write)?;
            }
        }
    }

    /// Execute one request, turning every failure into a structured error
    /// response correlated by the request's `idx`.
    pub async fn dispatch(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        let idx = request.idx;
        match self.run(request.cmd, request.params).await {
            Ok(result) => ResponseEnvelope::ok(idx, result),
            Err(error) => ResponseEnvelope::err(idx, error),
        }
    }

    async fn run(&mut self, cmd: Command, params: Vec<Value>) -> Result<Value, ErrorRecord> {
        match cmd {
            Command::Open => self.open(params).await,
            Command::Exec => self.exec(params).await,
            Command::QueryOne => self.query_one(params).await,
            Command::QueryAll => self.query_all(params).await,
            Command::Unknown => Err(ErrorRecord::new(
                error_kind::UNKNOWN_COMMAND,
                "unexpected command",
            )),
        }
    }

    async fn open(&mut self, mut params: Vec<Value>) -> Result<Value, ErrorRecord> {
        // Connection options ride along as the last parameter.
        let options = match params.last() {
            Some(Value::Object(_)) if params.len() > 1 => {
                let raw = params.pop().expect("last element checked above");
                serde_json::from_value::<ConnectionOptions>(raw).map_err(|e| {
                    ErrorRecord::new(
                        error_kind::INVALID_REQUEST,
                        format!("malformed connection options: {}", e),
                    )
                })?
            }
            _ => ConnectionOptions::default(),
        };

        let Some(Value::String(dsn)) = params.first() else {
            return Err(ErrorRecord::new(
                error_kind::INVALID_REQUEST,
                "open requires a connection string",
            ));
        };

        let attrs = DriverAttributes {
            stringify_fetches: options.stringify_fetches,
            emulate_prepares: options.emulate_prepares,
            timeout_seconds: options.timeout_seconds,
        };
        let conn = self
            .driver
            .connect(dsn, &attrs)
            .await
            .map_err(ErrorRecord::from_driver)?;
        self.conn = Some(conn);
        self.close_cursor_after_exec = options.close_cursor_after_exec;
        Ok(Value::Bool(true))
    }

    async fn exec(&mut self, params: Vec<Value>) -> Result<Value, ErrorRecord> {
        let (sql, bound) = sql_params(&params)?;
        let conn = self.conn.as_mut().ok_or_else(not_connected)?;

        let cursor = self
            .driver
            .prepare_and_execute(conn, sql, &bound)
            .await
            .map_err(ErrorRecord::from_driver)?;
        let row_count = self.driver.row_count(&cursor);
        if self.close_cursor_after_exec {
            self.driver.close_cursor(cursor).await;
        }
        Ok(json!({ "rowCount": row_count }))
    }

    async fn query_one(&mut self, params: Vec<Value>) -> Result<Value, ErrorRecord> {
        let (sql, bound) = sql_params(&params)?;
        let conn = self.conn.as_mut().ok_or_else(not_connected)?;

        let mut cursor = self
            .driver
            .prepare_and_execute(conn, sql, &bound)
            .await
            .map_err(ErrorRecord::from_driver)?;
        let row = self
            .driver
            .fetch_one(&mut cursor)
            .await
            .map_err(ErrorRecord::from_driver)?;
        self.driver.close_cursor(cursor).await;
        Ok(match row {
            Some(row) => Value::Object(row),
            None => Value::Null,
        })
    }

    async fn query_all(&mut self, params: Vec<Value>) -> Result<Value, ErrorRecord> {
        let (sql, bound) = sql_params(&params)?;
        let conn = self.conn.as_mut().ok_or_else(not_connected)?;

        let mut cursor = self
            .driver
            .prepare_and_execute(conn, sql, &bound)
            .await
            .map_err(ErrorRecord::from_driver)?;
        let rows = self
            .driver
            .fetch_all(&mut cursor)
            .await
            .map_err(ErrorRecord::from_driver)?;
        self.driver.close_cursor(cursor).await;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

fn sql_params(params: &[Value]) -> Result<(&str, Vec<Value>), ErrorRecord> {
    let Some(Value::String(sql)) = params.first() else {
        return Err(ErrorRecord::new(
            error_kind::INVALID_REQUEST,
            "statement must be a string",
        ));
    };
    let bound = match params.get(1) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(ErrorRecord::new(
                error_kind::INVALID_REQUEST,
                "statement parameters must be an array",
            ))
        }
    };
    Ok((sql.as_str(), bound))
}

fn not_connected() -> ErrorRecord {
    ErrorRecord::new(error_kind::INVALID_REQUEST, "database not connected")
}
