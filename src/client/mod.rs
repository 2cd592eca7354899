//! Async client half: worker lifecycle, framed transport and request API.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Controller (Rust + Tokio)                  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  BridgeClient (async)                  │  │
//! │  │  - spawns the driver worker as a child process         │  │
//! │  │  - length-prefixed JSON frames over stdin/stdout       │  │
//! │  │  - monotonic idx correlates pipelined requests         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                 stdin (frames) │ stdout (frames)             │
//! └────────────────────────────────┼─────────────────────────────┘
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │       Worker (long-running child, embedded SQL driver)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Many requests may be in flight at once; the worker executes them
//! strictly in arrival order and the reader task resolves each response
//! back to the caller awaiting its `idx`.

mod expand;
mod jobs;

pub use expand::{expand, Expansion};
pub use jobs::{JobOutcome, JobRegistry};

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as WorkerCommand};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{
    encode_frame, shutdown_frame, Command, ConnectionOptions, ExecSummary, Frame, FrameDecoder,
    RequestEnvelope, ResponseEnvelope, Row,
};

/// Async client for a driver worker process.
///
/// # Example
///
/// ```ignore
/// use sqlbridge::{BridgeClient, ConnectionOptions};
///
/// let client = BridgeClient::spawn(ConnectionOptions::default())?;
/// client.open(":memory:").await?;
/// let rows = client
///     .query_all("SELECT * FROM t WHERE id IN (?)", vec![json!([1, 2, 3])])
///     .await?;
/// client.close().await?;
/// ```
pub struct BridgeClient {
    /// Options this client was built with; re-sent on `open`.
    options: ConnectionOptions,

    /// Writer for framed requests to worker stdin.
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,

    /// In-flight request registry.
    jobs: Arc<JobRegistry>,

    /// Set by `close()`; lets sends fail fast and marks the EOF that
    /// follows as orderly.
    close_requested: Arc<AtomicBool>,

    /// Handle to the worker child process.
    _child: Child,

    /// Handle to the background reader task.
    reader_task: tokio::task::JoinHandle<()>,
}

impl BridgeClient {
    /// Spawn the worker named by `options.worker_path`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpawnFailed`] if the worker process cannot be
    /// started; no requests are possible on this client afterwards.
    pub fn spawn(options: ConnectionOptions) -> BridgeResult<Self> {
        let mut child = WorkerCommand::new(&options.worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(BridgeError::SpawnFailed)?;

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");

        let stdin = Arc::new(Mutex::new(BufWriter::new(stdin)));
        let jobs = Arc::new(JobRegistry::new());
        let close_requested = Arc::new(AtomicBool::new(false));

        let reader_task = Self::spawn_reader_task(stdout, jobs.clone(), close_requested.clone());

        Ok(Self {
            options,
            stdin,
            jobs,
            close_requested,
            _child: child,
            reader_task,
        })
    }

    /// Spawn using a settings file's worker path and default options.
    pub fn spawn_with_settings(settings: &Settings) -> BridgeResult<Self> {
        let mut options = settings.connection_options();
        options.worker_path = settings
            .resolve_worker_path()
            .map_err(|e| BridgeError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                e.to_string(),
            )))?;
        Self::spawn(options)
    }

    /// Spawn the background task that decodes response frames and settles
    /// pending jobs. When the stream ends for any reason, every job still
    /// pending is rejected so no caller hangs forever.
    fn spawn_reader_task(
        mut stdout: ChildStdout,
        jobs: Arc<JobRegistry>,
        close_requested: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = vec![0u8; 8 * 1024];

            let reason: String = 'transport: loop {
                let n = match stdout.read(&mut buf).await {
                    Ok(0) => {
                        if close_requested.load(Ordering::SeqCst) {
                            break 'transport "transport closed".to_string();
                        }
                        break 'transport "worker process exited unexpectedly".to_string();
                    }
                    Ok(n) => n,
                    Err(e) => {
                        eprintln!("sqlbridge: read error: {}", e);
                        break 'transport format!("failed to read from worker: {}", e);
                    }
                };
                decoder.extend(&buf[..n]);

                loop {
                    match decoder.next_frame() {
                        Ok(None) => break,
                        Ok(Some(Frame::Shutdown)) => {
                            break 'transport "transport closed".to_string();
                        }
                        Ok(Some(Frame::Message(payload))) => {
                            match serde_json::from_slice::<ResponseEnvelope>(&payload) {
                                Ok(response) => Self::settle_response(&jobs, response).await,
                                Err(e) => {
                                    // The stream is desynchronized; nothing
                                    // after this frame can be trusted.
                                    eprintln!("sqlbridge: undecodable response frame: {}", e);
                                    break 'transport format!("protocol decode failure: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            eprintln!("sqlbridge: {}", e);
                            break 'transport format!("protocol decode failure: {}", e);
                        }
                    }
                }
            };

            jobs.cancel_all(&reason).await;
        })
    }

    async fn settle_response(jobs: &JobRegistry, response: ResponseEnvelope) {
        let outcome = match (response.result, response.error) {
            (_, Some(error)) => Err(BridgeError::Remote(error)),
            (result, None) => Ok(result.unwrap_or(Value::Null)),
        };
        jobs.settle(response.idx, outcome).await;
    }

    /// Issue one command and await its correlated response.
    ///
    /// The caller suspends here until its `idx` is settled by the reader
    /// task or the transport shuts down. There is no per-request timeout or
    /// cancellation; whole-transport shutdown is the only way a request
    /// stops waiting.
    pub async fn send(&self, cmd: Command, params: Vec<Value>) -> BridgeResult<Value> {
        if self.close_requested.load(Ordering::SeqCst) {
            return Err(BridgeError::transport_closed("transport closed"));
        }

        let (idx, rx) = self.jobs.allocate().await?;
        let envelope = RequestEnvelope { idx, cmd, params };
        let payload = serde_json::to_vec(&envelope).map_err(BridgeError::SerializeFailed)?;

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(&encode_frame(&payload)).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.jobs.forget(idx).await;
            return Err(BridgeError::WriteFailed(e));
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Settlement channel dropped without an outcome: the registry
            // is mid-teardown.
            Err(_) => Err(BridgeError::transport_closed(
                "worker process exited unexpectedly",
            )),
        }
    }

    /// Open the driver connection inside the worker.
    ///
    /// The connection options travel as the last parameter so the worker
    /// applies the same configuration this client was built with.
    pub async fn open(&self, dsn: &str) -> BridgeResult<()> {
        let options = serde_json::to_value(&self.options).map_err(BridgeError::SerializeFailed)?;
        self.send(
            Command::Open,
            vec![Value::String(dsn.to_string()), options],
        )
        .await?;
        Ok(())
    }

    /// Execute a statement, returning the worker's row-count summary.
    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> BridgeResult<ExecSummary> {
        let (sql, params) = self.rewrite(sql, params)?;
        let result = self
            .send(Command::Exec, vec![Value::String(sql), Value::Array(params)])
            .await?;
        serde_json::from_value(result).map_err(BridgeError::DeserializeFailed)
    }

    /// Execute and fetch a single row, or `None` when the query produced
    /// no rows.
    pub async fn query_one(&self, sql: &str, params: Vec<Value>) -> BridgeResult<Option<Row>> {
        let (sql, params) = self.rewrite(sql, params)?;
        let result = self
            .send(
                Command::QueryOne,
                vec![Value::String(sql), Value::Array(params)],
            )
            .await?;
        match result {
            Value::Null => Ok(None),
            Value::Object(row) => Ok(Some(row)),
            other => Err(BridgeError::ProtocolDecode(format!(
                "queryOne result is neither a row nor null: {}",
                other
            ))),
        }
    }

    /// Execute and fetch every row.
    pub async fn query_all(&self, sql: &str, params: Vec<Value>) -> BridgeResult<Vec<Row>> {
        let (sql, params) = self.rewrite(sql, params)?;
        let result = self
            .send(
                Command::QueryAll,
                vec![Value::String(sql), Value::Array(params)],
            )
            .await?;
        serde_json::from_value(result).map_err(BridgeError::DeserializeFailed)
    }

    /// First column of the first row, or `None` when the query returned no
    /// rows or an empty row.
    pub async fn query_column(&self, sql: &str, params: Vec<Value>) -> BridgeResult<Option<Value>> {
        let row = self.query_one(sql, params).await?;
        Ok(row.and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    /// Gracefully shut the worker down.
    ///
    /// Writes the zero-length shutdown frame and closes the worker's
    /// stdin. The worker is left to finish and exit on its own; it is not
    /// killed. Calls issued after this fail fast with `TransportClosed`.
    pub async fn close(&self) -> BridgeResult<()> {
        self.close_requested.store(true, Ordering::SeqCst);
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(&shutdown_frame())
            .await
            .map_err(BridgeError::WriteFailed)?;
        stdin.shutdown().await.map_err(BridgeError::WriteFailed)?;
        Ok(())
    }

    /// Whether the worker is still serving responses.
    ///
    /// `false` once the reader task has finished, i.e. after the worker
    /// exited or the transport shut down.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// The options this client was built with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn rewrite(&self, sql: &str, params: Vec<Value>) -> BridgeResult<(String, Vec<Value>)> {
        if self.options.expand_placeholders {
            let expansion = expand(sql, &params)?;
            Ok((expansion.sql, expansion.params))
        } else {
            Ok((sql.to_string(), params))
        }
    }
}
