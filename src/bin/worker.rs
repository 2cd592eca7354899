//! sqlbridge worker executable.
//!
//! Serves framed requests on stdin/stdout against the embedded SQLite
//! driver. Stdout carries nothing but well-formed frames; diagnostics go
//! to stderr, which the controller inherits.

use std::process::ExitCode;

use sqlbridge::worker::{Dispatcher, SqliteDriver};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let mut dispatcher = Dispatcher::new(SqliteDriver);
    match dispatcher.serve(stdin, stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sqlbridge-worker: {}", e);
            ExitCode::FAILURE
        }
    }
}
