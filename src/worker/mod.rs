//! Worker-side half: framed request loop around an embedded driver.
//!
//! The worker reads requests off its input stream one at a time, executes
//! each against the embedded driver through the [`Driver`] seam and writes
//! exactly one framed response per request. A zero-length frame (or end of
//! stream) ends the loop; the process then exits on its own.
//!
//! Diagnostics never touch the response stream. Anything the worker wants
//! to say out of band goes to stderr, which the controller inherits.

mod dispatcher;
mod driver;
mod sqlite;

pub use dispatcher::{Dispatcher, ServeError};
pub use driver::{Driver, DriverAttributes, DriverFailure};
pub use sqlite::SqliteDriver;
