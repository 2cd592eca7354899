//! # sqlbridge
//!
//! Async bridge to a legacy database driver running in a worker process.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Controller (this crate)                  │
//! │   caller ──► placeholder expansion ──► job registry      │
//! │                 (allocate idx, pending future)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [frame codec]
//! ┌─────────────────────────────────────────────────────────┐
//! │      length-prefixed JSON frames over stdin/stdout       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dispatcher]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Worker process: sequential command dispatch over     │
//! │            the embedded driver (Driver seam)             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller pipelines any number of requests; each caller awaits the
//! settlement of its own correlation id. The worker serves strictly one
//! request at a time, so replies come back in arrival order, and a
//! zero-length frame shuts the whole thing down gracefully.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod worker;

pub use client::BridgeClient;
pub use error::{BridgeError, BridgeResult};
pub use protocol::{Command, ConnectionOptions, ErrorRecord, ExecSummary};
