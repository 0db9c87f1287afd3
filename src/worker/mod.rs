//! Client for the out-of-process database worker.
//!
//! PostgreSQL and DuckDB have no in-process driver here. Statements for
//! them go to a long-running `painel-worker` child speaking NDJSON over
//! stdin/stdout.
//!
//! ```text
//!  WorkerBackend ──► WorkerClient ── stdin ──►  painel-worker
//!                        ▲                          │
//!                        └──── route_responses ◄────┘ stdout
//!                         (by request id)
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::WorkerClient;
pub use error::{WorkerError, WorkerResult};
