//! Out-of-process worker plumbing for sitegen.
//!
//! Build stages see workers only through the [`Worker`] trait and scope them
//! with a [`WorkerSession`]. The process-backed implementation speaks a
//! newline-delimited JSON protocol with child processes.

pub mod handle;
pub mod process;
mod protocol;

pub use handle::{Worker, WorkerFactory, WorkerKind, WorkerSession, call_json};
pub use process::{ProcessPool, ProcessWorker, ProcessWorkerFactory};
