//! Error types for sitegen.
//!
//! Library crates use [`SitegenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for every stage of a build run.
#[derive(Debug, thiserror::Error)]
pub enum SitegenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An extension hook failed. Always fatal to the run.
    #[error("hook `{hook}` failed in plugin `{plugin}`: {message}")]
    Hook {
        hook: String,
        plugin: String,
        message: String,
    },

    /// A worker RPC rejected. Fatal to the stage that issued it.
    #[error("{worker} worker failed on `{op}`: {message}")]
    WorkerDispatch {
        worker: String,
        op: String,
        message: String,
    },

    /// Malformed or unexpected message on a worker/host channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The asset compiler failed.
    #[error("compile error: {0}")]
    Compile(String),

    /// Query execution failed.
    #[error("query error: {0}")]
    Query(String),

    /// A spawned task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad queue entry, invalid path, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitegenError>;

impl SitegenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a hook failure for `plugin` while running `hook`.
    pub fn hook(
        hook: impl Into<String>,
        plugin: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Hook {
            hook: hook.into(),
            plugin: plugin.into(),
            message: msg.into(),
        }
    }

    /// Create a worker dispatch failure.
    pub fn worker(
        worker: impl Into<String>,
        op: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::WorkerDispatch {
            worker: worker.into(),
            op: op.into(),
            message: msg.into(),
        }
    }
}
