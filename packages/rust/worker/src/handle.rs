//! Worker abstraction used by the build stages.
//!
//! Stages only ever talk to a [`Worker`] through a [`WorkerSession`], which
//! guarantees the worker is ended exactly once whether the stage succeeds or
//! fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use sitegen_shared::{Result, SitegenError};

/// Which job a worker is spawned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Renders page chunks to HTML.
    Html,
    /// Transforms image chunks.
    Images,
    /// Site host process (compiler, queries, plugin hooks).
    Host,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Images => "images",
            Self::Host => "host",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy to a long-lived worker exposing named operations.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Invoke `op` with a JSON payload and wait for its result.
    async fn call(&self, op: &str, payload: serde_json::Value) -> Result<serde_json::Value>;

    /// Release the worker. Calls after the first are no-ops.
    async fn end(&self) -> Result<()>;
}

/// Creates workers for a stage.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn spawn(&self, kind: WorkerKind) -> Result<Arc<dyn Worker>>;
}

/// Serialize `payload`, call `op`, and decode the result.
pub async fn call_json<P, R>(worker: &dyn Worker, op: &str, payload: &P) -> Result<R>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let payload = serde_json::to_value(payload)
        .map_err(|e| SitegenError::Protocol(format!("failed to encode `{op}` payload: {e}")))?;
    let value = worker.call(op, payload).await?;
    serde_json::from_value(value)
        .map_err(|e| SitegenError::Protocol(format!("invalid `{op}` result: {e}")))
}

/// A worker scoped to one stage invocation.
pub struct WorkerSession {
    kind: WorkerKind,
    worker: Arc<dyn Worker>,
}

impl WorkerSession {
    /// Spawn a fresh worker of `kind`.
    pub async fn start(factory: &dyn WorkerFactory, kind: WorkerKind) -> Result<Self> {
        debug!(%kind, "starting worker session");
        let worker = factory.spawn(kind).await?;
        Ok(Self { kind, worker })
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Shared handle for dispatching from spawned tasks.
    pub fn worker(&self) -> Arc<dyn Worker> {
        Arc::clone(&self.worker)
    }

    /// End the worker and return the stage outcome.
    ///
    /// A stage failure takes precedence over a shutdown failure, which is
    /// only logged in that case.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        let ended = self.worker.end().await;
        debug!(kind = %self.kind, ok = outcome.is_ok(), "worker session ended");

        match (outcome, ended) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(end_err)) => {
                warn!(
                    kind = %self.kind,
                    error = %end_err,
                    "worker shutdown failed after stage error"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct EchoWorker {
        ends: AtomicUsize,
        fail_end: bool,
    }

    #[async_trait]
    impl Worker for EchoWorker {
        async fn call(&self, op: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
            match op {
                "echo" => Ok(payload),
                _ => Err(SitegenError::worker("test", op, "unknown op")),
            }
        }

        async fn end(&self) -> Result<()> {
            self.ends.fetch_add(1, Ordering::SeqCst);
            if self.fail_end {
                Err(SitegenError::worker("test", "end", "refused"))
            } else {
                Ok(())
            }
        }
    }

    struct Factory(Arc<EchoWorker>);

    #[async_trait]
    impl WorkerFactory for Factory {
        async fn spawn(&self, _kind: WorkerKind) -> Result<Arc<dyn Worker>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn call_json_roundtrips_payload() {
        let worker = EchoWorker::default();
        let out: Vec<u32> = call_json(&worker, "echo", &vec![1, 2, 3]).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn call_json_reports_bad_result_shape() {
        let worker = EchoWorker::default();
        let err = call_json::<_, Vec<u32>>(&worker, "echo", "not a list")
            .await
            .unwrap_err();
        assert!(matches!(err, SitegenError::Protocol(_)));
    }

    #[tokio::test]
    async fn finish_ends_worker_on_success() {
        let worker = Arc::new(EchoWorker::default());
        let session = WorkerSession::start(&Factory(worker.clone()), WorkerKind::Html)
            .await
            .unwrap();
        assert_eq!(session.kind(), WorkerKind::Html);
        let value = session.finish(Ok(7)).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(worker.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finish_prefers_stage_error_over_shutdown_error() {
        let worker = Arc::new(EchoWorker {
            fail_end: true,
            ..Default::default()
        });
        let session = WorkerSession::start(&Factory(worker.clone()), WorkerKind::Images)
            .await
            .unwrap();
        let err = session
            .finish::<()>(Err(SitegenError::worker("images", "process_images", "corrupt png")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("corrupt png"));
        assert_eq!(worker.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finish_surfaces_shutdown_error_after_success() {
        let worker = Arc::new(EchoWorker {
            fail_end: true,
            ..Default::default()
        });
        let session = WorkerSession::start(&Factory(worker), WorkerKind::Html)
            .await
            .unwrap();
        assert!(session.finish(Ok(())).await.is_err());
    }
}
