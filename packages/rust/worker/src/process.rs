//! Out-of-process workers over the JSON-lines protocol.
//!
//! A [`ProcessWorker`] owns one child process. Calls are multiplexed by
//! request id, so several chunks can be in flight on the same child. A
//! [`ProcessPool`] spreads calls round-robin over several children.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sitegen_shared::{Result, SitegenError, WorkerCommand, WorkersSection};

use crate::handle::{Worker, WorkerFactory, WorkerKind};
use crate::protocol::{RequestMessage, ResponseMessage, encode};

/// How long a child may take to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type Outcome = std::result::Result<serde_json::Value, String>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Outcome>>>>;

// ---------------------------------------------------------------------------
// ProcessWorker
// ---------------------------------------------------------------------------

/// Handle to one spawned worker process.
pub struct ProcessWorker {
    kind: WorkerKind,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pending: Pending,
    /// Set once stdout has closed; no reply can arrive after that.
    closed: Arc<AtomicBool>,
    request_counter: AtomicU64,
}

impl ProcessWorker {
    /// Spawn the process and wait for its `ready` message.
    pub async fn spawn(
        kind: WorkerKind,
        command: &WorkerCommand,
        working_dir: &Path,
    ) -> Result<Self> {
        info!(%kind, cmd = %command.command, "spawning worker process");

        let mut child = Command::new(&command.command)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Worker logs go to parent stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SitegenError::worker(
                    kind.as_str(),
                    "spawn",
                    format!("failed to spawn `{}`: {e}", command.command),
                )
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SitegenError::worker(kind.as_str(), "spawn", "failed to capture stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SitegenError::worker(kind.as_str(), "spawn", "failed to capture stdout")
        })?;

        let mut lines = BufReader::new(stdout).lines();
        wait_for_ready(kind, &mut lines).await?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(
            kind,
            lines,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Ok(Self {
            kind,
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
            reader: Mutex::new(Some(reader)),
            pending,
            closed,
            request_counter: AtomicU64::new(0),
        })
    }

    async fn send_line(&self, line: &str) -> std::io::Result<bool> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Ok(false);
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(true)
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn call(&self, op: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let n = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("req-{n}");

        let line = encode(&RequestMessage::Call {
            id: &id,
            op,
            payload: &payload,
        })
        .map_err(|e| SitegenError::Protocol(format!("failed to serialize `{op}` request: {e}")))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // Checked under the lock the reader holds while draining.
            if self.closed.load(Ordering::SeqCst) {
                return Err(SitegenError::worker(
                    self.kind.as_str(),
                    op,
                    "worker output is closed",
                ));
            }
            pending.insert(id.clone(), tx);
        }

        let sent = self.send_line(&line).await;
        let failure = match sent {
            Ok(true) => None,
            Ok(false) => Some("worker has already been ended".to_string()),
            Err(e) => Some(format!("failed to write request: {e}")),
        };
        if let Some(message) = failure {
            self.pending.lock().await.remove(&id);
            return Err(SitegenError::worker(self.kind.as_str(), op, message));
        }

        debug!(kind = %self.kind, %id, op, "request sent");

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(SitegenError::worker(self.kind.as_str(), op, message)),
            Err(_) => Err(SitegenError::worker(
                self.kind.as_str(),
                op,
                "worker dropped the request",
            )),
        }
    }

    async fn end(&self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Ok(line) = encode(&RequestMessage::Shutdown) {
                let _ = stdin.write_all(line.as_bytes()).await;
                let _ = stdin.flush().await;
            }
            // Dropping stdin closes the pipe.
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(kind = %self.kind, ?status, "worker exited"),
                Ok(Err(e)) => warn!(kind = %self.kind, "worker wait error: {e}"),
                Err(_) => {
                    warn!(kind = %self.kind, "worker did not exit in time, killing");
                    child.kill().await.map_err(|e| {
                        SitegenError::worker(self.kind.as_str(), "end", e.to_string())
                    })?;
                }
            }
        }

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        for (_, tx) in self.pending.lock().await.drain() {
            let _ = tx.send(Err("worker was ended".into()));
        }

        Ok(())
    }
}

/// Wait for the worker to send its "ready" message.
async fn wait_for_ready(
    kind: WorkerKind,
    lines: &mut Lines<BufReader<ChildStdout>>,
) -> Result<()> {
    let line = lines
        .next_line()
        .await
        .map_err(|e| SitegenError::worker(kind.as_str(), "spawn", format!("read error: {e}")))?
        .ok_or_else(|| {
            SitegenError::worker(kind.as_str(), "spawn", "worker exited before it was ready")
        })?;

    match serde_json::from_str::<ResponseMessage>(line.trim()) {
        Ok(ResponseMessage::Ready) => {
            debug!(%kind, "worker is ready");
            Ok(())
        }
        _ => Err(SitegenError::Protocol(format!(
            "expected ready message from {kind} worker, got: {line}"
        ))),
    }
}

/// Route responses to their waiting callers until stdout closes.
async fn read_responses(
    kind: WorkerKind,
    mut lines: Lines<BufReader<ChildStdout>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
) {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%kind, "worker read error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (id, outcome) = match serde_json::from_str::<ResponseMessage>(line.trim()) {
            Ok(ResponseMessage::Result { id, result }) => (id, Ok(result)),
            Ok(ResponseMessage::Error { id, error }) => (id, Err(error)),
            Ok(ResponseMessage::Ready) => continue,
            Err(e) => {
                let preview: String = line.chars().take(200).collect();
                warn!(%kind, error = %e, line = %preview, "invalid worker response");
                continue;
            }
        };

        match pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => warn!(%kind, %id, "response for unknown request"),
        }
    }

    let mut pending = pending.lock().await;
    closed.store(true, Ordering::SeqCst);
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err("worker process exited".into()));
    }
}

// ---------------------------------------------------------------------------
// ProcessPool
// ---------------------------------------------------------------------------

/// Several worker processes behind one [`Worker`] handle.
pub struct ProcessPool {
    workers: Vec<ProcessWorker>,
    next: AtomicUsize,
}

impl ProcessPool {
    /// Spawn `size` processes (at least one).
    pub async fn spawn(
        kind: WorkerKind,
        command: &WorkerCommand,
        working_dir: &Path,
        size: usize,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            match ProcessWorker::spawn(kind, command, working_dir).await {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    for worker in &workers {
                        let _ = worker.end().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(%kind, processes = workers.len(), "worker pool started");

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[async_trait]
impl Worker for ProcessPool {
    async fn call(&self, op: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[i].call(op, payload).await
    }

    async fn end(&self) -> Result<()> {
        let mut first_err = None;
        for worker in &self.workers {
            if let Err(e) = worker.end().await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// ProcessWorkerFactory
// ---------------------------------------------------------------------------

/// Spawns worker pools from the `[workers]` config section.
#[derive(Debug, Clone)]
pub struct ProcessWorkerFactory {
    working_dir: PathBuf,
    workers: WorkersSection,
}

impl ProcessWorkerFactory {
    pub fn new(working_dir: impl Into<PathBuf>, workers: WorkersSection) -> Self {
        Self {
            working_dir: working_dir.into(),
            workers,
        }
    }

    fn command(&self, kind: WorkerKind) -> &WorkerCommand {
        match kind {
            WorkerKind::Html => &self.workers.html,
            WorkerKind::Images => &self.workers.images,
            WorkerKind::Host => &self.workers.host,
        }
    }
}

#[async_trait]
impl WorkerFactory for ProcessWorkerFactory {
    async fn spawn(&self, kind: WorkerKind) -> Result<Arc<dyn Worker>> {
        let size = match kind {
            WorkerKind::Host => 1,
            _ => self.workers.process_count(),
        };
        let pool = ProcessPool::spawn(kind, self.command(kind), &self.working_dir, size).await?;
        Ok(Arc::new(pool))
    }
}
