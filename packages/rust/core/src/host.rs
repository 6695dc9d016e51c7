//! Site host process.
//!
//! The host is the site toolchain (bundler, data layer, plugins) running as
//! a child process. It backs every collaborator the orchestrator delegates
//! to, over the same JSON-lines protocol as the stage workers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use sitegen_shared::{
    AssetQueue, BuildContext, Redirect, RenderQueue, Result, SitegenError, WorkerCommand,
};
use sitegen_worker::{ProcessWorker, Worker, WorkerFactory, WorkerKind, call_json};

use crate::app::{
    AssetQueueSource, BuildServices, CompileOutput, Compiler, QueryExecutor, RenderQueueBuilder,
    RunMode,
};
use crate::hooks::{AfterBuildContext, BeforeBuildContext, Plugin, PluginRegistry};

/// Operations the host answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    Compile,
    RenderQueue,
    ExecuteQueries,
    AssetQueue,
    BeforeBuild,
    Redirects,
    AfterBuild,
}

impl HostOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::RenderQueue => "render_queue",
            Self::ExecuteQueries => "execute_queries",
            Self::AssetQueue => "asset_queue",
            Self::BeforeBuild => "before_build",
            Self::Redirects => "redirects",
            Self::AfterBuild => "after_build",
        }
    }
}

#[derive(Serialize)]
struct ContextPayload<'a> {
    context: &'a BuildContext,
}

#[derive(Serialize)]
struct ModePayload<'a> {
    context: &'a BuildContext,
    mode: RunMode,
}

#[derive(Serialize)]
struct QueriesPayload<'a> {
    context: &'a BuildContext,
    queue: &'a RenderQueue,
}

#[derive(Serialize)]
struct RedirectsPayload<'a> {
    redirects: &'a [Redirect],
    queue: &'a RenderQueue,
}

/// Collaborators backed by the host process.
pub struct HostProcess {
    worker: Arc<dyn Worker>,
}

impl HostProcess {
    /// Spawn the host in `root` and wait until it is ready.
    #[instrument(skip_all, fields(command = %command.command))]
    pub async fn spawn(command: &WorkerCommand, root: &Path) -> Result<Self> {
        let worker = ProcessWorker::spawn(WorkerKind::Host, command, root).await?;
        info!("host process ready");
        Ok(Self::from_worker(Arc::new(worker)))
    }

    pub fn from_worker(worker: Arc<dyn Worker>) -> Self {
        Self { worker }
    }

    /// Wire the host in as every collaborator and as the first plugin.
    pub fn services(self: &Arc<Self>, workers: Arc<dyn WorkerFactory>) -> BuildServices {
        let mut plugins = PluginRegistry::new();
        plugins.register(self.clone());

        BuildServices {
            compiler: self.clone(),
            pages: self.clone(),
            queries: self.clone(),
            assets: self.clone(),
            plugins,
            workers,
        }
    }

    pub async fn end(&self) -> Result<()> {
        self.worker.end().await
    }

    async fn call<P, R>(&self, op: HostOp, payload: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        call_json(self.worker.as_ref(), op.as_str(), payload).await
    }
}

/// Rewrap a host-side rejection as the collaborator's own error kind.
fn rejected(err: SitegenError, wrap: fn(String) -> SitegenError) -> SitegenError {
    match err {
        SitegenError::WorkerDispatch { message, .. } => wrap(message),
        other => other,
    }
}

#[async_trait]
impl Compiler for HostProcess {
    async fn compile(&self, context: &BuildContext, mode: RunMode) -> Result<CompileOutput> {
        self.call(HostOp::Compile, &ModePayload { context, mode })
            .await
            .map_err(|e| rejected(e, SitegenError::Compile))
    }
}

#[async_trait]
impl RenderQueueBuilder for HostProcess {
    async fn render_queue(&self, context: &BuildContext, mode: RunMode) -> Result<RenderQueue> {
        self.call(HostOp::RenderQueue, &ModePayload { context, mode })
            .await
    }
}

#[async_trait]
impl QueryExecutor for HostProcess {
    async fn execute(&self, context: &BuildContext, queue: RenderQueue) -> Result<RenderQueue> {
        let payload = QueriesPayload {
            context,
            queue: &queue,
        };
        self.call(HostOp::ExecuteQueries, &payload)
            .await
            .map_err(|e| rejected(e, SitegenError::Query))
    }
}

#[async_trait]
impl AssetQueueSource for HostProcess {
    async fn asset_queue(&self, context: &BuildContext) -> Result<AssetQueue> {
        self.call(HostOp::AssetQueue, &ContextPayload { context }).await
    }
}

#[async_trait]
impl Plugin for HostProcess {
    fn name(&self) -> &str {
        "host"
    }

    async fn before_build(&self, ctx: &BeforeBuildContext<'_>) -> Result<()> {
        let _: serde_json::Value = self.call(HostOp::BeforeBuild, ctx).await?;
        Ok(())
    }

    async fn redirects(
        &self,
        redirects: Vec<Redirect>,
        queue: &RenderQueue,
    ) -> Result<Vec<Redirect>> {
        let payload = RedirectsPayload {
            redirects: &redirects,
            queue,
        };
        self.call(HostOp::Redirects, &payload).await
    }

    async fn after_build(&self, ctx: &AfterBuildContext<'_>) -> Result<()> {
        let _: serde_json::Value = self.call(HostOp::AfterBuild, ctx).await?;
        Ok(())
    }
}
