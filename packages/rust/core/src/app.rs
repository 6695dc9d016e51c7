//! The application object a build run operates on.
//!
//! External collaborators (compiler, render-queue builder, query engine,
//! asset queue) are consumed through the traits in this module so the
//! orchestrator can run against in-process fakes.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sitegen_shared::{AssetQueue, BuildContext, BuildId, RenderQueue, Result};
use sitegen_worker::WorkerFactory;

use crate::hooks::PluginRegistry;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// What kind of run the collaborators should prepare for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Production,
    Development,
}

/// Explicit run-wide flags, threaded to every stage that needs them.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Whether stdout is a terminal. Non-interactive runs log a notice
    /// before compiling.
    pub interactive: bool,
    /// Image chunks in flight at once.
    pub logical_cpus: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Production,
            interactive: false,
            logical_cpus: num_cpus::get(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Result of compiling client and server bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutput {
    /// Build hash of the compiled assets.
    pub hash: String,
    /// Non-fatal compiler warnings, flushed at the end of the run.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Asset compiler/bundler.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// `mode` selects production or development bundles.
    async fn compile(&self, context: &BuildContext, mode: RunMode) -> Result<CompileOutput>;
}

/// Produces the list of pages to render.
#[async_trait]
pub trait RenderQueueBuilder: Send + Sync {
    async fn render_queue(&self, context: &BuildContext, mode: RunMode) -> Result<RenderQueue>;
}

/// Resolves page data for every queue entry.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Returns the queue with `data` filled in.
    async fn execute(&self, context: &BuildContext, queue: RenderQueue) -> Result<RenderQueue>;
}

/// Files and images collected while the site was prepared.
#[async_trait]
pub trait AssetQueueSource: Send + Sync {
    async fn asset_queue(&self, context: &BuildContext) -> Result<AssetQueue>;
}

/// Everything the orchestrator delegates to.
pub struct BuildServices {
    pub compiler: Arc<dyn Compiler>,
    pub pages: Arc<dyn RenderQueueBuilder>,
    pub queries: Arc<dyn QueryExecutor>,
    pub assets: Arc<dyn AssetQueueSource>,
    pub plugins: PluginRegistry,
    pub workers: Arc<dyn WorkerFactory>,
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Non-fatal warnings accumulated during the run.
#[derive(Debug, Clone, Default)]
pub struct Warnings(Arc<Mutex<Vec<String>>>);

impl Warnings {
    pub fn push(&self, message: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    /// Drain every warning collected so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The application a build run is performed for.
pub struct App {
    pub build_id: BuildId,
    pub context: BuildContext,
    pub options: RunOptions,
    pub services: BuildServices,
    pub warnings: Warnings,
}

impl App {
    pub fn new(context: BuildContext, options: RunOptions, services: BuildServices) -> Self {
        Self {
            build_id: BuildId::new(),
            context,
            options,
            services,
            warnings: Warnings::default(),
        }
    }
}
