//! In-process fakes for the worker, host and progress seams.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use sitegen_shared::{
    AssetQueue, BuildContext, ImageJob, PageJob, Redirect, RenderQueue, Result, SiteConfig,
    SitegenError,
};
use sitegen_worker::{Worker, WorkerFactory, WorkerKind};

use crate::app::{
    App, AssetQueueSource, BuildServices, CompileOutput, Compiler, QueryExecutor,
    RenderQueueBuilder, RunMode, RunOptions,
};
use crate::hooks::{AfterBuildContext, BeforeBuildContext, Plugin, PluginRegistry};
use crate::images::PROCESS_IMAGES_OP;
use crate::progress::ProgressReporter;

pub fn test_context(root: &Path) -> BuildContext {
    BuildContext::resolve(root, &SiteConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeWorker {
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub ends: AtomicUsize,
    fail_on_call: Option<usize>,
    delay: Duration,
    write_images: bool,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th call (zero-based).
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write every `dest_path` of a `process_images` chunk.
    pub fn writing_images(mut self) -> Self {
        self.write_images = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    async fn call(&self, op: &str, payload: Value) -> Result<Value> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((op.to_string(), payload.clone()));
            calls.len() - 1
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on_call == Some(index) {
            return Err(SitegenError::worker("fake", op, format!("call {index} failed")));
        }

        if self.write_images && op == PROCESS_IMAGES_OP {
            for job in payload["queue"].as_array().into_iter().flatten() {
                if let Some(dest) = job["dest_path"].as_str() {
                    let dest = Path::new(dest);
                    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
                    std::fs::write(dest, b"new").unwrap();
                }
            }
        }

        Ok(Value::Null)
    }

    async fn end(&self) -> Result<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeFactory {
    html: Arc<FakeWorker>,
    images: Arc<FakeWorker>,
    spawned: Mutex<Vec<WorkerKind>>,
}

impl FakeFactory {
    pub fn spawned(&self) -> Vec<WorkerKind> {
        self.spawned.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerFactory for FakeFactory {
    async fn spawn(&self, kind: WorkerKind) -> Result<Arc<dyn Worker>> {
        self.spawned.lock().unwrap().push(kind);
        match kind {
            WorkerKind::Html => Ok(self.html.clone()),
            WorkerKind::Images => Ok(self.images.clone()),
            WorkerKind::Host => Err(SitegenError::Task("host is not a stage worker".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Host collaborators
// ---------------------------------------------------------------------------

pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone)]
pub struct FakeHost {
    pub hash: String,
    pub compile_warnings: Vec<String>,
    pub fail_compile: bool,
    pub pages: RenderQueue,
    pub assets: AssetQueue,
    pub log: CallLog,
    /// Run mode seen by `compile` and `render_queue`, in call order.
    pub modes: Arc<Mutex<Vec<RunMode>>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            hash: "c0ffee".into(),
            compile_warnings: Vec::new(),
            fail_compile: false,
            pages: Vec::new(),
            assets: AssetQueue::default(),
            log: CallLog::default(),
            modes: Arc::default(),
        }
    }
}

impl FakeHost {
    fn record(&self, what: &str) {
        self.log.lock().unwrap().push(what.to_string());
    }
}

#[async_trait]
impl Compiler for FakeHost {
    async fn compile(&self, _context: &BuildContext, mode: RunMode) -> Result<CompileOutput> {
        self.record("compile");
        self.modes.lock().unwrap().push(mode);
        if self.fail_compile {
            return Err(SitegenError::Compile("module not found: ./missing".into()));
        }
        Ok(CompileOutput {
            hash: self.hash.clone(),
            warnings: self.compile_warnings.clone(),
        })
    }
}

#[async_trait]
impl RenderQueueBuilder for FakeHost {
    async fn render_queue(&self, _context: &BuildContext, mode: RunMode) -> Result<RenderQueue> {
        self.record("render_queue");
        self.modes.lock().unwrap().push(mode);
        Ok(self.pages.clone())
    }
}

#[async_trait]
impl QueryExecutor for FakeHost {
    async fn execute(
        &self,
        _context: &BuildContext,
        mut queue: RenderQueue,
    ) -> Result<RenderQueue> {
        self.record("execute_queries");
        for page in &mut queue {
            page.data = Some(json!({ "path": page.path }));
        }
        Ok(queue)
    }
}

#[async_trait]
impl AssetQueueSource for FakeHost {
    async fn asset_queue(&self, _context: &BuildContext) -> Result<AssetQueue> {
        self.record("asset_queue");
        Ok(self.assets.clone())
    }
}

/// Records hook invocations into a shared log.
pub struct RecordingPlugin {
    pub name: String,
    pub log: CallLog,
    pub fail_before_build: bool,
    pub fail_redirects: bool,
    pub fail_after_build: bool,
}

impl RecordingPlugin {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_before_build: false,
            fail_redirects: false,
            fail_after_build: false,
        }
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_build(&self, _ctx: &BeforeBuildContext<'_>) -> Result<()> {
        self.log.lock().unwrap().push(format!("{}:before_build", self.name));
        if self.fail_before_build {
            return Err(SitegenError::validation("missing SITE_URL"));
        }
        Ok(())
    }

    async fn redirects(
        &self,
        mut redirects: Vec<Redirect>,
        _queue: &RenderQueue,
    ) -> Result<Vec<Redirect>> {
        self.log.lock().unwrap().push(format!("{}:redirects", self.name));
        if self.fail_redirects {
            return Err(SitegenError::validation("duplicate redirect source /old"));
        }
        redirects.push(Redirect {
            from: format!("/{}/old", self.name),
            to: format!("/{}/new", self.name),
            status: 301,
        });
        Ok(redirects)
    }

    async fn after_build(&self, ctx: &AfterBuildContext<'_>) -> Result<()> {
        self.log.lock().unwrap().push(format!(
            "{}:after_build:{}:{}",
            self.name,
            ctx.queue.len(),
            ctx.redirects.len()
        ));
        if self.fail_after_build {
            return Err(SitegenError::Task("sitemap upload refused".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingProgress {
    phases: Mutex<Vec<String>>,
    stages: Mutex<Vec<(String, usize, usize)>>,
    done: AtomicUsize,
}

impl RecordingProgress {
    pub fn phases(&self) -> Vec<String> {
        self.phases.lock().unwrap().clone()
    }

    pub fn stage_events(&self) -> Vec<(String, usize, usize)> {
        self.stages.lock().unwrap().clone()
    }

    pub fn done_count(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for RecordingProgress {
    fn phase(&self, name: &str) {
        self.phases.lock().unwrap().push(name.to_string());
    }

    fn stage_progress(&self, stage: &str, completed: usize, total: usize) {
        self.stages
            .lock()
            .unwrap()
            .push((stage.to_string(), completed, total));
    }

    fn done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Build fixture
// ---------------------------------------------------------------------------

/// A project root in a temp dir wired to fake workers.
pub struct TestBuild {
    pub dir: tempfile::TempDir,
    pub context: BuildContext,
    pub options: RunOptions,
    pub html: Arc<FakeWorker>,
    pub images: Arc<FakeWorker>,
    pub factory: Arc<FakeFactory>,
    pub plugins: PluginRegistry,
}

impl TestBuild {
    pub fn new() -> Self {
        Self::with_workers(FakeWorker::new(), FakeWorker::new())
    }

    pub fn with_html(html: FakeWorker) -> Self {
        Self::with_workers(html, FakeWorker::new())
    }

    pub fn with_images(images: FakeWorker) -> Self {
        Self::with_workers(FakeWorker::new(), images)
    }

    pub fn with_workers(html: FakeWorker, images: FakeWorker) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let context = test_context(dir.path());
        let html = Arc::new(html);
        let images = Arc::new(images);
        let factory = Arc::new(FakeFactory {
            html: html.clone(),
            images: images.clone(),
            spawned: Mutex::new(Vec::new()),
        });

        Self {
            dir,
            context,
            options: RunOptions {
                mode: RunMode::Production,
                interactive: false,
                logical_cpus: 4,
            },
            html,
            images,
            factory,
            plugins: PluginRegistry::new(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.context.root.clone()
    }

    pub fn services(&self, host: FakeHost) -> BuildServices {
        let host = Arc::new(host);
        BuildServices {
            compiler: host.clone(),
            pages: host.clone(),
            queries: host.clone(),
            assets: host,
            plugins: self.plugins.clone(),
            workers: self.factory.clone(),
        }
    }

    pub fn app(&self, host: FakeHost) -> App {
        App::new(self.context.clone(), self.options.clone(), self.services(host))
    }

    pub fn image(&self, name: &str) -> ImageJob {
        ImageJob {
            source_path: self.root().join("src/images").join(name),
            dest_path: self.context.images_dir.join(name),
            transform: json!({ "width": 800 }),
        }
    }
}

pub fn pages(build: &TestBuild, count: usize) -> RenderQueue {
    (0..count)
        .map(|i| PageJob {
            path: format!("/posts/{i}/"),
            html_output: build.context.output_dir.join(format!("posts/{i}/index.html")),
            data_output: None,
            query_context: json!({ "id": i }),
            route: Value::Null,
            data: None,
        })
        .collect()
}

pub fn images(build: &TestBuild, count: usize) -> Vec<ImageJob> {
    (0..count).map(|i| build.image(&format!("photo-{i}.jpg"))).collect()
}
