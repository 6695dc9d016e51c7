//! End-to-end build: hooks → compile → queries → HTML → assets → cleanup.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use sitegen_shared::{BuildContext, BuildId, ContentHash, Redirect, Result};

use crate::app::{App, BuildServices, RunOptions};
use crate::hooks::{AfterBuildContext, BeforeBuildContext};
use crate::progress::ProgressReporter;
use crate::{compile, files, images, render};

/// Per-stage counts for a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildCounts {
    pub pages: usize,
    pub files: usize,
    pub images: usize,
    pub images_removed: usize,
    pub static_files: usize,
}

/// Result record of a build run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub build_id: BuildId,
    pub content_hash: ContentHash,
    pub counts: BuildCounts,
    pub redirects: Vec<Redirect>,
    pub warnings: usize,
    pub elapsed_ms: u64,
    /// Unset while `after_build` hooks are running.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A build that ran to completion.
pub struct CompletedApp {
    pub app: App,
    pub summary: BuildSummary,
}

/// Run a full build.
///
/// Stages run strictly in order and any failure aborts the run.
#[instrument(skip_all, fields(root = %context.root.display()))]
pub async fn run(
    context: BuildContext,
    options: RunOptions,
    services: BuildServices,
    progress: &dyn ProgressReporter,
) -> Result<CompletedApp> {
    let start = Instant::now();
    let app = App::new(context, options, services);
    let plugins = &app.services.plugins;

    info!(build_id = %app.build_id, mode = ?app.options.mode, "starting build");

    // --- Before build ---
    progress.phase("Before build");
    plugins
        .before_build(&BeforeBuildContext {
            context: &app.context,
            config: &app.context.config,
        })
        .await?;

    if app.context.empty_output_dir {
        files::empty_dir(&app.context.output_dir)?;
    }

    // --- Compile ---
    progress.phase("Compile assets");
    let compiled = compile::run_compiler(&app).await?;
    let hash = ContentHash::resolve(app.context.cache_busting, &compiled.hash);
    debug!(%hash, cache_busting = app.context.cache_busting, "resolved content hash");

    // --- Render queue + redirects ---
    progress.phase("Create render queue");
    let queue = app
        .services
        .pages
        .render_queue(&app.context, app.options.mode)
        .await?;
    let redirects = plugins.fold_redirects(Vec::new(), &queue).await?;

    // --- Queries ---
    progress.phase("Run queries");
    let query_start = Instant::now();
    let queue = app.services.queries.execute(&app.context, queue).await?;
    info!(
        pages = queue.len(),
        "run queries - {:.2}s",
        query_start.elapsed().as_secs_f64()
    );

    // --- HTML ---
    progress.phase("Render HTML");
    let rendered = render::render_html(&app, &queue, &hash, progress).await?;

    // --- Files ---
    progress.phase("Copy files");
    let assets = app.services.assets.asset_queue(&app.context).await?;
    let copied = files::copy_files(&assets.files).await?;

    // --- Images ---
    progress.phase("Process images");
    let processed = images::process_images(&app, &assets.images, progress).await?;

    // --- Static ---
    let mut static_files = 0;
    if app.context.static_dir.is_dir() {
        progress.phase("Copy static files");
        static_files = files::copy_static_dir(&app.context.static_dir, &app.context.output_dir)?;
    }

    let mut summary = BuildSummary {
        build_id: app.build_id.clone(),
        content_hash: hash,
        counts: BuildCounts {
            pages: rendered.items,
            files: copied.items,
            images: processed.processed,
            images_removed: processed.removed.len(),
            static_files,
        },
        redirects,
        warnings: app.warnings.len(),
        elapsed_ms: elapsed_ms(start),
        finished_at: None,
    };

    // --- After build ---
    progress.phase("After build");
    plugins
        .after_build(&AfterBuildContext {
            context: &app.context,
            config: &app.context.config,
            queue: &queue,
            redirects: &summary.redirects,
            summary: &summary,
        })
        .await?;

    if files::remove_dir_if_exists(&app.context.manifests_dir)? {
        debug!(dir = %app.context.manifests_dir.display(), "removed manifests directory");
    }

    let warnings = app.warnings.take();
    for warning in &warnings {
        warn!("{warning}");
    }

    summary.warnings = warnings.len();
    summary.elapsed_ms = elapsed_ms(start);
    summary.finished_at = Some(Utc::now());

    progress.done();
    info!(
        build_id = %summary.build_id,
        pages = summary.counts.pages,
        images = summary.counts.images,
        elapsed_ms = summary.elapsed_ms,
        "build complete"
    );

    Ok(CompletedApp { app, summary })
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
