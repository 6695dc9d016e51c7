//! HTML render stage.
//!
//! The render queue is split into chunks and every chunk is sent to the HTML
//! worker at once unless `render.concurrency` caps it.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};

use sitegen_shared::{ContentHash, PageJob, RenderQueue, Result, SitegenError};
use sitegen_worker::{WorkerKind, WorkerSession};

use crate::app::App;
use crate::concurrency::{chunk, map_limited};
use crate::progress::{ProgressReporter, StageReport};

/// Worker operation that renders one chunk of pages.
pub const RENDER_HTML_OP: &str = "render_html";

#[derive(Debug, Serialize)]
struct RenderPayload<'a> {
    hash: &'a str,
    pages: &'a [PageJob],
    html_template: &'a Path,
    client_manifest_path: &'a Path,
    server_bundle_path: &'a Path,
    prefetch: Option<&'a serde_json::Value>,
    preload: Option<&'a serde_json::Value>,
}

/// Render every page in `queue` with the HTML worker.
#[instrument(skip_all, fields(pages = queue.len(), hash = %hash))]
pub async fn render_html(
    app: &App,
    queue: &RenderQueue,
    hash: &ContentHash,
    progress: &dyn ProgressReporter,
) -> Result<StageReport> {
    let start = Instant::now();
    if queue.is_empty() {
        debug!("render queue is empty, skipping HTML worker");
        return Ok(StageReport::default());
    }

    let render = &app.context.render;
    let chunks = chunk(queue, render.chunk_size);
    let total = chunks.len();
    let limit = render.concurrency.unwrap_or(total);
    debug!(chunks = total, limit, "dispatching render chunks");

    let session = WorkerSession::start(app.services.workers.as_ref(), WorkerKind::Html).await?;
    let worker = session.worker();

    let outcome = map_limited(
        chunks,
        limit,
        |_, pages| {
            let payload = serde_json::to_value(RenderPayload {
                hash: hash.as_str(),
                pages,
                html_template: &render.html_template,
                client_manifest_path: &render.client_manifest_path,
                server_bundle_path: &render.server_bundle_path,
                prefetch: render.prefetch.as_ref(),
                preload: render.preload.as_ref(),
            })
            .map_err(|e| SitegenError::Protocol(format!("failed to encode render chunk: {e}")));
            let worker = worker.clone();
            async move { worker.call(RENDER_HTML_OP, payload?).await }
        },
        |done, total| progress.stage_progress("Render HTML", done, total),
    )
    .await;

    session.finish(outcome).await?;

    let elapsed = start.elapsed();
    info!(
        pages = queue.len(),
        elapsed_ms = elapsed.as_millis(),
        "render HTML ({} files) - {:.2}s",
        queue.len(),
        elapsed.as_secs_f64()
    );

    Ok(StageReport {
        items: queue.len(),
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::progress::SilentProgress;
    use crate::testing::{FakeHost, FakeWorker, TestBuild, pages};

    fn chunk_sizes(worker: &FakeWorker) -> Vec<usize> {
        let mut sizes: Vec<usize> = worker
            .calls()
            .iter()
            .map(|(_, payload)| payload["pages"].as_array().map_or(0, Vec::len))
            .collect();
        sizes.sort_unstable();
        sizes
    }

    #[tokio::test]
    #[traced_test]
    async fn renders_720_pages_in_three_chunks() {
        let build = TestBuild::new();
        let app = build.app(FakeHost::default());
        let queue = pages(&build, 720);

        let report = render_html(&app, &queue, &ContentHash("9f2c1a".into()), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.items, 720);
        assert_eq!(chunk_sizes(&build.html), vec![20, 350, 350]);
        assert_eq!(build.html.ends.load(Ordering::SeqCst), 1);
        assert!(logs_contain("720 files"));
    }

    #[tokio::test]
    async fn every_chunk_gets_the_same_hash() {
        let build = TestBuild::new();
        let app = build.app(FakeHost::default());
        let queue = pages(&build, 800);

        render_html(&app, &queue, &ContentHash("sitegen".into()), &SilentProgress)
            .await
            .unwrap();

        let calls = build.html.calls();
        assert_eq!(calls.len(), 3);
        for (op, payload) in calls {
            assert_eq!(op, RENDER_HTML_OP);
            assert_eq!(payload["hash"], "sitegen");
            assert!(payload["html_template"].as_str().unwrap().ends_with("index.html"));
        }
    }

    #[tokio::test]
    async fn chunks_run_concurrently_by_default() {
        let build = TestBuild::with_html(FakeWorker::new().with_delay(Duration::from_millis(20)));
        let app = build.app(FakeHost::default());
        let queue = pages(&build, 1000);

        render_html(&app, &queue, &ContentHash("h".into()), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(build.html.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrency_cap_is_honoured() {
        let worker = FakeWorker::new().with_delay(Duration::from_millis(10));
        let mut build = TestBuild::with_html(worker);
        build.context.render.concurrency = Some(1);
        let app = build.app(FakeHost::default());
        let queue = pages(&build, 1000);

        render_html(&app, &queue, &ContentHash("h".into()), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(build.html.peak.load(Ordering::SeqCst), 1);
        assert_eq!(build.html.calls().len(), 3);
    }

    #[tokio::test]
    async fn failed_chunk_still_ends_worker_once() {
        let build = TestBuild::with_html(FakeWorker::new().failing_on(1));
        let app = build.app(FakeHost::default());
        let queue = pages(&build, 720);

        let err = render_html(&app, &queue, &ContentHash("h".into()), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, SitegenError::WorkerDispatch { .. }));
        assert_eq!(build.html.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_queue_never_spawns_a_worker() {
        let build = TestBuild::new();
        let app = build.app(FakeHost::default());

        let report = render_html(&app, &Vec::new(), &ContentHash("h".into()), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.items, 0);
        assert!(build.factory.spawned().is_empty());
    }
}
