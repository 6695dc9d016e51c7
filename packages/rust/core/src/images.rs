//! Image processing stage and stale image reconciliation.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use sitegen_shared::{ImageJob, ImagesConfig, Result, SitegenError};
use sitegen_worker::{WorkerKind, WorkerSession};

use crate::app::{App, Warnings};
use crate::concurrency::{chunk, map_limited};
use crate::progress::ProgressReporter;

/// Worker operation that processes one chunk of images.
pub const PROCESS_IMAGES_OP: &str = "process_images";

#[derive(Debug, Serialize)]
struct ImagesPayload<'a> {
    queue: &'a [ImageJob],
    context: &'a Path,
    images_config: &'a ImagesConfig,
}

/// Outcome of the image stage.
#[derive(Debug, Clone, Default)]
pub struct ImageReport {
    pub processed: usize,
    /// File names deleted from the images directory.
    pub removed: Vec<String>,
    pub elapsed: Duration,
}

/// File names directly inside `dir`. A missing directory is an empty set.
pub fn read_existing_images(dir: &Path) -> Result<BTreeSet<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(SitegenError::io(dir, e)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| SitegenError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| SitegenError::io(entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        // Destination names come from UTF-8 job paths, so nothing else can match.
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(name) => {
                debug!(dir = %dir.display(), ?name, "skipping image with non UTF-8 name");
            }
        }
    }
    Ok(names)
}

/// Names in `existing` that no job in `images` writes.
pub fn unused_images(existing: &BTreeSet<String>, images: &[ImageJob]) -> BTreeSet<String> {
    let produced: BTreeSet<&str> = images.iter().filter_map(ImageJob::dest_file_name).collect();
    existing
        .iter()
        .filter(|name| !produced.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Delete each of `unused` from `dir`.
///
/// A failed deletion is logged and recorded in `warnings`; the rest are
/// still attempted. Returns the names actually removed.
pub fn remove_unused_images(
    dir: &Path,
    unused: &BTreeSet<String>,
    warnings: &Warnings,
) -> Vec<String> {
    let mut removed = Vec::with_capacity(unused.len());
    for name in unused {
        let path = dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed unused image");
                removed.push(name.clone());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove unused image");
                warnings.push(format!("failed to remove unused image {}: {e}", path.display()));
            }
        }
    }
    removed
}

/// Process every image with the image worker, then drop images left over
/// from earlier builds.
#[instrument(skip_all, fields(images = images.len()))]
pub async fn process_images(
    app: &App,
    images: &[ImageJob],
    progress: &dyn ProgressReporter,
) -> Result<ImageReport> {
    let start = Instant::now();
    let context = &app.context;

    // Snapshot before any writes, and only if the output survived from a
    // previous build.
    let existing = if context.images.remove_unused && !context.empty_output_dir {
        read_existing_images(&context.images_dir)?
    } else {
        BTreeSet::new()
    };

    if !images.is_empty() {
        let chunks = chunk(images, context.images.chunk_size);
        let limit = app.options.logical_cpus;
        debug!(chunks = chunks.len(), limit, "dispatching image chunks");

        let session =
            WorkerSession::start(app.services.workers.as_ref(), WorkerKind::Images).await?;
        let worker = session.worker();

        let outcome = map_limited(
            chunks,
            limit,
            |_, queue| {
                let payload = serde_json::to_value(ImagesPayload {
                    queue,
                    context: &context.root,
                    images_config: &context.images,
                })
                .map_err(|e| SitegenError::Protocol(format!("failed to encode image chunk: {e}")));
                let worker = worker.clone();
                async move { worker.call(PROCESS_IMAGES_OP, payload?).await }
            },
            |done, total| progress.stage_progress("Process images", done, total),
        )
        .await;

        session.finish(outcome).await?;
    }

    let elapsed = start.elapsed();
    info!(
        images = images.len(),
        elapsed_ms = elapsed.as_millis(),
        "process images - {:.2}s",
        elapsed.as_secs_f64()
    );

    let mut removed = Vec::new();
    if context.images.remove_unused && !existing.is_empty() {
        let unused = unused_images(&existing, images);
        removed = remove_unused_images(&context.images_dir, &unused, &app.warnings);
        info!(removed = removed.len(), "removed {} unused images", removed.len());
    }

    Ok(ImageReport {
        processed: images.len(),
        removed,
        elapsed,
    })
}
