//! Filesystem stages: verbatim copies, static directory, output cleanup.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use sitegen_shared::{FileJob, Result, SitegenError};

use crate::progress::StageReport;

/// Remove everything inside `dir`, creating it if it does not exist.
pub fn empty_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return std::fs::create_dir_all(dir).map_err(|e| SitegenError::io(dir, e));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| SitegenError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SitegenError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SitegenError::io(&path, e))?;
        let removed = if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|e| SitegenError::io(&path, e))?;
    }

    debug!(dir = %dir.display(), "emptied output directory");
    Ok(())
}

/// Remove `dir` and its contents. Returns `false` when it did not exist.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SitegenError::io(dir, e)),
    }
}

/// Copy each file to its destination, one after another.
#[instrument(skip_all, fields(files = files.len()))]
pub async fn copy_files(files: &[FileJob]) -> Result<StageReport> {
    let start = Instant::now();

    for file in files {
        if let Some(parent) = file.dest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SitegenError::io(parent, e))?;
        }
        tokio::fs::copy(&file.source_path, &file.dest_path)
            .await
            .map_err(|e| SitegenError::io(&file.source_path, e))?;
    }

    let elapsed = start.elapsed();
    info!(
        files = files.len(),
        elapsed_ms = elapsed.as_millis(),
        "copy files ({}) - {:.2}s",
        files.len(),
        elapsed.as_secs_f64()
    );

    Ok(StageReport {
        items: files.len(),
        elapsed,
    })
}

/// Copy the contents of `from` into `to`, dereferencing symlinks.
///
/// Returns the number of files copied.
pub fn copy_static_dir(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(from).follow_links(true).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            SitegenError::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| SitegenError::validation(format!("{}: {e}", entry.path().display())))?;
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| SitegenError::io(&dest, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SitegenError::io(parent, e))?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| SitegenError::io(entry.path(), e))?;
            copied += 1;
        }
    }

    debug!(from = %from.display(), copied, "copied static directory");
    Ok(copied)
}
