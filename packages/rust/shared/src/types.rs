//! Core domain types for a build run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token embedded in generated HTML when cache busting is disabled.
pub const STATIC_CONTENT_HASH: &str = "sitegen";

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one build run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub Uuid);

impl BuildId {
    /// Generate a new time-sortable build identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BuildId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// Version token for this build's compiled assets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Pick the compiler hash when cache busting, the fixed token otherwise.
    pub fn resolve(cache_busting: bool, compiler_hash: &str) -> Self {
        if cache_busting {
            Self(compiler_hash.to_string())
        } else {
            Self(STATIC_CONTENT_HASH.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Render queue
// ---------------------------------------------------------------------------

/// One page to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageJob {
    /// Route path (e.g. `/blog/hello-world/`).
    pub path: String,
    /// Where the rendered HTML is written.
    pub html_output: PathBuf,
    /// Where the page data JSON is written, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_output: Option<PathBuf>,
    /// Variables for the page query.
    #[serde(default)]
    pub query_context: serde_json::Value,
    /// Route metadata, opaque to the orchestrator.
    #[serde(default)]
    pub route: serde_json::Value,
    /// Resolved query data, filled in by query execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Ordered pages to render. Order only matters for deterministic chunking.
pub type RenderQueue = Vec<PageJob>;

// ---------------------------------------------------------------------------
// Asset queue
// ---------------------------------------------------------------------------

/// A file copied verbatim into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileJob {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
}

/// An image that must go through the image worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJob {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    /// Transform options (size, format, quality...), opaque to the orchestrator.
    #[serde(default)]
    pub transform: serde_json::Value,
}

impl ImageJob {
    /// File name of the destination, used to reconcile against older builds.
    pub fn dest_file_name(&self) -> Option<&str> {
        file_name(&self.dest_path)
    }
}

/// Files and images collected by earlier stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetQueue {
    #[serde(default)]
    pub files: Vec<FileJob>,
    #[serde(default)]
    pub images: Vec<ImageJob>,
}

// ---------------------------------------------------------------------------
// Redirect
// ---------------------------------------------------------------------------

/// A redirect rule produced by the redirects hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub from: String,
    pub to: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

fn default_redirect_status() -> u16 {
    301
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
