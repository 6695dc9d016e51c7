//! Site configuration for sitegen.
//!
//! Project config lives at `<root>/sitegen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitegenError};

/// Default configuration file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "sitegen.toml";

/// Pages per HTML render request.
pub const DEFAULT_RENDER_CHUNK_SIZE: usize = 350;

/// Images per image-worker request.
pub const DEFAULT_IMAGE_CHUNK_SIZE: usize = 25;

// ---------------------------------------------------------------------------
// Config structs (matching sitegen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level site config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Build output directory, relative to the project root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Processed images directory. Defaults to `<output_dir>/assets/static`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_dir: Option<String>,

    /// Internal build manifests. Defaults to `<output_dir>/manifest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests_dir: Option<String>,

    /// Directory copied verbatim into the output directory.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Clear the output directory before anything is written.
    #[serde(default = "default_true")]
    pub empty_output_dir: bool,

    /// Embed the compiler's build hash instead of a fixed token.
    #[serde(default = "default_true")]
    pub cache_busting: bool,

    /// HTML rendering.
    #[serde(default)]
    pub render: RenderSection,

    /// Image processing.
    #[serde(default)]
    pub images: ImagesSection,

    /// Worker and host process commands.
    #[serde(default)]
    pub workers: WorkersSection,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            images_dir: None,
            manifests_dir: None,
            static_dir: default_static_dir(),
            empty_output_dir: true,
            cache_busting: true,
            render: RenderSection::default(),
            images: ImagesSection::default(),
            workers: WorkersSection::default(),
        }
    }
}

fn default_output_dir() -> String {
    "dist".into()
}
fn default_static_dir() -> String {
    "static".into()
}
fn default_true() -> bool {
    true
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSection {
    /// HTML template. Defaults to `src/index.html`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_template: Option<String>,

    /// Client manifest. Defaults to `<manifests_dir>/client.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_manifest: Option<String>,

    /// Server bundle. Defaults to `<manifests_dir>/server.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_bundle: Option<String>,

    /// Forwarded to the HTML worker untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch: Option<serde_json::Value>,

    /// Forwarded to the HTML worker untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<serde_json::Value>,

    /// Pages per render request.
    #[serde(default = "default_render_chunk_size")]
    pub chunk_size: usize,

    /// Maximum render requests in flight. Unset means every chunk at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            html_template: None,
            client_manifest: None,
            server_bundle: None,
            prefetch: None,
            preload: None,
            chunk_size: default_render_chunk_size(),
            concurrency: None,
        }
    }
}

fn default_render_chunk_size() -> usize {
    DEFAULT_RENDER_CHUNK_SIZE
}

/// `[images]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesSection {
    /// Delete images left over from a previous build.
    #[serde(default)]
    pub remove_unused: bool,

    /// Images per worker request.
    #[serde(default = "default_image_chunk_size")]
    pub chunk_size: usize,

    /// Transform options, passed through to the image worker.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            remove_unused: false,
            chunk_size: default_image_chunk_size(),
            options: serde_json::Map::new(),
        }
    }
}

fn default_image_chunk_size() -> usize {
    DEFAULT_IMAGE_CHUNK_SIZE
}

/// `[workers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersSection {
    /// HTML render worker.
    #[serde(default = "default_html_worker")]
    pub html: WorkerCommand,

    /// Image transform worker.
    #[serde(default = "default_image_worker")]
    pub images: WorkerCommand,

    /// Host process providing compiler, queries and plugin hooks.
    #[serde(default = "default_host")]
    pub host: WorkerCommand,

    /// Worker processes per session. Defaults to logical CPUs - 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processes: Option<usize>,
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            html: default_html_worker(),
            images: default_image_worker(),
            host: default_host(),
            processes: None,
        }
    }
}

impl WorkersSection {
    /// Effective number of processes per worker session.
    pub fn process_count(&self) -> usize {
        self.processes
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}

/// A command line used to start a worker or host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }
}

fn default_html_worker() -> WorkerCommand {
    WorkerCommand::new("sitegen-html-worker")
}
fn default_image_worker() -> WorkerCommand {
    WorkerCommand::new("sitegen-image-worker")
}
fn default_host() -> WorkerCommand {
    WorkerCommand::new("sitegen-host")
}

// ---------------------------------------------------------------------------
// Build context (runtime, resolved from config + CLI flags)
// ---------------------------------------------------------------------------

/// Immutable per-run view of the configuration with absolute paths.
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    /// Project root.
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub manifests_dir: PathBuf,
    pub static_dir: PathBuf,
    pub empty_output_dir: bool,
    pub cache_busting: bool,
    pub render: RenderConfig,
    pub images: ImagesConfig,
    /// The config this context was resolved from.
    pub config: SiteConfig,
}

/// Resolved `[render]` settings.
#[derive(Debug, Clone, Serialize)]
pub struct RenderConfig {
    pub html_template: PathBuf,
    pub client_manifest_path: PathBuf,
    pub server_bundle_path: PathBuf,
    pub prefetch: Option<serde_json::Value>,
    pub preload: Option<serde_json::Value>,
    pub chunk_size: usize,
    pub concurrency: Option<usize>,
}

/// Resolved `[images]` settings, forwarded to the image worker as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ImagesConfig {
    pub remove_unused: bool,
    pub chunk_size: usize,
    pub images_dir: PathBuf,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl BuildContext {
    /// Resolve `config` against the project `root`.
    pub fn resolve(root: &Path, config: &SiteConfig) -> Result<Self> {
        if config.render.chunk_size == 0 {
            return Err(SitegenError::config("render.chunk_size must be at least 1"));
        }
        if config.images.chunk_size == 0 {
            return Err(SitegenError::config("images.chunk_size must be at least 1"));
        }
        if config.render.concurrency == Some(0) {
            return Err(SitegenError::config("render.concurrency must be at least 1"));
        }

        let root = root.to_path_buf();
        let output_dir = resolve_path(&root, &config.output_dir);
        let images_dir = match &config.images_dir {
            Some(dir) => resolve_path(&root, dir),
            None => output_dir.join("assets").join("static"),
        };
        let manifests_dir = match &config.manifests_dir {
            Some(dir) => resolve_path(&root, dir),
            None => output_dir.join("manifest"),
        };
        let static_dir = resolve_path(&root, &config.static_dir);

        let render = RenderConfig {
            html_template: resolve_or(&root, config.render.html_template.as_deref(), || {
                root.join("src").join("index.html")
            }),
            client_manifest_path: resolve_or(&root, config.render.client_manifest.as_deref(), || {
                manifests_dir.join("client.json")
            }),
            server_bundle_path: resolve_or(&root, config.render.server_bundle.as_deref(), || {
                manifests_dir.join("server.json")
            }),
            prefetch: config.render.prefetch.clone(),
            preload: config.render.preload.clone(),
            chunk_size: config.render.chunk_size,
            concurrency: config.render.concurrency,
        };

        let images = ImagesConfig {
            remove_unused: config.images.remove_unused,
            chunk_size: config.images.chunk_size,
            images_dir: images_dir.clone(),
            options: config.images.options.clone(),
        };

        Ok(Self {
            root,
            output_dir,
            images_dir,
            manifests_dir,
            static_dir,
            empty_output_dir: config.empty_output_dir,
            cache_busting: config.cache_busting,
            render,
            images,
            config: config.clone(),
        })
    }
}

fn resolve_path(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn resolve_or(root: &Path, value: Option<&str>, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    value.map_or_else(fallback, |v| resolve_path(root, v))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path to the config file for a project root.
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load the site config for `root`. Returns defaults if the file does not exist.
pub fn load_site_config(root: &Path) -> Result<SiteConfig> {
    let path = config_file_path(root);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(SiteConfig::default());
    }

    load_site_config_from(&path)
}

/// Load the site config from a specific file path.
pub fn load_site_config_from(path: &Path) -> Result<SiteConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SitegenError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SitegenError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default `sitegen.toml` into `root`.
/// Returns the path to the created file.
pub fn init_site_config(root: &Path) -> Result<PathBuf> {
    let path = config_file_path(root);
    if path.exists() {
        return Err(SitegenError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&SiteConfig::default())
        .map_err(|e| SitegenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SitegenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
