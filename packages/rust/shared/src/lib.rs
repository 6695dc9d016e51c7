//! Shared types, error model, and configuration for sitegen.
//!
//! This crate is the foundation depended on by all other sitegen crates.
//! It provides:
//! - [`SitegenError`]: the unified error type
//! - Domain types ([`PageJob`], [`FileJob`], [`ImageJob`], [`ContentHash`], [`BuildId`])
//! - Configuration ([`SiteConfig`], [`BuildContext`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BuildContext, CONFIG_FILE_NAME, DEFAULT_IMAGE_CHUNK_SIZE, DEFAULT_RENDER_CHUNK_SIZE,
    ImagesConfig, ImagesSection, RenderConfig, RenderSection, SiteConfig, WorkerCommand,
    WorkersSection, config_file_path, init_site_config, load_site_config, load_site_config_from,
};
pub use error::{Result, SitegenError};
pub use types::{
    AssetQueue, BuildId, ContentHash, FileJob, ImageJob, PageJob, Redirect, RenderQueue,
    STATIC_CONTENT_HASH,
};
