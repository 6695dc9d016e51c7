//! Plugin lifecycle hooks.
//!
//! `before_build` and `after_build` are awaited for their side effects only.
//! `redirects` is a fold: each plugin receives the previous plugin's result.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use sitegen_shared::{BuildContext, Redirect, RenderQueue, Result, SiteConfig, SitegenError};

use crate::pipeline::BuildSummary;

/// Payload for `before_build`.
#[derive(Debug, Serialize)]
pub struct BeforeBuildContext<'a> {
    pub context: &'a BuildContext,
    pub config: &'a SiteConfig,
}

/// Payload for `after_build`.
#[derive(Debug, Serialize)]
pub struct AfterBuildContext<'a> {
    pub context: &'a BuildContext,
    pub config: &'a SiteConfig,
    pub queue: &'a RenderQueue,
    pub redirects: &'a [Redirect],
    pub summary: &'a BuildSummary,
}

/// A build extension.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    async fn before_build(&self, _ctx: &BeforeBuildContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Return the redirect list, extended or rewritten.
    async fn redirects(
        &self,
        redirects: Vec<Redirect>,
        _queue: &RenderQueue,
    ) -> Result<Vec<Redirect>> {
        Ok(redirects)
    }

    async fn after_build(&self, _ctx: &AfterBuildContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Registered plugins, invoked in registration order.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn before_build(&self, ctx: &BeforeBuildContext<'_>) -> Result<()> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "before_build");
            plugin
                .before_build(ctx)
                .await
                .map_err(|e| hook_error("before_build", plugin.name(), e))?;
        }
        Ok(())
    }

    /// Fold `initial` through every plugin's `redirects` hook.
    pub async fn fold_redirects(
        &self,
        initial: Vec<Redirect>,
        queue: &RenderQueue,
    ) -> Result<Vec<Redirect>> {
        let mut acc = initial;
        for plugin in &self.plugins {
            acc = plugin
                .redirects(acc, queue)
                .await
                .map_err(|e| hook_error("redirects", plugin.name(), e))?;
        }
        Ok(acc)
    }

    pub async fn after_build(&self, ctx: &AfterBuildContext<'_>) -> Result<()> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "after_build");
            plugin
                .after_build(ctx)
                .await
                .map_err(|e| hook_error("after_build", plugin.name(), e))?;
        }
        Ok(())
    }
}

fn hook_error(hook: &str, plugin: &str, err: SitegenError) -> SitegenError {
    match err {
        e @ SitegenError::Hook { .. } => e,
        other => SitegenError::hook(hook, plugin, other.to_string()),
    }
}
