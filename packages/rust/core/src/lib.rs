//! Build orchestration for sitegen.
//!
//! This crate sequences a build run: plugin hooks, compilation, data
//! queries, chunked HTML rendering and image processing on out-of-process
//! workers, asset copies, and cleanup of stale output (see [`pipeline::run`]).

pub mod app;
pub mod compile;
pub mod concurrency;
pub mod files;
pub mod hooks;
pub mod host;
pub mod images;
pub mod pipeline;
pub mod progress;
pub mod render;

#[cfg(test)]
mod testing;

pub use app::{
    App, AssetQueueSource, BuildServices, CompileOutput, Compiler, QueryExecutor,
    RenderQueueBuilder, RunMode, RunOptions, Warnings,
};
pub use hooks::{AfterBuildContext, BeforeBuildContext, Plugin, PluginRegistry};
pub use host::HostProcess;
pub use pipeline::{BuildCounts, BuildSummary, CompletedApp, run};
pub use progress::{ProgressReporter, SilentProgress, StageReport, percent};
