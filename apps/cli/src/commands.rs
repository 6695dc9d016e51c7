//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sitegen_core::{CompletedApp, HostProcess, ProgressReporter, RunMode, RunOptions, percent};
use sitegen_shared::{
    BuildContext, SiteConfig, init_site_config, load_site_config, load_site_config_from,
};
use sitegen_worker::ProcessWorkerFactory;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sitegen: build a static site with out-of-process render and image workers.
#[derive(Parser)]
#[command(
    name = "sitegen",
    version,
    about = "Build a static site: compile, query, render HTML and process images.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the site.
    Build {
        /// Project root (defaults to the current directory).
        #[arg(long, env = "SITEGEN_CONTEXT")]
        context: Option<PathBuf>,

        /// Config file (defaults to <context>/sitegen.toml).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory, overriding `output_dir`.
        #[arg(short, long)]
        out: Option<String>,

        /// Embed the fixed content hash instead of the compiler's.
        #[arg(long)]
        no_cache_busting: bool,

        /// Keep previous output instead of emptying the output directory.
        #[arg(long)]
        keep_output: bool,

        /// Ask the host for development bundles instead of production ones.
        #[arg(long)]
        development: bool,
    },

    /// Configuration management.
    Config {
        /// Project root (defaults to the current directory).
        #[arg(long, global = true)]
        context: Option<PathBuf>,

        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a sitegen.toml with defaults.
    Init,
    /// Show the config and the paths it resolves to.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitegen=info",
        1 => "sitegen=debug",
        _ => "sitegen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            context,
            config,
            out,
            no_cache_busting,
            keep_output,
            development,
        } => {
            let overrides = Overrides {
                out,
                no_cache_busting,
                keep_output,
            };
            cmd_build(context, config.as_deref(), &overrides, run_mode(development)).await
        }
        Command::Config { context, action } => {
            let root = project_root(context)?;
            match action {
                ConfigAction::Init => cmd_config_init(&root),
                ConfigAction::Show => cmd_config_show(&root),
            }
        }
    }
}

/// Flags that take precedence over `sitegen.toml`.
struct Overrides {
    out: Option<String>,
    no_cache_busting: bool,
    keep_output: bool,
}

impl Overrides {
    fn apply(&self, config: &mut SiteConfig) {
        if let Some(out) = &self.out {
            config.output_dir = out.clone();
        }
        if self.no_cache_busting {
            config.cache_busting = false;
        }
        if self.keep_output {
            config.empty_output_dir = false;
        }
    }
}

fn run_mode(development: bool) -> RunMode {
    if development {
        RunMode::Development
    } else {
        RunMode::Production
    }
}

fn project_root(context: Option<PathBuf>) -> Result<PathBuf> {
    let root = match context {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?,
    };
    std::fs::canonicalize(&root).map_err(|e| eyre!("invalid context '{}': {e}", root.display()))
}

fn load_config(root: &Path, file: Option<&Path>) -> Result<SiteConfig> {
    let config = match file {
        Some(path) => load_site_config_from(path)?,
        None => load_site_config(root)?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(
    context: Option<PathBuf>,
    config_file: Option<&Path>,
    overrides: &Overrides,
    mode: RunMode,
) -> Result<()> {
    let root = project_root(context)?;
    let mut config = load_config(&root, config_file)?;
    overrides.apply(&mut config);

    let context = BuildContext::resolve(&root, &config)?;
    let options = RunOptions {
        mode,
        interactive: std::io::IsTerminal::is_terminal(&std::io::stdout()),
        logical_cpus: num_cpus::get(),
    };

    info!(
        root = %root.display(),
        output = %context.output_dir.display(),
        ?mode,
        "building site"
    );

    let host = Arc::new(HostProcess::spawn(&config.workers.host, &root).await?);
    let workers = Arc::new(ProcessWorkerFactory::new(&root, config.workers.clone()));
    let services = host.services(workers);

    let reporter = CliProgress::new();
    let outcome = sitegen_core::run(context, options, services, &reporter).await;
    reporter.clear();

    if let Err(e) = host.end().await {
        warn!(error = %e, "host process did not shut down cleanly");
    }

    let CompletedApp { summary, .. } = outcome?;

    println!();
    println!("  Build complete!");
    println!("  ID:       {}", summary.build_id);
    println!("  Hash:     {}", summary.content_hash);
    println!("  Pages:    {}", summary.counts.pages);
    println!("  Files:    {}", summary.counts.files + summary.counts.static_files);
    println!(
        "  Images:   {} ({} removed)",
        summary.counts.images, summary.counts.images_removed
    );
    println!("  Warnings: {}", summary.warnings);
    println!("  Time:     {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();

    Ok(())
}

fn cmd_config_init(root: &Path) -> Result<()> {
    let path = init_site_config(root)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(root: &Path) -> Result<()> {
    let config = load_site_config(root)?;
    let context = BuildContext::resolve(root, &config)?;

    println!("{}", toml::to_string_pretty(&config)?);
    println!("# resolved paths");
    println!("# output:    {}", context.output_dir.display());
    println!("# images:    {}", context.images_dir.display());
    println!("# manifests: {}", context.manifests_dir.display());
    println!("# static:    {}", context.static_dir.display());
    println!("# template:  {}", context.render.html_template.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Single-line spinner that shows the current stage.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn stage_progress(&self, stage: &str, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("{stage} ({}%)", percent(completed, total)));
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}
