//! Compiler stage.

use std::time::Instant;

use tracing::{info, instrument};

use sitegen_shared::Result;

use crate::app::{App, CompileOutput};

/// Run the asset compiler and report how long it took.
#[instrument(skip_all)]
pub async fn run_compiler(app: &App) -> Result<CompileOutput> {
    // Interactive terminals get the compiler's own progress output.
    if !app.options.interactive {
        info!("compiling assets...");
    }

    let start = Instant::now();
    let output = app
        .services
        .compiler
        .compile(&app.context, app.options.mode)
        .await?;
    let elapsed = start.elapsed();

    for warning in &output.warnings {
        app.warnings.push(warning.clone());
    }

    info!(
        hash = %output.hash,
        elapsed_ms = elapsed.as_millis(),
        "compile assets - {:.2}s",
        elapsed.as_secs_f64()
    );

    Ok(output)
}
