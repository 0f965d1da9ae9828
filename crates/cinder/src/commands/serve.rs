//! `cinder serve`: run a development session over a stream of build results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;

use cinder_config::{CinderConfig, ConfigOverrides, DevOverrides, ServeOverrides};

use crate::cli::ServeArgs;
use crate::dev::{json_lines, AxumServerFactory, ClientHub, DevSession};
use crate::error::{Result, ResultExt};
use crate::ui;

/// Execute the serve command.
///
/// Loads configuration, then feeds every build result from the input to a
/// [`DevSession`]. Stops at the end of the input or on Ctrl+C.
pub async fn execute(args: ServeArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let config = CinderConfig::load(&cwd, args.config.as_deref(), &overrides(&args))?;

    tracing::debug!(?config, "configuration loaded");
    ui::info(&format!(
        "Hot replacement {}, live reload {}",
        enabled(config.dev.hmr),
        enabled(config.dev.live_reload)
    ));

    let hub = ClientHub::new();
    let factory = Arc::new(AxumServerFactory::new(config.serve.clone(), hub.clone()));
    let session = DevSession::new(config.dev.clone(), hub, factory)
        .with_allowed_roots(resolve_roots(&cwd, &config.serve.allowed_roots));

    if args.reads_stdin() {
        ui::info("Reading build results from standard input");
        run(session, BufReader::new(tokio::io::stdin())).await
    } else {
        let file = File::open(&args.results).await.with_path(&args.results)?;
        ui::info(&format!("Reading build results from {}", args.results.display()));
        run(session, BufReader::new(file)).await
    }
}

async fn run<R>(session: DevSession, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    ui::info("Waiting for the first build. Press Ctrl+C to stop");

    session.run_until(json_lines(reader), ctrl_c()).await?;

    ui::success("Development server stopped");
    Ok(())
}

/// Resolves on Ctrl+C. Never resolves when the handler cannot be installed.
async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => ui::info("Shutting down development server..."),
        Err(e) => {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn overrides(args: &ServeArgs) -> ConfigOverrides {
    ConfigOverrides {
        dev: DevOverrides {
            hmr: args.no_hmr.then_some(false),
            live_reload: args.no_live_reload.then_some(false),
        },
        serve: ServeOverrides {
            host: args.host.clone(),
            port: args.port,
        },
    }
}

fn resolve_roots(cwd: &Path, roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .map(|root| if root.is_absolute() { root.clone() } else { cwd.join(root) })
        .collect()
}

fn enabled(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
