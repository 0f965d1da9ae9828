//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// cinder - development server for incremental bundler output
#[derive(Parser, Debug)]
#[command(
    name = "cinder",
    version,
    about = "Development server for incremental bundler output",
    long_about = "cinder consumes a stream of build results, keeps the latest output in memory,\n\
                  serves it over HTTP and tells connected browsers to hot-swap stylesheets\n\
                  or reload when something changes."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve build results read as JSON lines
    ///
    /// Each line of the input is one build result. The server starts on the
    /// first full build and keeps running until the input ends or Ctrl+C.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// File to read build results from; `-` reads standard input
    #[arg(short, long, default_value = "-", value_name = "FILE")]
    pub results: PathBuf,

    /// Configuration file (defaults to cinder.toml / cinder.json in the current directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to listen on
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Disable hot replacement; every change reloads the page
    #[arg(long)]
    pub no_hmr: bool,

    /// Disable automatic page reloads
    #[arg(long)]
    pub no_live_reload: bool,
}

impl ServeArgs {
    pub fn reads_stdin(&self) -> bool {
        self.results.as_os_str() == "-"
    }
}
