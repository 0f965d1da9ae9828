//! cinder - development server for incremental bundler output.
//!
//! A build producer reports full, incremental and component-level results.
//! cinder keeps the latest output in memory, serves it over HTTP, and tells
//! connected browsers whether to hot-swap stylesheets, swap a component
//! template, or reload the page.
//!
//! # Architecture
//!
//! - [`dev`] - the ingestion loop, output store, update decisions and server
//! - [`error`] - error types and miette reporting
//! - [`logger`] - structured logging with tracing
//! - [`ui`] - terminal status lines
//! - [`cli`] / [`commands`] - the `cinder` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cinder::dev::{AxumServerFactory, BuildResult, ClientHub, DevSession};
//! use cinder_config::{DevSettings, ServeConfig};
//!
//! # async fn example(results: impl tokio_stream::Stream<Item = BuildResult>) -> cinder::Result<()> {
//! let hub = ClientHub::new();
//! let factory = Arc::new(AxumServerFactory::new(ServeConfig::default(), hub.clone()));
//! DevSession::new(DevSettings::default(), hub, factory)
//!     .run(results)
//!     .await
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{DevError, Result, ResultExt};
