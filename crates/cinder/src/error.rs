//! Error handling for the cinder development server.
//!
//! `DevError` is the single error type returned by the ingestion loop, the
//! serving layer and the command-line front end. Variants map onto how the
//! loop reacts:
//!
//! - `Protocol` aborts the loop: the build producer broke its contract
//! - `Server` is fatal: there is no degraded mode without a listener
//! - `Invalidation` fails only the batch that raised it
//!
//! Build failures reported by the bundler are not errors here; they are
//! results, forwarded to clients as an overlay.

mod report;

pub use report::dev_error_to_miette;

use std::path::PathBuf;
use thiserror::Error;

use cinder_config::ConfigError;

#[derive(Debug, Error)]
pub enum DevError {
    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The build producer violated the result protocol
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The serving environment could not be constructed or stopped serving
    #[error("Server error: {0}")]
    Server(String),

    /// The module-evaluation cache refused an invalidation
    #[error("Cache invalidation failed: {0}")]
    Invalidation(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = DevError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into `DevError::FileNotFound` for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<DevError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            DevError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                DevError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: DevError = e.into();
            DevError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: DevError = e.into();
            DevError::Custom(format!("{}: {}", msg, err))
        })
    }
}
