//! Listener settings for the development server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Only affects the advertised URL; TLS is terminated elsewhere.
    #[serde(default)]
    pub https: bool,

    /// Public path the application is mounted under.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Directories disk-backed assets may be served from.
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            https: false,
            base_path: default_base_path(),
            allowed_roots: Vec::new(),
        }
    }
}

impl ServeConfig {
    /// The server URL as a string, without the base path.
    pub fn server_url(&self) -> String {
        let protocol = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", protocol, self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4200
}

fn default_base_path() -> String {
    "/".into()
}
