//! Client refresh settings.

use serde::{Deserialize, Serialize};

/// Controls what connected browsers are told after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevSettings {
    /// Hot replacement of stylesheets and component templates.
    #[serde(default = "default_true")]
    pub hmr: bool,

    /// Full page reload when a change cannot be hot-swapped.
    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// Extensions (without the dot) emitted through the file loader.
    ///
    /// Output files with one of these extensions and no explicit output kind
    /// are classified as media.
    #[serde(default)]
    pub file_loader_extensions: Vec<String>,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            hmr: true,
            live_reload: true,
            file_loader_extensions: Vec::new(),
        }
    }
}

impl DevSettings {
    /// Whether `path` ends with one of the file-loader extensions.
    pub fn is_file_loader_path(&self, path: &str) -> bool {
        let Some((_, ext)) = path.rsplit_once('.') else {
            return false;
        };
        self.file_loader_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    }
}

fn default_true() -> bool {
    true
}
