//! Build results consumed by the ingestion loop.
//!
//! Results arrive as JSON documents tagged by `kind`. They are validated once
//! here; everything downstream works on these types. Kinds this version does
//! not know deserialize to [`BuildResult::Unknown`] so newer producers do not
//! crash an older dev server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One value of the build result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BuildResult {
    /// The build failed; nothing in the output changed.
    Failure {
        #[serde(default)]
        errors: Vec<BuildDiagnostic>,
    },
    /// Authoritative snapshot of the whole output.
    Full(FullResult),
    /// Diff against the previous output.
    Incremental(IncrementalResult),
    /// Component-level hot updates.
    ComponentUpdate {
        #[serde(default)]
        updates: Vec<ComponentUpdate>,
    },
    #[serde(other)]
    Unknown,
}

impl BuildResult {
    /// Short name used in log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BuildResult::Failure { .. } => "failure",
            BuildResult::Full(_) => "full",
            BuildResult::Incremental(_) => "incremental",
            BuildResult::ComponentUpdate { .. } => "component-update",
            BuildResult::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullResult {
    #[serde(default)]
    pub files: Vec<OutputFile>,

    /// Output path of the generated root document, when it is not `index.html`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_document_hint: Option<String>,

    /// `<base href>` the application was built with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_href_hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_metadata: Option<ExternalMetadataUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalResult {
    #[serde(default)]
    pub added: Vec<String>,

    #[serde(default)]
    pub modified: Vec<String>,

    #[serde(default)]
    pub removed: Vec<String>,

    /// Contents for every path in `added` and `modified`.
    #[serde(default)]
    pub files: Vec<OutputFile>,

    /// Server-only recompilation; clients are not notified.
    #[serde(default)]
    pub background: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_metadata: Option<ExternalMetadataUpdate>,
}

impl IncrementalResult {
    /// Paths to reconcile, additions first.
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }

    /// The reported file for `path`, compared after normalization.
    pub fn file(&self, path: &str) -> Option<&OutputFile> {
        let wanted = normalize_path(path);
        self.files
            .iter()
            .find(|file| normalize_path(&file.path) == wanted)
    }
}

/// A compiler-reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDiagnostic {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<DiagnosticLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_text: Option<String>,
}

/// A hot update for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: ComponentUpdateKind,

    /// Replacement code for the component.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentUpdateKind {
    Template,
    #[serde(other)]
    Other,
}

/// Externalized module specifiers reported by the bundler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetadataUpdate {
    #[serde(default)]
    pub implicit_browser: Vec<String>,

    #[serde(default)]
    pub implicit_server: Vec<String>,

    #[serde(default)]
    pub explicit: Vec<String>,
}

/// One file reported by a full or incremental result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFile {
    /// Output path relative to the build output root.
    pub path: String,

    #[serde(default)]
    pub contents: FileContents,

    /// Content hash; computed locally when the producer omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Output classification; inferred when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OutputKind>,

    #[serde(default)]
    pub origin: FileOrigin,

    /// Source file on disk, for files copied rather than bundled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<PathBuf>,
}

impl OutputFile {
    /// A bundler-produced file.
    pub fn bundled(path: impl Into<String>, contents: impl Into<Vec<u8>>, kind: OutputKind) -> Self {
        Self {
            path: path.into(),
            contents: FileContents::Bytes(contents.into()),
            hash: None,
            kind: Some(kind),
            origin: FileOrigin::Bundled,
            input_path: None,
        }
    }

    /// A file forwarded as-is from disk.
    pub fn from_disk(path: impl Into<String>, input_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: FileContents::default(),
            hash: None,
            kind: Some(OutputKind::Media),
            origin: FileOrigin::Disk,
            input_path: Some(input_path.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContents {
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for FileContents {
    fn default() -> Self {
        FileContents::Text(String::new())
    }
}

impl FileContents {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContents::Text(text) => text.as_bytes(),
            FileContents::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Browser,
    Server,
    Media,
}

impl OutputKind {
    /// Server bundles are kept for server-side rendering but never served.
    pub fn is_servable(self) -> bool {
        matches!(self, OutputKind::Browser | OutputKind::Media)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileOrigin {
    #[default]
    Bundled,
    Disk,
}

/// Normalize an output path to a request path: forward slashes, one leading
/// slash, no `./` prefix.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_start_matches("./").trim_start_matches('/');
    format!("/{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("main.js"), "/main.js");
        assert_eq!(normalize_path("/main.js"), "/main.js");
        assert_eq!(normalize_path("./media/a.png"), "/media/a.png");
        assert_eq!(normalize_path("browser\\chunk.js"), "/browser/chunk.js");
    }

    #[test]
    fn test_deserialize_full_result() {
        let json = r#"{
            "kind": "full",
            "files": [
                { "path": "index.html", "contents": "<html></html>", "kind": "browser" },
                { "path": "logo.png", "origin": "disk", "inputPath": "/project/public/logo.png" }
            ],
            "rootDocumentHint": "app.html"
        }"#;

        let result: BuildResult = serde_json::from_str(json).unwrap();
        let BuildResult::Full(full) = result else {
            panic!("expected a full result");
        };
        assert_eq!(full.files.len(), 2);
        assert_eq!(full.files[0].contents.as_bytes(), b"<html></html>");
        assert_eq!(full.files[1].origin, FileOrigin::Disk);
        assert_eq!(full.root_document_hint.as_deref(), Some("app.html"));
    }

    #[test]
    fn test_deserialize_byte_contents() {
        let json = r#"{ "path": "a.bin", "contents": [0, 159, 255] }"#;
        let file: OutputFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.contents.as_bytes(), &[0, 159, 255]);
        assert_eq!(file.origin, FileOrigin::Bundled);
        assert!(file.kind.is_none());
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let result: BuildResult = serde_json::from_str(r#"{ "kind": "telemetry" }"#).unwrap();
        assert_eq!(result, BuildResult::Unknown);
        assert_eq!(result.kind_name(), "unknown");
    }

    #[test]
    fn test_component_update_kinds() {
        let json = r#"{
            "kind": "component-update",
            "updates": [
                { "id": "c42", "type": "template", "content": "export default 1;" },
                { "id": "c43", "type": "style" }
            ]
        }"#;
        let BuildResult::ComponentUpdate { updates } = serde_json::from_str(json).unwrap() else {
            panic!("expected component updates");
        };
        assert_eq!(updates[0].kind, ComponentUpdateKind::Template);
        assert_eq!(updates[1].kind, ComponentUpdateKind::Other);
    }

    #[test]
    fn test_incremental_file_lookup_normalizes() {
        let result = IncrementalResult {
            modified: vec!["/main.js".into()],
            files: vec![OutputFile::bundled("main.js", "x", OutputKind::Browser)],
            ..IncrementalResult::default()
        };
        assert!(result.file("/main.js").is_some());
        assert!(result.file("other.js").is_none());
        assert_eq!(result.changed_paths().collect::<Vec<_>>(), vec!["/main.js"]);
    }
}
