//! In-memory mirror of the build output.
//!
//! The ingestion loop is the only writer. The serving layer reads through the
//! same lock, and writes only the usage tracking of component stylesheets.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinder_config::DevSettings;

use crate::dev::externals::ExternalDependencyMetadata;
use crate::dev::result::{normalize_path, FileOrigin, OutputFile, OutputKind};

/// Request path of the root document.
pub const ROOT_DOCUMENT: &str = "/index.html";

/// Placeholder the compiler leaves in emulated-encapsulation stylesheets.
pub const COMPONENT_PLACEHOLDER: &str = "%COMP%";

static COMPONENT_STYLESHEET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/[0-9a-f]{64}\.css$").expect("component stylesheet pattern is valid")
});

/// Whether `path` names an extracted component stylesheet.
pub fn is_component_stylesheet(path: &str) -> bool {
    COMPONENT_STYLESHEET.is_match(path)
}

/// Handle shared between the ingestion loop and the serving layer.
pub type SharedStore = Arc<RwLock<OutputRecordStore>>;

/// A build-produced file that can be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFileRecord {
    contents: Vec<u8>,
    hash: String,
    kind: OutputKind,
    servable: bool,
    pub updated: bool,
}

impl GeneratedFileRecord {
    /// Create a record. Without a reported hash one is computed, so contents
    /// and hash always agree.
    pub fn new(contents: Vec<u8>, hash: Option<String>, kind: OutputKind, updated: bool) -> Self {
        let hash = hash.unwrap_or_else(|| content_hash(&contents));
        Self {
            contents,
            hash,
            kind,
            servable: kind.is_servable(),
            updated,
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn size(&self) -> usize {
        self.contents.len()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn is_servable(&self) -> bool {
        self.servable
    }
}

/// A disk-backed file forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub source: PathBuf,
    pub updated: bool,
}

/// Derived record for an extracted component stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentStyleRecord {
    pub raw: Vec<u8>,
    /// Components that requested this stylesheet since the last full reload.
    pub used: BTreeSet<String>,
    /// Set once a client used an encapsulation that cannot be hot-swapped.
    pub reload: bool,
}

/// How a component stylesheet is scoped in the page that requests it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StyleEncapsulation {
    #[default]
    Emulated,
    None,
    ShadowDom,
}

impl StyleEncapsulation {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "emulated" => Some(Self::Emulated),
            "none" => Some(Self::None),
            "shadow-dom" => Some(Self::ShadowDom),
            _ => None,
        }
    }
}

/// Whether a reconciled file counts as a change clients must hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// First full build: the store is populated silently.
    Bootstrap,
    /// Any later build.
    Rebuild,
}

impl UpdatePolicy {
    fn marks_updated(self) -> bool {
        self == UpdatePolicy::Rebuild
    }
}

/// Paths drained from the store's `updated` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainedChanges {
    /// Asset paths followed by generated-file paths.
    pub paths: Vec<String>,
    /// Generated-file paths only; these go to the module cache.
    pub generated: Vec<String>,
    /// A server bundle changed.
    pub server_changed: bool,
}

#[derive(Debug, Default)]
pub struct OutputRecordStore {
    files: BTreeMap<String, GeneratedFileRecord>,
    assets: BTreeMap<String, AssetRecord>,
    component_styles: HashMap<String, ComponentStyleRecord>,
    template_updates: BTreeMap<String, String>,
    externals: ExternalDependencyMetadata,
    root_document_output: Option<String>,
    base_href: Option<String>,
}

impl OutputRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn file(&self, path: &str) -> Option<&GeneratedFileRecord> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &GeneratedFileRecord)> {
        self.files.iter().map(|(path, record)| (path.as_str(), record))
    }

    pub fn asset(&self, path: &str) -> Option<&AssetRecord> {
        self.assets.get(path)
    }

    pub fn component_style(&self, path: &str) -> Option<&ComponentStyleRecord> {
        self.component_styles.get(path)
    }

    pub fn template_update(&self, component_id: &str) -> Option<&str> {
        self.template_updates.get(component_id).map(String::as_str)
    }

    pub fn externals(&self) -> &ExternalDependencyMetadata {
        &self.externals
    }

    pub fn externals_mut(&mut self) -> &mut ExternalDependencyMetadata {
        &mut self.externals
    }

    /// Prefix request paths carry in front of the store's keys.
    pub fn base_href(&self) -> Option<&str> {
        self.base_href.as_deref()
    }

    pub fn set_base_href(&mut self, base_href: String) {
        self.base_href = Some(base_href);
    }

    /// Source paths of every disk-backed asset.
    pub fn asset_sources(&self) -> impl Iterator<Item = &Path> {
        self.assets.values().map(|record| record.source.as_path())
    }

    /// Map an output path to the request path it is served under.
    pub fn public_path(&self, output_path: &str) -> String {
        let normalized = normalize_path(output_path);
        match &self.root_document_output {
            Some(root) if *root == normalized => ROOT_DOCUMENT.to_string(),
            _ => normalized,
        }
    }

    /// Drop everything a full build replaces.
    ///
    /// The root document hint is remembered for the files that follow.
    /// Externals are not touched; they are replaced only when a result
    /// reports them.
    pub fn reset_for_full_build(&mut self, root_document_hint: Option<&str>) {
        if let Some(hint) = root_document_hint {
            self.root_document_output = Some(normalize_path(hint));
        }
        self.component_styles.clear();
        self.assets.clear();
        self.files.clear();
        self.template_updates.clear();
    }

    /// Remove both the generated file and the asset at `path`. Missing keys
    /// are ignored.
    pub fn remove(&mut self, path: &str) {
        let public = self.public_path(path);
        self.files.remove(&public);
        self.assets.remove(&public);
    }

    /// Apply one reported file.
    pub fn reconcile(&mut self, file: &OutputFile, policy: UpdatePolicy, settings: &DevSettings) {
        let updated = policy.marks_updated();

        if file.origin == FileOrigin::Disk {
            let public = normalize_path(&file.path);
            let Some(source) = file.input_path.clone() else {
                tracing::warn!("Disk asset {} has no input path; skipping", public);
                return;
            };
            tracing::debug!("asset {} -> {}", public, source.display());
            self.assets.insert(public, AssetRecord { source, updated });
            return;
        }

        let public = self.public_path(&file.path);
        let kind = file.kind.unwrap_or_else(|| {
            if settings.is_file_loader_path(&public) {
                OutputKind::Media
            } else {
                OutputKind::Browser
            }
        });
        let contents = file.contents.as_bytes().to_vec();

        if public.ends_with(".map") {
            self.files.insert(
                public,
                GeneratedFileRecord::new(contents, file.hash.clone(), kind, false),
            );
            return;
        }

        if is_component_stylesheet(&public) {
            self.component_styles
                .entry(public.clone())
                .or_default()
                .raw = contents.clone();
        }

        tracing::debug!("generated {} ({} bytes, updated: {})", public, contents.len(), updated);
        self.files.insert(
            public,
            GeneratedFileRecord::new(contents, file.hash.clone(), kind, updated),
        );
    }

    /// Collect every path flagged `updated` and reset the flags.
    pub fn drain_updated(&mut self) -> DrainedChanges {
        let mut changes = DrainedChanges::default();

        for (path, asset) in self.assets.iter_mut().filter(|(_, asset)| asset.updated) {
            asset.updated = false;
            changes.paths.push(path.clone());
        }

        for (path, file) in self.files.iter_mut().filter(|(_, file)| file.updated) {
            file.updated = false;
            if file.kind == OutputKind::Server {
                changes.server_changed = true;
            }
            changes.paths.push(path.clone());
            changes.generated.push(path.clone());
        }

        changes
    }

    pub fn insert_template_update(&mut self, component_id: String, code: String) {
        self.template_updates.insert(component_id, code);
    }

    pub fn remove_template_update(&mut self, component_id: &str) -> Option<String> {
        self.template_updates.remove(component_id)
    }

    /// Drop every pending template patch.
    pub fn clear_template_updates(&mut self) {
        self.template_updates.clear();
    }

    /// Forget which components used which stylesheet.
    pub fn clear_style_usage(&mut self) {
        for record in self.component_styles.values_mut() {
            record.used.clear();
        }
    }

    /// Serve a component stylesheet for one component, recording the usage.
    ///
    /// Returns `None` when `path` is not a known component stylesheet.
    pub fn serve_component_style(
        &mut self,
        path: &str,
        component_id: Option<&str>,
        encapsulation: StyleEncapsulation,
    ) -> Option<Vec<u8>> {
        let record = self.component_styles.get_mut(path)?;
        let Some(component_id) = component_id else {
            return Some(record.raw.clone());
        };

        record.used.insert(component_id.to_string());
        match encapsulation {
            StyleEncapsulation::ShadowDom => {
                record.reload = true;
                Some(record.raw.clone())
            }
            StyleEncapsulation::None => Some(record.raw.clone()),
            StyleEncapsulation::Emulated => {
                let css = String::from_utf8_lossy(&record.raw);
                Some(css.replace(COMPONENT_PLACEHOLDER, component_id).into_bytes())
            }
        }
    }
}

/// BLAKE3 hex digest of `contents`.
pub fn content_hash(contents: &[u8]) -> String {
    blake3::hash(contents).to_hex().to_string()
}
