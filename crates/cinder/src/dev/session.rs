//! Result ingestion loop.
//!
//! A [`DevSession`] consumes build results strictly in arrival order. Each
//! result is reconciled into the store, invalidated in the module cache and
//! turned into at most one client notification before the next one is read.
//! Client events reported through the server are handled between results.
//!
//! The first full build bootstraps the server; every later build reuses it.

use parking_lot::RwLock;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};

use cinder_config::DevSettings;

use crate::dev::channel::{ClientChannel, ClientEvent, ClientMessage, InboundHandlers, LogSeverity};
use crate::dev::decision::{decide, Decision};
use crate::dev::invalidate::{invalidate_changed, ModuleInvalidator, NoopInvalidator};
use crate::dev::lifecycle::{AllowList, Lifecycle, ServerContext, ServerFactory};
use crate::dev::result::{
    BuildDiagnostic, BuildResult, ComponentUpdate, ComponentUpdateKind, FullResult,
    IncrementalResult,
};
use crate::dev::store::{OutputRecordStore, SharedStore, UpdatePolicy};
use crate::error::{DevError, Result};
use crate::ui;

/// Client events queued before the loop gets to them.
const INBOUND_CAPACITY: usize = 256;

/// Outcome of the most recent build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BuildStatus {
    /// No result has been received yet
    #[default]
    NotStarted,
    /// The last build produced output
    Success,
    /// The last build failed with error
    Failed { error: String },
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }

    /// Get error message if failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

pub struct DevSession {
    settings: DevSettings,
    store: SharedStore,
    channel: Arc<dyn ClientChannel>,
    invalidator: Arc<dyn ModuleInvalidator>,
    factory: Arc<dyn ServerFactory>,
    lifecycle: Lifecycle,
    allow_list: AllowList,
    status: Arc<RwLock<BuildStatus>>,
    inbound_tx: mpsc::Sender<ClientEvent>,
    inbound_rx: mpsc::Receiver<ClientEvent>,
    /// An error overlay is showing and must be cleared on recovery.
    overlay_visible: bool,
}

impl DevSession {
    pub fn new(
        settings: DevSettings,
        channel: Arc<dyn ClientChannel>,
        factory: Arc<dyn ServerFactory>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            settings,
            store: OutputRecordStore::shared(),
            channel,
            invalidator: Arc::new(NoopInvalidator),
            factory,
            lifecycle: Lifecycle::default(),
            allow_list: AllowList::default(),
            status: Arc::new(RwLock::new(BuildStatus::default())),
            inbound_tx,
            inbound_rx,
            overlay_visible: false,
        }
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn ModuleInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Directories disk assets may always be served from.
    pub fn with_allowed_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.allow_list = AllowList::new(roots);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Base URL of the running server.
    pub fn base_url(&self) -> Option<&str> {
        self.lifecycle.server().map(|server| server.base_url())
    }

    pub fn inbound_handlers(&self) -> InboundHandlers {
        InboundHandlers::new(self.inbound_tx.clone())
    }

    /// Consume `results` until the stream ends or a result violates the
    /// protocol, then tear the server down.
    pub async fn run<S>(self, results: S) -> Result<()>
    where
        S: Stream<Item = BuildResult>,
    {
        self.run_until(results, std::future::pending()).await
    }

    /// Like [`DevSession::run`], but also stops when `shutdown` resolves.
    /// The server is torn down on every exit path.
    pub async fn run_until<S, F>(mut self, results: S, shutdown: F) -> Result<()>
    where
        S: Stream<Item = BuildResult>,
        F: Future<Output = ()>,
    {
        let mut results = std::pin::pin!(results);
        let mut shutdown = std::pin::pin!(shutdown);
        let outcome = self.drive(&mut results, &mut shutdown).await;
        self.shutdown().await;
        outcome
    }

    async fn drive<S, F>(&mut self, results: &mut S, shutdown: &mut F) -> Result<()>
    where
        S: Stream<Item = BuildResult> + Unpin,
        F: Future<Output = ()> + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = &mut *shutdown => {
                    tracing::debug!("Shutdown requested");
                    return Ok(());
                }

                Some(event) = self.inbound_rx.recv() => {
                    self.handle_client_event(event).await;
                }

                next = results.next() => match next {
                    Some(result) => self.handle_result(result).await?,
                    None => {
                        tracing::debug!("Build result stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Stop the server and release the module cache. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if let Lifecycle::Running(server) = std::mem::take(&mut self.lifecycle) {
            tracing::debug!("Stopping server at {}", server.base_url());
            server.close().await;
        }
        self.invalidator.close().await;
    }

    /// Handle one build result to completion.
    pub async fn handle_result(&mut self, result: BuildResult) -> Result<()> {
        tracing::debug!(kind = result.kind_name(), state = self.lifecycle.name(), "build result");

        match result {
            BuildResult::Failure { errors } => {
                self.handle_failure(errors).await;
                Ok(())
            }
            BuildResult::Full(full) => self.handle_full(full).await,
            BuildResult::Incremental(incremental) => self.handle_incremental(incremental).await,
            BuildResult::ComponentUpdate { updates } => {
                self.handle_component_updates(updates).await
            }
            BuildResult::Unknown => {
                tracing::warn!("Skipping build result of unknown kind");
                Ok(())
            }
        }
    }

    async fn handle_failure(&mut self, errors: Vec<BuildDiagnostic>) {
        let summary = errors
            .iter()
            .map(|diagnostic| diagnostic.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for diagnostic in &errors {
            match &diagnostic.location {
                Some(loc) => ui::error(&format!(
                    "{}:{}:{}: {}",
                    loc.file, loc.line, loc.column, diagnostic.text
                )),
                None => ui::error(&diagnostic.text),
            }
        }
        *self.status.write() = BuildStatus::Failed { error: summary };

        if !self.lifecycle.is_running() {
            return;
        }
        let Some(diagnostic) = errors.first() else {
            tracing::debug!("Build failed without diagnostics; nothing to show");
            return;
        };

        self.channel.broadcast(&ClientMessage::error(diagnostic)).await;
        self.overlay_visible = true;
    }

    async fn handle_full(&mut self, full: FullResult) -> Result<()> {
        let policy = if self.lifecycle.is_running() {
            UpdatePolicy::Rebuild
        } else {
            UpdatePolicy::Bootstrap
        };

        {
            let mut store = self.store.write();
            store.reset_for_full_build(full.root_document_hint.as_deref());
            for file in &full.files {
                store.reconcile(file, policy, &self.settings);
            }
            if let Some(externals) = &full.external_metadata {
                store.externals_mut().apply(externals);
            }
            if let Some(base_href) = &full.base_href_hint {
                store.set_base_href(base_href.clone());
            }
        }

        tracing::debug!("Reconciled {} files from full build", full.files.len());
        self.finish_batch(false).await
    }

    async fn handle_incremental(&mut self, incremental: IncrementalResult) -> Result<()> {
        if !self.lifecycle.is_running() {
            return Err(DevError::Protocol(
                "incremental result arrived before the first full build".into(),
            ));
        }

        {
            let mut store = self.store.write();
            for path in &incremental.removed {
                store.remove(path);
            }
            for path in incremental.changed_paths() {
                match incremental.file(path) {
                    Some(file) => store.reconcile(file, UpdatePolicy::Rebuild, &self.settings),
                    None => tracing::warn!("Incremental result lists {} without contents", path),
                }
            }
            if let Some(externals) = &incremental.external_metadata {
                store.externals_mut().apply(externals);
            }
        }

        self.finish_batch(incremental.background).await
    }

    async fn handle_component_updates(&mut self, updates: Vec<ComponentUpdate>) -> Result<()> {
        if !self.settings.hmr {
            return Err(DevError::Protocol(
                "component update arrived while hot module replacement is disabled".into(),
            ));
        }
        if !self.lifecycle.is_running() {
            return Err(DevError::Protocol(
                "component update arrived before the first full build".into(),
            ));
        }

        let timestamp = now();
        for update in updates {
            match update.kind {
                ComponentUpdateKind::Template => {
                    self.store
                        .write()
                        .insert_template_update(update.id.clone(), update.content);
                    self.channel
                        .broadcast(&ClientMessage::component_update(&update.id, timestamp))
                        .await;
                    ui::info(&format!("Component update sent for {}", update.id));
                }
                ComponentUpdateKind::Other => {
                    tracing::warn!("Skipping unsupported component update for {}", update.id);
                }
            }
        }

        Ok(())
    }

    /// Shared tail of full and incremental results.
    async fn finish_batch(&mut self, background: bool) -> Result<()> {
        *self.status.write() = BuildStatus::Success;

        if !self.lifecycle.is_running() {
            return self.bootstrap().await;
        }

        let sources: Vec<PathBuf> = self
            .store
            .read()
            .asset_sources()
            .map(Path::to_path_buf)
            .collect();
        let added = self.allow_list.extend(sources.iter().map(PathBuf::as_path));
        if added > 0 {
            tracing::debug!("Allowed {} new asset directories", added);
        }

        let changed = match invalidate_changed(&self.store, self.invalidator.as_ref()).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!("Cache invalidation failed; skipping client update: {}", e);
                return Ok(());
            }
        };

        if background {
            tracing::debug!("Background build; {} paths changed, clients not notified", changed.len());
            return Ok(());
        }

        if std::mem::take(&mut self.overlay_visible) {
            self.channel.broadcast(&ClientMessage::clear_overlay()).await;
        }

        self.notify(&changed).await;
        Ok(())
    }

    async fn notify(&mut self, changed: &[String]) {
        let decision = {
            let store = self.store.read();
            decide(changed, &store, &self.settings, now())
        };

        match &decision {
            Decision::Nothing => return,
            Decision::CssUpdate(entries) => {
                ui::info(&format!("Stylesheet update sent ({} files)", entries.len()));
            }
            Decision::FullReload => {
                {
                    let mut store = self.store.write();
                    store.clear_style_usage();
                    store.clear_template_updates();
                }
                ui::info("Page reload sent to clients");
            }
        }

        if let Some(message) = decision.message() {
            self.channel.broadcast(&message).await;
        }
    }

    async fn bootstrap(&mut self) -> Result<()> {
        self.lifecycle = Lifecycle::Bootstrapping;

        let sources: Vec<PathBuf> = self
            .store
            .read()
            .asset_sources()
            .map(Path::to_path_buf)
            .collect();
        self.allow_list.extend(sources.iter().map(PathBuf::as_path));

        let context = ServerContext {
            store: self.store.clone(),
            inbound: self.inbound_handlers(),
            allow_list: self.allow_list.clone(),
        };

        let server = self.factory.start(context).await?;
        ui::success(&format!("Development server running at {}", server.base_url()));
        self.lifecycle = Lifecycle::Running(server);
        Ok(())
    }

    /// Handle an event a browser reported.
    pub async fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Log { text, severity } => match severity {
                LogSeverity::Error => tracing::error!(target: "cinder::client", "{}", text),
                LogSeverity::Warning => tracing::warn!(target: "cinder::client", "{}", text),
                LogSeverity::Info => tracing::info!(target: "cinder::client", "{}", text),
            },
            ClientEvent::Invalidate { id, message, error } => {
                {
                    let mut store = self.store.write();
                    store.remove_template_update(&id);
                    store.clear_template_updates();
                    store.clear_style_usage();
                }

                let detail = message.unwrap_or_else(|| "no details".to_string());
                if error {
                    ui::error(&format!("Component update for {} failed: {}", id, detail));
                } else {
                    ui::warning(&format!("Component {} requested a reload: {}", id, detail));
                }

                self.channel.broadcast(&ClientMessage::full_reload()).await;
            }
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
