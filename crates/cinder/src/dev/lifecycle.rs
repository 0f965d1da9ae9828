//! One-time server construction and the handle that tears it down.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::dev::channel::InboundHandlers;
use crate::dev::store::SharedStore;
use crate::error::Result;

/// Where the session is in its one-time bootstrap.
#[derive(Debug, Default)]
pub enum Lifecycle {
    /// No full build has been seen.
    #[default]
    Uninitialized,
    /// The first full build is reconciled and the server is being built.
    Bootstrapping,
    Running(ServerHandle),
}

impl Lifecycle {
    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running(_))
    }

    pub fn server(&self) -> Option<&ServerHandle> {
        match self {
            Lifecycle::Running(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Bootstrapping => "bootstrapping",
            Lifecycle::Running(_) => "running",
        }
    }
}

/// A running server.
///
/// Dropping the handle aborts the server task, so the listener is released
/// on every exit path. [`ServerHandle::close`] shuts down gracefully.
#[derive(Debug)]
pub struct ServerHandle {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn new(base_url: String, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            base_url,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// A handle with nothing to stop, for servers owned elsewhere.
    pub fn detached(base_url: String) -> Self {
        Self {
            base_url,
            shutdown: None,
            task: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Signal shutdown and wait for the server task to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Server task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Filesystem roots the server may read disk assets from.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    roots: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl AllowList {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: Arc::new(RwLock::new(roots.into_iter().collect())),
        }
    }

    /// Allow the parent directory of every source. Returns how many roots
    /// were new.
    pub fn extend<'a>(&self, sources: impl IntoIterator<Item = &'a Path>) -> usize {
        let mut roots = self.roots.write();
        let before = roots.len();
        for source in sources {
            let root = source.parent().unwrap_or(source);
            roots.insert(root.to_path_buf());
        }
        roots.len() - before
    }

    pub fn permits(&self, path: &Path) -> bool {
        self.roots.read().iter().any(|root| path.starts_with(root))
    }
}

/// Everything a server needs from the session.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub store: SharedStore,
    pub inbound: InboundHandlers,
    pub allow_list: AllowList,
}

/// Builds the serving environment once, on the first full build.
#[async_trait]
pub trait ServerFactory: Send + Sync {
    async fn start(&self, context: ServerContext) -> Result<ServerHandle>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_extends_with_parent_dirs() {
        let list = AllowList::new([PathBuf::from("/project/src")]);
        assert!(!list.permits(Path::new("/project/public/logo.png")));

        let added = list.extend([
            Path::new("/project/public/logo.png"),
            Path::new("/project/public/robots.txt"),
        ]);
        assert_eq!(added, 1);
        assert!(list.permits(Path::new("/project/public/logo.png")));
        assert!(!list.permits(Path::new("/etc/passwd")));
    }

    #[tokio::test]
    async fn test_close_stops_server_task() {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = rx.await;
        });
        let handle = ServerHandle::new("http://localhost:1/".into(), tx, task);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_drop_aborts_server_task() {
        let (tx, _rx) = oneshot::channel::<()>();
        let (alive_tx, alive_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });
        drop(ServerHandle::new("http://localhost:1/".into(), tx, task));

        // The sender is dropped only when the task is torn down.
        assert!(alive_rx.await.is_err());
    }

    #[test]
    fn test_lifecycle_names() {
        assert_eq!(Lifecycle::default().name(), "uninitialized");
        assert!(!Lifecycle::Bootstrapping.is_running());
        assert!(Lifecycle::Running(ServerHandle::detached("x".into())).is_running());
    }
}
