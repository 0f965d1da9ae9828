//! Server-side cache invalidation.
//!
//! Runs after every reconciled batch and before the update decision, so a
//! client is never told about content the server still has cached.

use async_trait::async_trait;

use crate::dev::store::SharedStore;
use crate::error::Result;

/// The module-evaluation cache that server-side rendering runs on.
#[async_trait]
pub trait ModuleInvalidator: Send + Sync {
    /// Drop the cached module for a public request path.
    async fn invalidate_module(&self, public_path: &str) -> Result<()>;

    /// Drop the cached server-rendering application so the next render
    /// evaluates the new server bundle.
    async fn discard_server_application(&self) -> Result<()>;

    /// Release resources held by the cache. Called once at teardown.
    async fn close(&self) {}
}

/// Invalidator for sessions without server-side rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

#[async_trait]
impl ModuleInvalidator for NoopInvalidator {
    async fn invalidate_module(&self, public_path: &str) -> Result<()> {
        tracing::trace!("invalidate {}", public_path);
        Ok(())
    }

    async fn discard_server_application(&self) -> Result<()> {
        tracing::trace!("discard server application");
        Ok(())
    }
}

/// Drain the store's changed paths and invalidate them.
///
/// Returns every changed request path, assets first. Paths are reported
/// once per content version: a second call without new changes returns an
/// empty list.
pub async fn invalidate_changed(
    store: &SharedStore,
    invalidator: &dyn ModuleInvalidator,
) -> Result<Vec<String>> {
    // The guard must be gone before the first await.
    let drained = store.write().drain_updated();

    for path in &drained.generated {
        invalidator.invalidate_module(path).await?;
    }

    if drained.server_changed {
        tracing::debug!("server bundle changed; discarding cached application");
        invalidator.discard_server_application().await?;
    }

    Ok(drained.paths)
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingInvalidator;
    use super::*;
    use crate::dev::result::{OutputFile, OutputKind};
    use crate::dev::store::{OutputRecordStore, UpdatePolicy};
    use cinder_config::DevSettings;

    fn store_with(files: &[OutputFile]) -> SharedStore {
        let store = OutputRecordStore::shared();
        {
            let mut guard = store.write();
            for file in files {
                guard.reconcile(file, UpdatePolicy::Rebuild, &DevSettings::default());
            }
        }
        store
    }

    #[tokio::test]
    async fn test_drain_is_idempotent() {
        let store = store_with(&[OutputFile::bundled("main.js", "1", OutputKind::Browser)]);
        let invalidator = RecordingInvalidator::default();

        let first = invalidate_changed(&store, &invalidator).await.unwrap();
        assert_eq!(first, vec!["/main.js"]);

        let second = invalidate_changed(&store, &invalidator).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(*invalidator.invalidated.lock(), vec!["/main.js"]);
    }

    #[tokio::test]
    async fn test_server_bundle_discards_application() {
        let store = store_with(&[
            OutputFile::bundled("main.js", "1", OutputKind::Browser),
            OutputFile::bundled("server.mjs", "2", OutputKind::Server),
        ]);
        let invalidator = RecordingInvalidator::default();

        invalidate_changed(&store, &invalidator).await.unwrap();
        assert_eq!(*invalidator.discarded.lock(), 1);
    }

    #[tokio::test]
    async fn test_browser_only_batch_keeps_application() {
        let store = store_with(&[OutputFile::bundled("main.js", "1", OutputKind::Browser)]);
        let invalidator = RecordingInvalidator::default();

        invalidate_changed(&store, &invalidator).await.unwrap();
        assert_eq!(*invalidator.discarded.lock(), 0);
    }

    #[tokio::test]
    async fn test_assets_are_reported_but_not_invalidated() {
        let store = store_with(&[OutputFile::from_disk("logo.png", "/p/logo.png")]);
        let invalidator = RecordingInvalidator::default();

        let changed = invalidate_changed(&store, &invalidator).await.unwrap();
        assert_eq!(changed, vec!["/logo.png"]);
        assert!(invalidator.invalidated.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let store = store_with(&[OutputFile::bundled("main.js", "1", OutputKind::Browser)]);
        let invalidator = RecordingInvalidator {
            fail: true,
            ..RecordingInvalidator::default()
        };

        let err = invalidate_changed(&store, &invalidator).await.unwrap_err();
        assert!(matches!(err, crate::error::DevError::Invalidation(_)));
    }
}
