//! Update decision engine.
//!
//! Turns the changed paths of one batch into at most one client notification.
//! CSS-only batches are hot-swapped when every stylesheet allows it; anything
//! else becomes a full reload, if the session wants automatic reloads at all.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use cinder_config::DevSettings;

use crate::dev::channel::{ClientMessage, UpdateEntry};
use crate::dev::store::OutputRecordStore;

/// Query values keep the unreserved URL characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const STYLESHEET_EXTENSIONS: &[&str] = &[".css", ".scss", ".sass", ".less"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Nothing,
    CssUpdate(Vec<UpdateEntry>),
    FullReload,
}

impl Decision {
    /// The message to broadcast, if any.
    pub fn message(&self) -> Option<ClientMessage> {
        match self {
            Decision::Nothing => None,
            Decision::CssUpdate(entries) => Some(ClientMessage::Update {
                updates: entries.clone(),
            }),
            Decision::FullReload => Some(ClientMessage::full_reload()),
        }
    }
}

pub fn is_stylesheet(path: &str) -> bool {
    STYLESHEET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Request path that serves `path` scoped to one component.
pub fn component_path(path: &str, component_id: &str) -> String {
    format!(
        "{}?component={}",
        path,
        utf8_percent_encode(component_id, QUERY_VALUE)
    )
}

/// Decide how clients learn about `changed`.
///
/// Does not touch the store. The caller clears component style usage when
/// the result is [`Decision::FullReload`].
pub fn decide(
    changed: &[String],
    store: &OutputRecordStore,
    settings: &DevSettings,
    timestamp: i64,
) -> Decision {
    if changed.is_empty() {
        return Decision::Nothing;
    }

    if settings.hmr && changed.iter().all(|path| is_stylesheet(path)) {
        if let Some(entries) = css_updates(changed, store, timestamp) {
            return Decision::CssUpdate(entries);
        }
        tracing::debug!("stylesheet uses an encapsulation that cannot be hot-swapped");
    }

    if settings.live_reload {
        Decision::FullReload
    } else {
        Decision::Nothing
    }
}

/// `None` when any stylesheet in the batch must not be hot-swapped.
fn css_updates(
    changed: &[String],
    store: &OutputRecordStore,
    timestamp: i64,
) -> Option<Vec<UpdateEntry>> {
    let mut entries = Vec::new();

    for path in changed {
        let Some(record) = store.component_style(path) else {
            entries.push(UpdateEntry::css(path.clone(), timestamp));
            continue;
        };

        if record.reload {
            return None;
        }

        if record.used.is_empty() {
            entries.push(UpdateEntry::css(path.clone(), timestamp));
        } else {
            entries.extend(
                record
                    .used
                    .iter()
                    .map(|id| UpdateEntry::css(component_path(path, id), timestamp)),
            );
        }
    }

    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::result::{OutputFile, OutputKind};
    use crate::dev::store::{StyleEncapsulation, UpdatePolicy};

    const STYLE_A: &str = "/deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef.css";
    const STYLE_B: &str = "/0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef.css";

    fn settings(hmr: bool, live_reload: bool) -> DevSettings {
        DevSettings {
            hmr,
            live_reload,
            ..DevSettings::default()
        }
    }

    fn store_with_styles(paths: &[&str]) -> OutputRecordStore {
        let mut store = OutputRecordStore::new();
        for path in paths {
            store.reconcile(
                &OutputFile::bundled(*path, ".x{}", OutputKind::Browser),
                UpdatePolicy::Rebuild,
                &DevSettings::default(),
            );
        }
        store
    }

    fn changed(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|path| path.to_string()).collect()
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = OutputRecordStore::new();
        assert_eq!(decide(&[], &store, &settings(true, true), 0), Decision::Nothing);
    }

    #[test]
    fn test_script_change_reloads() {
        let store = OutputRecordStore::new();
        let decision = decide(&changed(&["/main.js"]), &store, &settings(true, true), 0);
        assert_eq!(decision, Decision::FullReload);
        assert_eq!(decision.message(), Some(ClientMessage::full_reload()));
    }

    #[test]
    fn test_global_stylesheet_gets_one_bare_entry() {
        let store = OutputRecordStore::new();
        let decision = decide(&changed(&["/global.css"]), &store, &settings(true, true), 5);
        assert_eq!(
            decision,
            Decision::CssUpdate(vec![UpdateEntry::css("/global.css".into(), 5)])
        );
    }

    #[test]
    fn test_component_stylesheet_is_discriminated_by_component() {
        let mut store = store_with_styles(&[STYLE_A]);
        store.serve_component_style(STYLE_A, Some("app-c1"), StyleEncapsulation::Emulated);

        let Decision::CssUpdate(entries) =
            decide(&changed(&[STYLE_A]), &store, &settings(true, true), 1)
        else {
            panic!("expected a css update");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, format!("{}?component=app-c1", STYLE_A));
    }

    #[test]
    fn test_unused_component_stylesheet_gets_bare_entry() {
        let store = store_with_styles(&[STYLE_A]);
        let Decision::CssUpdate(entries) =
            decide(&changed(&[STYLE_A]), &store, &settings(true, true), 1)
        else {
            panic!("expected a css update");
        };
        assert_eq!(entries, vec![UpdateEntry::css(STYLE_A.into(), 1)]);
    }

    #[test]
    fn test_incompatible_stylesheet_reloads_whole_batch() {
        let mut store = store_with_styles(&[STYLE_A, STYLE_B]);
        store.serve_component_style(STYLE_A, Some("app-c1"), StyleEncapsulation::Emulated);
        store.serve_component_style(STYLE_B, Some("app-c2"), StyleEncapsulation::ShadowDom);

        let decision = decide(&changed(&[STYLE_A, STYLE_B]), &store, &settings(true, true), 0);
        assert_eq!(decision, Decision::FullReload);
    }

    #[test]
    fn test_hmr_disabled_forces_reload() {
        let store = OutputRecordStore::new();
        let decision = decide(&changed(&["/global.css"]), &store, &settings(false, true), 0);
        assert_eq!(decision, Decision::FullReload);
    }

    #[test]
    fn test_everything_disabled_sends_nothing() {
        let store = OutputRecordStore::new();
        for paths in [&["/global.css"][..], &["/main.js"][..]] {
            let decision = decide(&changed(paths), &store, &settings(false, false), 0);
            assert_eq!(decision, Decision::Nothing);
            assert!(decision.message().is_none());
        }
    }

    #[test]
    fn test_component_id_is_query_encoded() {
        assert_eq!(
            component_path("/a.css", "ng c&1"),
            "/a.css?component=ng%20c%261"
        );
    }

    #[test]
    fn test_stylesheet_extensions() {
        assert!(is_stylesheet("/a.css"));
        assert!(is_stylesheet("/theme.scss"));
        assert!(!is_stylesheet("/a.css.map"));
        assert!(!is_stylesheet("/main.js"));
    }
}
