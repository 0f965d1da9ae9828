//! Externalized dependency lists.
//!
//! The lists are consumed by the dependency-optimization cache, whose keys
//! depend on list order, so every update leaves them sorted and deduplicated.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::dev::result::ExternalMetadataUpdate;

/// Node.js core modules. These are always external on the server.
pub const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

static ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z][a-zA-Z\d+\-.]*:)?//|^(?:data|blob|https?):")
        .expect("absolute URL pattern is valid")
});

/// Module specifiers excluded from bundling and fetched live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDependencyMetadata {
    pub implicit_browser: Vec<String>,
    pub implicit_server: Vec<String>,
    pub explicit_browser: Vec<String>,
    pub explicit_server: Vec<String>,
}

impl ExternalDependencyMetadata {
    /// Replace all four lists from a reported update.
    ///
    /// Absolute URLs are dropped from both implicit lists and Node built-ins
    /// from the implicit server list; the built-ins are instead always part
    /// of the explicit server list.
    pub fn apply(&mut self, update: &ExternalMetadataUpdate) {
        self.implicit_browser = sorted(
            update
                .implicit_browser
                .iter()
                .filter(|specifier| !is_absolute_url(specifier)),
        );
        self.implicit_server = sorted(
            update
                .implicit_server
                .iter()
                .filter(|specifier| !is_absolute_url(specifier) && !is_builtin(specifier)),
        );
        self.explicit_browser = sorted(update.explicit.iter());
        self.explicit_server = sorted(
            update
                .explicit
                .iter()
                .map(String::as_str)
                .chain(NODE_BUILTINS.iter().copied()),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.implicit_browser.is_empty()
            && self.implicit_server.is_empty()
            && self.explicit_browser.is_empty()
            && self.explicit_server.is_empty()
    }
}

fn sorted<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether `specifier` names a Node.js core module, with or without `node:`.
pub fn is_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let root = specifier.split('/').next().unwrap_or(specifier);
    NODE_BUILTINS.contains(&root)
}

pub fn is_absolute_url(specifier: &str) -> bool {
    ABSOLUTE_URL.is_match(specifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_detection() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("node:fs"));
        assert!(is_builtin("fs/promises"));
        assert!(!is_builtin("lodash"));
        assert!(!is_builtin("@angular/core"));
    }

    #[test]
    fn test_absolute_url_detection() {
        assert!(is_absolute_url("https://cdn.example.com/lib.js"));
        assert!(is_absolute_url("//cdn.example.com/lib.js"));
        assert!(is_absolute_url("data:text/javascript,export{}"));
        assert!(!is_absolute_url("rxjs/operators"));
        assert!(!is_absolute_url("./local.js"));
    }

    #[test]
    fn test_apply_filters_and_sorts() {
        let mut metadata = ExternalDependencyMetadata::default();
        metadata.apply(&ExternalMetadataUpdate {
            implicit_browser: vec![
                "zone.js".into(),
                "https://cdn.example.com/x.js".into(),
                "rxjs".into(),
                "rxjs".into(),
            ],
            implicit_server: vec!["express".into(), "node:path".into(), "fs".into()],
            explicit: vec!["lodash".into(), "@scope/pkg".into()],
        });

        assert_eq!(metadata.implicit_browser, vec!["rxjs", "zone.js"]);
        assert_eq!(metadata.implicit_server, vec!["express"]);
        assert_eq!(metadata.explicit_browser, vec!["@scope/pkg", "lodash"]);
        assert!(metadata.explicit_server.contains(&"lodash".to_string()));
        assert!(metadata.explicit_server.contains(&"fs".to_string()));

        let mut check = metadata.explicit_server.clone();
        check.sort();
        assert_eq!(check, metadata.explicit_server);
    }

    #[test]
    fn test_apply_replaces_instead_of_merging() {
        let mut metadata = ExternalDependencyMetadata::default();
        metadata.apply(&ExternalMetadataUpdate {
            implicit_browser: vec!["a".into()],
            ..ExternalMetadataUpdate::default()
        });
        metadata.apply(&ExternalMetadataUpdate {
            implicit_browser: vec!["b".into()],
            ..ExternalMetadataUpdate::default()
        });
        assert_eq!(metadata.implicit_browser, vec!["b"]);
    }
}
