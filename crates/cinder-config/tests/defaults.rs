//! Tests for default values.

use cinder_config::{CinderConfig, DevSettings, ServeConfig};

#[test]
fn dev_settings_defaults() {
    let dev = DevSettings::default();
    assert!(dev.hmr);
    assert!(dev.live_reload);
    assert!(dev.file_loader_extensions.is_empty());
}

#[test]
fn serve_config_defaults() {
    let serve = ServeConfig::default();
    assert_eq!(serve.host, "127.0.0.1");
    assert_eq!(serve.port, 4200);
    assert!(!serve.https);
    assert_eq!(serve.base_path, "/");
    assert!(serve.allowed_roots.is_empty());
}

#[test]
fn empty_json_uses_defaults() {
    let config: CinderConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, CinderConfig::default());
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config: CinderConfig = serde_json::from_str(r#"{ "dev": { "hmr": false } }"#).unwrap();
    assert!(!config.dev.hmr);
    assert!(config.dev.live_reload);
    assert_eq!(config.serve.port, 4200);
}
