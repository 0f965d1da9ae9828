//! Top-level configuration and multi-source loading.

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dev::DevSettings;
use crate::error::{ConfigError, Result};
use crate::serve::ServeConfig;

/// Default TOML config file name, looked up in the project root.
pub const TOML_CONFIG_FILE: &str = "cinder.toml";

/// Default JSON config file name, looked up in the project root.
pub const JSON_CONFIG_FILE: &str = "cinder.json";

/// Environment variable prefix. Nested keys are separated by `__`,
/// e.g. `CINDER_SERVE__PORT=8080`.
pub const ENV_PREFIX: &str = "CINDER_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CinderConfig {
    #[serde(default)]
    pub dev: DevSettings,

    #[serde(default)]
    pub serve: ServeConfig,
}

/// Values given explicitly on the command line. Unset fields leave the
/// lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,

    #[serde(skip_serializing_if = "ServeOverrides::is_empty")]
    pub serve: ServeOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_reload: Option<bool>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.hmr.is_none() && self.live_reload.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ServeOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none()
    }
}

impl CinderConfig {
    /// Load configuration from every source.
    ///
    /// Priority: overrides > environment > `cinder.json` > `cinder.toml` > defaults.
    /// An explicit `config_path` replaces the file lookup in `root` and must exist.
    pub fn load(
        root: &Path,
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                figment = match path.extension().and_then(|ext| ext.to_str()) {
                    Some("json") => figment.merge(Json::file(path)),
                    _ => figment.merge(Toml::file(path)),
                };
            }
            None => {
                let toml_path = root.join(TOML_CONFIG_FILE);
                if toml_path.exists() {
                    tracing::debug!("loading {}", toml_path.display());
                    figment = figment.merge(Toml::file(toml_path));
                }
                let json_path = root.join(JSON_CONFIG_FILE);
                if json_path.exists() {
                    tracing::debug!("loading {}", json_path.display());
                    figment = figment.merge(Json::file(json_path));
                }
            }
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides));

        let config: Self = figment.extract().map_err(|e| {
            ConfigError::invalid(
                "configuration",
                e.to_string(),
                "Check cinder.toml / cinder.json syntax and field types",
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<()> {
        if self.serve.host.trim().is_empty() {
            return Err(ConfigError::invalid(
                "serve.host",
                &self.serve.host,
                "Use an address such as 127.0.0.1 or localhost",
            ));
        }

        let base = &self.serve.base_path;
        if !base.starts_with('/') || !base.ends_with('/') {
            return Err(ConfigError::invalid(
                "serve.base_path",
                base,
                "The base path must start and end with '/', e.g. /app/",
            ));
        }

        if let Some(ext) = self
            .dev
            .file_loader_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(ConfigError::invalid(
                "dev.file_loader_extensions",
                ext,
                "List extensions without the leading dot, e.g. \"png\"",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_relative_base_path() {
        let mut config = CinderConfig::default();
        config.serve.base_path = "app/".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("serve.base_path"));
    }

    #[test]
    fn test_validate_rejects_dotted_extension() {
        let mut config = CinderConfig::default();
        config.dev.file_loader_extensions = vec![".png".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_skip_unset_fields() {
        let overrides = ConfigOverrides {
            serve: ServeOverrides {
                port: Some(9000),
                ..ServeOverrides::default()
            },
            ..ConfigOverrides::default()
        };
        let json = serde_json::to_value(&overrides).unwrap();
        assert_eq!(json, serde_json::json!({ "serve": { "port": 9000 } }));
    }
}
