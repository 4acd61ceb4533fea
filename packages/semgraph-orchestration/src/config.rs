//! Three-layer configuration loading, `SPEC_FULL.md` §6: defaults, then an
//! optional YAML file, then environment overrides. Scaled down from the
//! Preset/StageControl/YAML-advanced tiering this project's pipeline
//! config uses to the much smaller option set `spec.md` §6 names.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};

fn default_decorator_allow_list() -> Vec<String> {
    vec![
        "property".to_string(),
        "staticmethod".to_string(),
        "classmethod".to_string(),
        "dataclass".to_string(),
        "dataclasses.dataclass".to_string(),
        "abstractmethod".to_string(),
        "app.route".to_string(),
        "router.get".to_string(),
        "router.post".to_string(),
        "click.command".to_string(),
    ]
}

/// The allow-list of decorators the S law (`spec.md` §4.6) treats as
/// signature-transforming. `SPEC_FULL.md` §4.6 resolves Open Question 2 by
/// making this configuration rather than a compiled-in constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_decorator_allow_list")]
    pub signature_transforming_decorators: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            signature_transforming_decorators: default_decorator_allow_list(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub storage_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    pub path: Option<String>,
}

/// Carried for completeness (`spec.md` §6: "not part of the core" /
/// "not used by the core") so a hosting process can retrieve them from the
/// same `Config` object it hands to the core, without the core reading
/// them itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub cors_origins: Vec<String>,
    pub watcher_debounce_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl Config {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| OrchestrationError::config(format!("invalid YAML config: {e}")))
    }

    /// Applies `SEMGRAPH_*` environment overrides in place, per
    /// `SPEC_FULL.md` §6.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEMGRAPH_STORE_URI") {
            self.store.uri = Some(v);
        }
        if let Ok(v) = std::env::var("SEMGRAPH_STORE_USER") {
            self.store.user = Some(v);
        }
        if let Ok(v) = std::env::var("SEMGRAPH_STORE_PASSWORD") {
            self.store.password = Some(v);
        }
        if let Ok(v) = std::env::var("SEMGRAPH_REPO_PATH") {
            self.repo.path = Some(v);
        }
        if let Ok(v) = std::env::var("SEMGRAPH_SNAPSHOT_DIR") {
            self.snapshot.storage_dir = Some(v);
        }
    }

    /// Loads defaults, overlays an optional YAML file, then applies
    /// environment overrides — the full three-layer sequence.
    pub fn load(yaml_path: Option<impl AsRef<Path>>) -> Result<Self> {
        let mut config = match yaml_path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_decorator_allow_list() {
        let config = Config::default();
        assert!(config.validator.signature_transforming_decorators.contains(&"property".to_string()));
    }

    #[test]
    fn test_env_overrides_win_over_defaults() {
        std::env::set_var("SEMGRAPH_STORE_URI", "sqlite:///tmp/test.db");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.store.uri.as_deref(), Some("sqlite:///tmp/test.db"));
        std::env::remove_var("SEMGRAPH_STORE_URI");
    }

    #[test]
    fn test_yaml_missing_fields_keep_defaults() {
        let yaml = "store:\n  uri: \"sqlite:///foo.db\"\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, yaml).unwrap();

        let config = Config::from_yaml_file(&path).unwrap();
        assert_eq!(config.store.uri.as_deref(), Some("sqlite:///foo.db"));
        assert!(!config.validator.signature_transforming_decorators.is_empty());
    }
}
