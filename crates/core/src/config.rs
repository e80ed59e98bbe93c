use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "CLEARMARK_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub models_dir: PathBuf,
    pub runtime_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend override: "webgpu" or "cpu". `None` means probe-and-choose.
    pub backend: Option<String>,
    /// Thread-count override for the CPU path. `None` means capability-derived.
    pub threads: Option<usize>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            runtime_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("config path does not have a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. CLEARMARK_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

/// Returns the path to config.toml within the given data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Initialize the data directory structure on first run:
/// - Creates data_dir if missing
/// - Writes default config.toml only if file doesn't exist
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}

/// Resolve a path relative to a base directory.
/// Returns the path as-is if absolute, otherwise joins it to base.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.paths.models_dir, PathBuf::from("models"));
        assert!(cfg.paths.runtime_dir.is_none());
        assert!(cfg.inference.backend.is_none());
        assert!(cfg.inference.threads.is_none());
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let original = AppConfig {
            paths: PathsConfig {
                models_dir: PathBuf::from("weights"),
                runtime_dir: Some(PathBuf::from("/opt/ort")),
            },
            inference: InferenceConfig {
                backend: Some("webgpu".to_string()),
                threads: Some(8),
            },
        };
        let encoded = toml::to_string_pretty(&original).expect("serialize config");
        let decoded: AppConfig = toml::from_str(&encoded).expect("deserialize config");
        assert_eq!(decoded, original);
    }

    #[test]
    fn load_from_nonexistent_file_returns_defaults() {
        let dir = tempdir().expect("tempdir");
        let loaded = AppConfig::load_from_path(&dir.path().join("missing.toml"))
            .expect("load config from nonexistent path");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let cfg: AppConfig =
            toml::from_str("[inference]\nbackend = \"cpu\"\n").expect("parse partial");
        assert_eq!(cfg.inference.backend.as_deref(), Some("cpu"));
        assert_eq!(cfg.paths.models_dir, PathBuf::from("models"));
    }

    #[test]
    fn data_dir_uses_cli_override() {
        assert_eq!(
            data_dir(Some(Path::new("/custom"))),
            PathBuf::from("/custom")
        );
    }

    #[test]
    fn config_path_is_data_dir_join_config_toml() {
        assert_eq!(
            config_path(Path::new("/data")),
            PathBuf::from("/data/config.toml")
        );
    }

    #[test]
    fn initialize_creates_data_dir_and_config() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("fresh");
        initialize_data_dir(&target).expect("initialize data dir");

        assert!(target.exists());
        assert!(target.join("config.toml").exists());
    }

    #[test]
    fn initialize_preserves_existing_config() {
        let temp = tempdir().expect("tempdir");
        let cfg_path = temp.path().join("config.toml");
        let custom_content = "[inference]\nthreads = 9\n";
        fs::write(&cfg_path, custom_content).expect("write custom config");

        initialize_data_dir(temp.path()).expect("initialize data dir");

        let content = fs::read_to_string(&cfg_path).expect("read config");
        assert_eq!(content, custom_content);
    }

    #[test]
    fn resolve_relative_to_handles_both_kinds() {
        assert_eq!(
            resolve_relative_to(Path::new("/base"), Path::new("/abs/path")),
            PathBuf::from("/abs/path")
        );
        assert_eq!(
            resolve_relative_to(Path::new("/base"), Path::new("sub")),
            PathBuf::from("/base/sub")
        );
    }
}
