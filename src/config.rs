use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::prescription::PrescriptionConfig;

const CONFIG_FILE: &str = ".dgalens.json";

/// Top-level configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classifier artifact to load
    pub model_path: PathBuf,
    /// Worker threads for batch analysis
    pub jobs: usize,
    pub prescription: PrescriptionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/dga_leader.json"),
            jobs: 4,
            prescription: PrescriptionConfig::default(),
        }
    }
}

/// Get the path to the default config file
pub fn get_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(CONFIG_FILE)
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, the default file is used if
/// present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (get_config_path(), false),
    };

    if !required && !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_get_config_path() {
        let path = get_config_path();
        assert!(path.to_string_lossy().ends_with(CONFIG_FILE));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"prescription": {{"enabled": false, "top_n": 2}}}}"#).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert!(!config.prescription.enabled);
        assert_eq!(config.prescription.top_n, 2);
        assert_eq!(config.prescription.timeout_secs, 60);
        assert_eq!(config.model_path, PathBuf::from("model/dga_leader.json"));
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
