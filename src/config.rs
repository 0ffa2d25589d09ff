use crate::persistence::atomic_write;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning knobs stored in `config.json` inside the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Quiet window before a debounced write fires
    pub debounce_ms: u64,
    /// Rotating backups kept after each write
    pub max_backups: usize,
    /// Attempts before a write is reported as failed
    pub max_write_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_backups: 10,
            max_write_attempts: 3,
        }
    }
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Load config from `config.json`; a missing file means defaults
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

/// Save config to `config.json`
pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(config)?;
    atomic_write(path, json.as_bytes())
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = tempdir().unwrap();
        let config = load_config(temp_dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxBackups": 4}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.max_backups, 4);
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.max_write_attempts, 3);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");

        let config = Config {
            debounce_ms: 50,
            max_backups: 2,
            max_write_attempts: 5,
        };
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"debounceMs\": 50"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}
