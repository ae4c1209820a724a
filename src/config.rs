use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;

pub const DEFAULT_THEME: &str = "novel";
pub const DEFAULT_COUNTDOWN_SECS: u32 = 3;
pub const DEFAULT_REPORT_RETRIES: u32 = 2;
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const DEFAULT_PASSAGE_COUNT: usize = 5;

/// Settings that persist between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    pub countdown_secs: u32,
    pub player_name: Option<String>,
    pub passages_file: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub report_retries: u32,
    pub leaderboard_size: usize,
    pub passage_count: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            player_name: None,
            passages_file: None,
            db_path: None,
            report_retries: DEFAULT_REPORT_RETRIES,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            passage_count: DEFAULT_PASSAGE_COUNT,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(AppDirs::db_path)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
            warn!(target: "config", path = %self.path.display(), error = %e, "ignoring unreadable config");
            Config::default()
        })
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nested").join("config.json"));
        let cfg = Config {
            theme: "technical".into(),
            countdown_secs: 5,
            player_name: Some("ada".into()),
            passages_file: Some(PathBuf::from("/tmp/passages.json")),
            db_path: Some(PathBuf::from("/tmp/stats.db")),
            report_retries: 0,
            leaderboard_size: 25,
            passage_count: 2,
            log_level: "debug".into(),
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"theme":"essay"}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.theme, "essay");
        assert_eq!(cfg.countdown_secs, DEFAULT_COUNTDOWN_SECS);
    }
}
