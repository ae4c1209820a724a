use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "keysprint";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    /// `$HOME/.local/state/keysprint`, falling back to the platform data dir.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join(APP_NAME))
        } else {
            Self::project().map(|dirs| dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> PathBuf {
        Self::state_dir()
            .map(|dir| dir.join("stats.db"))
            .unwrap_or_else(|| PathBuf::from("keysprint_stats.db"))
    }

    pub fn log_dir() -> PathBuf {
        Self::state_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_path() -> PathBuf {
        Self::project()
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("keysprint_config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_have_expected_file_names() {
        assert!(AppDirs::db_path().ends_with("stats.db"));
        assert!(AppDirs::config_path().ends_with("config.json"));
    }
}
