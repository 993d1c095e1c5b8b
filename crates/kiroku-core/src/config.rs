use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::KirokuError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Preferred metadata language for newly added shows.
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub tvdb: TvdbConfig,
    pub trakt: TraktConfig,
    pub hexagon: HexagonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvdbConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktConfig {
    pub enabled: bool,
    pub client_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HexagonConfig {
    pub enabled: bool,
    pub base_url: String,
    pub auth_token: String,
}

impl AppConfig {
    /// Load config: user file (if it exists) over built-in defaults.
    pub fn load() -> Result<Self, KirokuError> {
        let defaults: AppConfig =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| KirokuError::Config(e.to_string()))?;

        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)
                .map_err(|e| KirokuError::Config(e.to_string()))?;
            let user: AppConfig =
                toml::from_str(&user_str).map_err(|e| KirokuError::Config(e.to_string()))?;
            Ok(user)
        } else {
            Ok(defaults)
        }
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), KirokuError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KirokuError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Whether the account is connected to the tracking service.
    pub fn trakt_connected(&self) -> bool {
        self.services.trakt.enabled && !self.services.trakt.access_token.is_empty()
    }

    /// Whether the account is connected to the cloud mirror.
    pub fn hexagon_connected(&self) -> bool {
        self.services.hexagon.enabled && !self.services.hexagon.auth_token.is_empty()
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("kiroku.db"))
            .unwrap_or_else(|| PathBuf::from("kiroku.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, KirokuError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "kiroku", "kiroku")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.general.language, "en");
        assert!(!config.trakt_connected());
        assert!(!config.hexagon_connected());
    }

    #[test]
    fn connected_requires_enabled_and_token() {
        let mut config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.services.trakt.enabled = true;
        assert!(!config.trakt_connected(), "no token yet");
        config.services.trakt.access_token = "tok".into();
        assert!(config.trakt_connected());
    }
}
