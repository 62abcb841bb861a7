use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::DatabaseConfig;

/// Capacity and validation limits enforced by the services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of users in one team
    pub max_team_members: usize,
    /// Maximum number of work items owned by one user
    pub max_work_items_per_user: usize,
    /// Minimum username length, in characters
    pub min_username_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_team_members: 10,
            max_work_items_per_user: 5,
            min_username_len: 10,
        }
    }
}

/// Casework configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseworkConfig {
    pub database: DatabaseConfig,
    /// Auditor recorded on changes when none is given explicitly
    pub default_auditor: Option<String>,
    pub limits: Limits,
}

impl CaseworkConfig {
    /// Loads the configuration from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Loads the configuration, falling back to defaults when the file is missing
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            log::debug!(
                "No config file at {:?}, using defaults",
                path.as_ref()
            );
            Ok(Self::default())
        }
    }

    /// Save the configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        // Ensure parent directories exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Creates a default config file if it doesn't exist
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        if path.as_ref().exists() {
            return Ok(());
        }

        Self::default().save(path)
    }
}

/// Gets the Casework configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("casework"))
}

/// Database file used when the config names none: `casework.db` in the
/// config directory, or in the working directory if that cannot be resolved
pub fn default_database_path() -> PathBuf {
    get_config_dir()
        .map(|dir| dir.join("casework.db"))
        .unwrap_or_else(|_| PathBuf::from("casework.db"))
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    // Check if CASEWORK_CONFIG environment variable is set
    if let Ok(path) = std::env::var("CASEWORK_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    Ok(get_config_dir()?.join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BackendType;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "database:\n  backend: memory\nlimits:\n  max_team_members: 3\n",
        )
        .unwrap();

        let config = CaseworkConfig::load(&path).unwrap();
        assert_eq!(config.database.backend_type, BackendType::Memory);
        assert_eq!(config.database.path, default_database_path());
        assert_eq!(config.limits.max_team_members, 3);
        assert_eq!(config.limits.max_work_items_per_user, 5);
        assert_eq!(config.limits.min_username_len, 10);
        assert!(config.default_auditor.is_none());
    }

    #[test]
    fn test_database_path_does_not_depend_on_config_file() {
        let dir = TempDir::new().unwrap();
        let written = dir.path().join("config.yaml");
        CaseworkConfig::create_default(&written).unwrap();

        let from_file = CaseworkConfig::load(&written).unwrap().database.path;
        let without_file = CaseworkConfig::load_or_default(dir.path().join("absent.yaml"))
            .unwrap()
            .database
            .path;
        assert_eq!(from_file, without_file);
        assert_eq!(without_file, DatabaseConfig::default().path);
        if dirs::config_dir().is_some() {
            assert!(without_file.ends_with("casework/casework.db"));
        }
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        let config = CaseworkConfig::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, CaseworkConfig::default());
    }

    #[test]
    fn test_create_default_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        CaseworkConfig::create_default(&path).unwrap();
        let mut config = CaseworkConfig::load(&path).unwrap();
        assert_eq!(config.limits, Limits::default());
        assert_eq!(config.database.path, default_database_path());

        // An existing file is left alone
        config.default_auditor = Some("alice".to_string());
        config.save(&path).unwrap();
        CaseworkConfig::create_default(&path).unwrap();
        assert_eq!(
            CaseworkConfig::load(&path).unwrap().default_auditor.as_deref(),
            Some("alice")
        );
    }
}
