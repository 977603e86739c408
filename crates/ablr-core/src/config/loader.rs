//! Configuration file discovery and loading

use super::RefactorConfig;
use crate::error::RefactorError;
use crate::result::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file names in priority order
const CONFIG_FILES: &[&str] = &[
    ".ablrc.json",
    ".ablrc.toml",
    "ablr.yaml",
    "ablr.yml",
    "ablr.json",
];

/// Configuration loader for discovering and loading config files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Auto-discover a config file by walking up from `start_path`
    ///
    /// Stops at the first directory holding one of [`CONFIG_FILES`], or at
    /// the filesystem root.
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| RefactorError::config_error(format!("Invalid path: {e}")))?;

        loop {
            for filename in CONFIG_FILES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load and validate configuration from a specific file
    ///
    /// `.json` files are read as JSONC, so comments and trailing commas
    /// are allowed.
    pub fn load_from_file(path: &Path) -> Result<RefactorConfig> {
        let content = fs::read_to_string(path).map_err(|e| RefactorError::io_error(path, e))?;
        let fail = |e: &dyn std::fmt::Display| {
            RefactorError::config_error(format!(
                "Failed to load config from '{}': {e}",
                path.display()
            ))
        };

        let config: RefactorConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => json5::from_str(&content).map_err(|e| fail(&e))?,
            Some("toml") => toml::from_str(&content).map_err(|e| fail(&e))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| fail(&e))?,
            _ => {
                return Err(RefactorError::config_error(format!(
                    "Unsupported config file '{}' (expected .json, .toml, .yaml or .yml)",
                    path.display()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load config from an explicit path, else the discovered one, else
    /// the defaults
    pub fn load(custom_path: Option<&Path>, start_dir: Option<&Path>) -> Result<RefactorConfig> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(RefactorError::config_error(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        let search_dir = start_dir.unwrap_or_else(|| Path::new("."));
        match Self::auto_discover(search_dir)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(RefactorConfig::default())
            }
        }
    }
}
