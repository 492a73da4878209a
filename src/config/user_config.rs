//! The small JSON document holding the user's database and save locations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{PathBuf, MAIN_SEPARATOR};
use tracing::{info, warn};

use crate::card_store::{default_search_roots, discover_database};

pub const USER_CONFIG_FILE_NAME: &str = "config.json";

/// Literal some older builds wrote in front of the stored path.
const LEGACY_PATH_PREFIX: &str = "True";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "DatabasePath", default)]
    pub database_path: String,
    #[serde(rename = "SavePath", default)]
    pub save_path: String,
}

impl UserConfig {
    pub fn database_location(&self) -> Option<PathBuf> {
        if self.database_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.database_path))
        }
    }
}

/// Clean up a database path typed, pasted or inherited from an old file.
pub fn sanitize_database_path(raw: &str) -> String {
    let path = raw.trim().trim_matches('"').trim_matches('\'');
    let path = path.strip_prefix(LEGACY_PATH_PREFIX).unwrap_or(path);
    path.replace('>', &MAIN_SEPARATOR.to_string())
        .trim()
        .to_string()
}

pub struct UserConfigStore {
    path: PathBuf,
    discovery_roots: Vec<PathBuf>,
}

impl UserConfigStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            discovery_roots: default_search_roots(),
        }
    }

    pub fn with_discovery_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.discovery_roots = roots;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Current document; a missing or corrupt file reads as empty.
    pub fn get(&self) -> UserConfig {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable config {:?}: {}", self.path, e);
                UserConfig::default()
            }),
            Err(_) => UserConfig::default(),
        };
        config.database_path = sanitize_database_path(&config.database_path);
        config
    }

    /// Like [`Self::get`], but creates the file when absent and fills in an
    /// empty database path from auto-discovery.
    pub fn load(&self) -> Result<UserConfig> {
        let mut config = self.get();
        let mut dirty = !self.path.exists();

        if config.database_path.is_empty() {
            if let Some(found) = discover_database(&self.discovery_roots) {
                info!("Discovered card database at {:?}", found);
                config.database_path = found.to_string_lossy().into_owned();
                dirty = true;
            }
        }
        if dirty {
            self.write(&config)?;
        }
        Ok(config)
    }

    /// Apply the given fields, sanitizing the database path, and persist.
    pub fn update(
        &self,
        database_path: Option<&str>,
        save_path: Option<&str>,
    ) -> Result<UserConfig> {
        let mut config = self.get();
        if let Some(database_path) = database_path {
            config.database_path = sanitize_database_path(database_path);
        }
        if let Some(save_path) = save_path {
            config.save_path = save_path.trim().to_string();
        }
        self.write(&config)?;
        info!("Saved configuration to {:?}", self.path);
        Ok(config)
    }

    fn write(&self, config: &UserConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config file: {:?}", self.path))
    }
}
