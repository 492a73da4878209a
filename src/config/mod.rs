mod file_config;
mod user_config;

pub use file_config::{FileConfig, TextureToolConfig};
pub use user_config::{sanitize_database_path, UserConfig, UserConfigStore, USER_CONFIG_FILE_NAME};

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::audit::CHANGELOG_FILE_NAME;
use crate::batch::{ChunkLimits, DEFAULT_LOOKUP_CHUNK_SIZE, DEFAULT_MUTATION_CHUNK_SIZE};

pub const DEFAULT_DATA_DIR_NAME: &str = ".mtga_swapper";
pub const DEFAULT_BACKUP_DIR_NAME: &str = "MTGA_Swapper_Backups";

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub mutation_chunk_size: usize,
    pub lookup_chunk_size: usize,
    pub texture_tool: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            backup_dir: None,
            mutation_chunk_size: DEFAULT_MUTATION_CHUNK_SIZE,
            lookup_chunk_size: DEFAULT_LOOKUP_CHUNK_SIZE,
            texture_tool: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Holds the user document and the change log.
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub chunk_limits: ChunkLimits,
    pub texture_tool: Option<TextureToolSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureToolSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let home = dirs::home_dir();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .or_else(|| home.as_ref().map(|h| h.join(DEFAULT_DATA_DIR_NAME)))
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;
        if data_dir.exists() && !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let backup_dir = file
            .backup_dir
            .map(PathBuf::from)
            .or_else(|| cli.backup_dir.clone())
            .or_else(|| home.as_ref().map(|h| h.join(DEFAULT_BACKUP_DIR_NAME)))
            .unwrap_or_else(|| data_dir.join("backups"));

        let chunk_limits = ChunkLimits::new(
            file.mutation_chunk_size.unwrap_or(cli.mutation_chunk_size),
            file.lookup_chunk_size.unwrap_or(cli.lookup_chunk_size),
        )?;

        let tool_file = file.texture_tool.unwrap_or_default();
        let texture_tool = tool_file
            .program
            .map(PathBuf::from)
            .or_else(|| cli.texture_tool.clone())
            .map(|program| TextureToolSettings {
                program,
                args: tool_file.args,
            });

        Ok(Self {
            data_dir,
            backup_dir,
            chunk_limits,
            texture_tool,
        })
    }

    pub fn user_config_path(&self) -> PathBuf {
        self.data_dir.join(USER_CONFIG_FILE_NAME)
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.data_dir.join(CHANGELOG_FILE_NAME)
    }
}
