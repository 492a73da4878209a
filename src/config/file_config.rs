use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub data_dir: Option<String>,
    pub backup_dir: Option<String>,
    pub mutation_chunk_size: Option<usize>,
    pub lookup_chunk_size: Option<usize>,

    pub texture_tool: Option<TextureToolConfig>,
}

/// External converter used to read and write artwork containers.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TextureToolConfig {
    pub program: Option<String>,
    /// Arguments placed before the subcommand, e.g. a script path.
    pub args: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
