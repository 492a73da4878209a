use std::path::{Path, PathBuf};

use crate::card_store::ArtworkKey;
use crate::error::{Result, SwapperError};

/// Maps an artwork key to the container file holding its texture.
pub trait ContainerResolver: Send + Sync {
    fn resolve(&self, artwork_key: ArtworkKey) -> Result<PathBuf>;
}

/// File name prefix of the container for `artwork_key`, e.g. `000123_CardArt_`.
pub fn container_prefix(artwork_key: ArtworkKey) -> String {
    format!("{:06}_CardArt_", artwork_key)
}

/// The game's asset directory, where every artwork container is named after
/// its zero-padded artwork key.
#[derive(Clone, Debug)]
pub struct AssetBundleDirectory {
    dir: PathBuf,
}

impl AssetBundleDirectory {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ContainerResolver for AssetBundleDirectory {
    fn resolve(&self, artwork_key: ArtworkKey) -> Result<PathBuf> {
        if artwork_key < 0 {
            return Err(SwapperError::InvalidArgument(format!(
                "artwork key must not be negative, got {}",
                artwork_key
            )));
        }
        if !self.dir.is_dir() {
            return Err(SwapperError::NotFound(format!(
                "asset directory {:?} does not exist",
                self.dir
            )));
        }

        let prefix = container_prefix(artwork_key);
        let mut matches: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        matches.sort();
        matches.into_iter().next().ok_or_else(|| {
            SwapperError::NotFound(format!("no artwork container for artwork {}", artwork_key))
        })
    }
}
