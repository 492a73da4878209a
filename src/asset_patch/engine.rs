use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::codec::{Texture, TextureCodec};
use super::resolver::ContainerResolver;
use crate::audit::{BackupRecord, BackupStore, ChangeLogStore, ChangeOperation, EntityKind};
use crate::card_store::ArtworkKey;
use crate::error::{Result, SwapperError};

#[derive(Clone, Debug, Serialize)]
pub struct SwapOutcome {
    pub artwork_key: ArtworkKey,
    pub container: PathBuf,
    pub texture: Texture,
    pub backup: BackupRecord,
    pub bytes_written: usize,
}

/// Replaces the artwork texture of one container at a time.
///
/// A swap resolves the container, backs it up, extracts its first texture,
/// asks the codec for patched bytes and atomically replaces the container.
/// The first failing step ends the request with the container untouched.
pub struct AssetPatchEngine {
    resolver: Arc<dyn ContainerResolver>,
    codec: Option<Arc<dyn TextureCodec>>,
    backups: Arc<BackupStore>,
    changelog: ChangeLogStore,
}

impl AssetPatchEngine {
    pub fn new(
        resolver: Arc<dyn ContainerResolver>,
        codec: Option<Arc<dyn TextureCodec>>,
        backups: Arc<BackupStore>,
        changelog: ChangeLogStore,
    ) -> Self {
        Self {
            resolver,
            codec,
            backups,
            changelog,
        }
    }

    fn codec(&self) -> Result<&Arc<dyn TextureCodec>> {
        self.codec.as_ref().ok_or_else(|| {
            SwapperError::InvalidArgument("no texture tool is configured".to_string())
        })
    }

    async fn first_texture(
        &self,
        codec: &Arc<dyn TextureCodec>,
        container: &Path,
    ) -> Result<Texture> {
        codec
            .extract_textures(container)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SwapperError::NoTexture(format!("{:?}", container)))
    }

    pub async fn swap(&self, artwork_key: ArtworkKey, image: &[u8]) -> Result<SwapOutcome> {
        let codec = self.codec()?;
        if image.is_empty() {
            return Err(SwapperError::InvalidArgument("image is empty".to_string()));
        }

        // Removed on drop, whichever step fails.
        let mut upload = NamedTempFile::new()?;
        upload.write_all(image)?;
        upload.flush()?;

        let container = self.resolver.resolve(artwork_key)?;
        let backup = self.backups.ensure_backup(&container)?;
        let texture = self.first_texture(codec, &container).await?;
        let patched = codec
            .replace_texture(&container, &texture, upload.path())
            .await?;
        persist_atomically(&container, &patched)?;
        info!(
            "Replaced texture {} of {:?} ({} bytes)",
            texture.path_id,
            container,
            patched.len()
        );

        self.changelog
            .record(artwork_key, EntityKind::Artwork, ChangeOperation::SwapArtwork, None)
            .map_err(|e| {
                warn!("Swap of artwork {} was not recorded: {}", artwork_key, e);
                SwapperError::Audit(e.to_string())
            })?;

        Ok(SwapOutcome {
            artwork_key,
            container,
            texture,
            backup,
            bytes_written: patched.len(),
        })
    }

    /// The current artwork of `artwork_key` as an image.
    pub async fn render_artwork(&self, artwork_key: ArtworkKey) -> Result<Vec<u8>> {
        let codec = self.codec()?;
        let container = self.resolver.resolve(artwork_key)?;
        let texture = self.first_texture(codec, &container).await?;
        Ok(codec.export_texture(&container, &texture).await?)
    }
}

/// Write `bytes` next to `path` and rename over it.
fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| SwapperError::InvalidArgument(format!("{:?} has no parent", path)))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
