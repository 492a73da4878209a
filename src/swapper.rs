//! Wires configuration, stores and engines into one handle for front ends.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::asset_patch::{
    AssetBundleDirectory, AssetPatchEngine, ExternalToolCodec, SwapOutcome, TextureCodec,
};
use crate::audit::{BackupRecord, BackupStore, ChangeLogEntry, ChangeLogStore};
use crate::card_store::{
    ArtworkKey, CardKey, CardQuery, CardRecord, CardSummary, StoreManager, StoreStatus,
};
use crate::config::{AppConfig, UserConfig, UserConfigStore};
use crate::error::{self, SwapperError};
use crate::style_engine::{MutationReport, StyleEvent, StyleMutationEngine, StyleRequest};
use crate::tagset::StyleId;

pub struct Swapper {
    config: AppConfig,
    user_config: UserConfigStore,
    manager: StoreManager,
    changelog: ChangeLogStore,
    backups: Arc<BackupStore>,
    codec: Option<Arc<dyn TextureCodec>>,
}

impl Swapper {
    /// Open the data directory, loading (or creating) the user document and
    /// the change log.
    pub fn open(config: AppConfig) -> Result<Self> {
        let user_config = UserConfigStore::new(config.user_config_path());
        Self::open_with(config, user_config)
    }

    /// Like [`Self::open`] with an explicitly built user document store.
    pub fn open_with(config: AppConfig, user_config: UserConfigStore) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;
        let user_document = user_config.load()?;
        let changelog = ChangeLogStore::open(config.changelog_path())?;
        let backups = Arc::new(BackupStore::new(config.backup_dir.clone()));
        let codec = config.texture_tool.as_ref().map(|tool| {
            Arc::new(ExternalToolCodec::new(tool.program.clone()).with_args(tool.args.clone()))
                as Arc<dyn TextureCodec>
        });
        info!(
            "Data dir {:?}, card database {:?}",
            config.data_dir,
            user_document.database_location()
        );

        Ok(Self {
            manager: StoreManager::new(user_document.database_location()),
            config,
            user_config,
            changelog,
            backups,
            codec,
        })
    }

    /// Replace the texture codec, e.g. with an in-process implementation.
    pub fn with_codec(mut self, codec: Option<Arc<dyn TextureCodec>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn user_config(&self) -> UserConfig {
        self.user_config.get()
    }

    /// Persist new locations; a changed database path reconnects lazily.
    pub fn update_user_config(
        &self,
        database_path: Option<&str>,
        save_path: Option<&str>,
    ) -> Result<UserConfig> {
        let updated = self.user_config.update(database_path, save_path)?;
        self.manager.set_location(updated.database_location())?;
        Ok(updated)
    }

    pub fn status(&self) -> error::Result<StoreStatus> {
        self.manager.status()
    }

    pub fn list_cards(&self, query: &CardQuery) -> error::Result<Vec<CardSummary>> {
        self.manager.store()?.list_cards(query)
    }

    pub fn get_card(&self, key: CardKey) -> error::Result<CardRecord> {
        self.manager
            .store()?
            .get_card(key)?
            .ok_or_else(|| SwapperError::NotFound(format!("card {}", key)))
    }

    /// Of `keys`, those whose tag set already contains `style`.
    pub fn keys_with_style(
        &self,
        keys: &[CardKey],
        style: StyleId,
    ) -> error::Result<Vec<CardKey>> {
        self.manager
            .store()?
            .keys_with_style(keys, style, self.config.chunk_limits.lookup)
    }

        pub fn style_engine(&self) -> error::Result<StyleMutationEngine> {
        Ok(StyleMutationEngine::new(
            self.manager.store()?,
            self.changelog.clone(),
            self.backups.clone(),
            self.config.chunk_limits,
        ))
    }

    pub fn run_style(
        &self,
        request: &StyleRequest,
        cancel: Option<&CancellationToken>,
    ) -> error::Result<MutationReport> {
        self.style_engine()?.run(request, None, cancel)
    }

    /// Run a style batch, streaming progress and exactly one terminal event.
    pub fn run_style_streaming(
        &self,
        request: &StyleRequest,
        events: &UnboundedSender<StyleEvent>,
        cancel: Option<&CancellationToken>,
    ) -> error::Result<MutationReport> {
        match self.style_engine() {
            Ok(engine) => engine.run_streaming(request, events, cancel),
            Err(e) => {
                let _ = events.send(StyleEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn asset_engine(&self) -> error::Result<AssetPatchEngine> {
        Ok(AssetPatchEngine::new(
            Arc::new(AssetBundleDirectory::new(self.manager.asset_dir()?)),
            self.codec.clone(),
            self.backups.clone(),
            self.changelog.clone(),
        ))
    }

    pub async fn swap_artwork(
        &self,
        artwork_key: ArtworkKey,
        image: &[u8],
    ) -> error::Result<SwapOutcome> {
        self.asset_engine()?.swap(artwork_key, image).await
    }

    pub async fn render_artwork(&self, artwork_key: ArtworkKey) -> error::Result<Vec<u8>> {
        self.asset_engine()?.render_artwork(artwork_key).await
    }

    /// Where an exported artwork goes when no explicit path is given.
    pub fn default_export_path(&self, artwork_key: ArtworkKey) -> PathBuf {
        let file_name = format!("{}.png", artwork_key);
        let save_path = self.user_config.get().save_path;
        if save_path.is_empty() {
            PathBuf::from(file_name)
        } else {
            PathBuf::from(save_path).join(file_name)
        }
    }

    /// Change log entries for one key, or the most recent ones.
    pub fn history(&self, entity_key: Option<i64>, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        match entity_key {
            Some(key) => self.changelog.entries_for(key),
            None => self.changelog.recent(limit),
        }
    }

    pub fn backups(&self) -> error::Result<Vec<BackupRecord>> {
        self.backups.records()
    }

    pub fn close(&self) -> error::Result<()> {
        self.manager.close()
    }
}
