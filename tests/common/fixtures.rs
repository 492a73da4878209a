use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use card_style_swapper::asset_patch::{CodecError, Texture, TextureCodec};
use card_style_swapper::audit::BackupStore;
use card_style_swapper::batch::ChunkLimits;
use card_style_swapper::config::{AppConfig, UserConfigStore};
use card_style_swapper::Swapper;
use rusqlite::{params, Connection};
use tempfile::TempDir;

pub const DB_FILE_NAME: &str = "Raw_CardDatabase_test.mtga";

/// Same shape as the game's `Cards` table, limited to the columns we touch.
const CARDS_TABLE: &str = "CREATE TABLE Cards (
    GrpId INTEGER PRIMARY KEY,
    ArtId INTEGER,
    Order_Title TEXT,
    ExpansionCode TEXT,
    ArtSize INTEGER,
    SubTypes TEXT,
    Colors TEXT,
    Rarity INTEGER,
    IsToken INTEGER,
    tags TEXT,
    LinkedFaceGrpIds TEXT,
    IsDigitalOnly INTEGER,
    IsRebalanced INTEGER
)";

/// A game install laid out like the real one:
/// `<root>/Raw/<db>` and `<root>/AssetBundle/`.
pub struct TestInstall {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub asset_dir: PathBuf,
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl TestInstall {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let raw_dir = dir.path().join("game").join("Raw");
        let asset_dir = dir.path().join("game").join("AssetBundle");
        fs::create_dir_all(&raw_dir).unwrap();
        fs::create_dir_all(&asset_dir).unwrap();

        let db_path = raw_dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path).unwrap();
        conn.execute(CARDS_TABLE, []).unwrap();

        Self {
            data_dir: dir.path().join("data"),
            backup_dir: dir.path().join("backups"),
            dir,
            db_path,
            asset_dir,
        }
    }

    pub fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    pub fn insert_card(&self, key: i64, name: Option<&str>, tags: Option<&str>) {
        self.conn()
            .execute(
                "INSERT INTO Cards (GrpId, ArtId, Order_Title, ExpansionCode, ArtSize, IsToken, tags)
                 VALUES (?1, ?2, ?3, 'TST', 1, 0, ?4)",
                params![key, key * 10, name, tags],
            )
            .unwrap();
    }

    pub fn insert_token(&self, key: i64, tags: Option<&str>) {
        self.conn()
            .execute(
                "INSERT INTO Cards (GrpId, ArtId, Order_Title, ExpansionCode, ArtSize, IsToken, tags)
                 VALUES (?1, ?2, NULL, 'TST', 1, 1, ?3)",
                params![key, key * 10, tags],
            )
            .unwrap();
    }

    /// Insert many unnamed cards in one transaction.
    pub fn insert_range(&self, keys: std::ops::RangeInclusive<i64>, tags: Option<&str>) {
        let mut conn = self.conn();
        let tx = conn.transaction().unwrap();
        for key in keys {
            tx.execute(
                "INSERT INTO Cards (GrpId, ArtId, ArtSize, IsToken, tags)
                 VALUES (?1, ?2, 1, 0, ?3)",
                params![key, key * 10, tags],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }

    /// Make every update touching `key` abort.
    pub fn fail_updates_of(&self, key: i64) {
        self.conn()
            .execute_batch(&format!(
                "CREATE TRIGGER fail_{key} BEFORE UPDATE ON Cards WHEN NEW.GrpId = {key}
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
            ))
            .unwrap();
    }

    pub fn tags_of(&self, key: i64) -> Option<String> {
        self.conn()
            .query_row("SELECT tags FROM Cards WHERE GrpId = ?1", [key], |r| r.get(0))
            .unwrap()
    }

    pub fn write_container(&self, artwork_key: i64, content: &[u8]) -> PathBuf {
        let path = self
            .asset_dir
            .join(format!("{:06}_CardArt_abcdef.mtga", artwork_key));
        fs::write(&path, content).unwrap();
        path
    }

    pub fn app_config(&self, mutation_chunk: usize) -> AppConfig {
        AppConfig {
            data_dir: self.data_dir.clone(),
            backup_dir: self.backup_dir.clone(),
            chunk_limits: ChunkLimits::new(mutation_chunk, 900).unwrap(),
            texture_tool: None,
        }
    }

    /// A swapper pointed at this install, with auto-discovery disabled.
    pub fn swapper(&self, mutation_chunk: usize) -> Swapper {
        let config = self.app_config(mutation_chunk);
        let user_config =
            UserConfigStore::new(config.user_config_path()).with_discovery_roots(vec![]);
        let swapper = Swapper::open_with(config, user_config).unwrap();
        swapper
            .update_user_config(Some(self.db_path.to_str().unwrap()), None)
            .unwrap();
        swapper
    }

    pub fn backup_of(&self, file: &Path) -> PathBuf {
        BackupStore::new(&self.backup_dir)
            .backup_path_for(file)
            .unwrap()
    }
}

/// In-process codec treating a container as raw image bytes with one texture.
#[derive(Default)]
pub struct RawBytesCodec {
    pub replacements: AtomicUsize,
    fail_replace: bool,
    seen_images: Mutex<Vec<PathBuf>>,
}

impl RawBytesCodec {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A codec whose `replace_texture` always fails, after reading the image.
    pub fn failing_replace() -> Arc<Self> {
        Arc::new(Self {
            fail_replace: true,
            ..Self::default()
        })
    }

    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }

    /// Every staged image path handed to `replace_texture`.
    pub fn seen_images(&self) -> Vec<PathBuf> {
        self.seen_images.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextureCodec for RawBytesCodec {
    async fn extract_textures(&self, container: &Path) -> Result<Vec<Texture>, CodecError> {
        let bytes = tokio::fs::read(container).await?;
        if bytes.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![Texture {
            path_id: 1,
            name: "CardArt".to_string(),
            width: None,
            height: None,
        }])
    }

    async fn replace_texture(
        &self,
        _container: &Path,
        _texture: &Texture,
        image: &Path,
    ) -> Result<Vec<u8>, CodecError> {
        self.seen_images.lock().unwrap().push(image.to_path_buf());
        let bytes = tokio::fs::read(image).await?;
        if self.fail_replace {
            return Err(CodecError::ToolFailed("replace rejected".to_string()));
        }
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }

    async fn export_texture(
        &self,
        container: &Path,
        _texture: &Texture,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(tokio::fs::read(container).await?)
    }
}
