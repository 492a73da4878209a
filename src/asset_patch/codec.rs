//! Texture extraction and replacement inside artwork containers.
//!
//! The container format itself is handled by an external converter; this
//! module only speaks its command-line protocol:
//!
//! - `<tool> list <container>` prints a JSON array of textures,
//! - `<tool> replace <container> <path_id> <image> <out>` writes the patched
//!   container to `<out>`,
//! - `<tool> export <container> <path_id> <out>` writes the texture as an
//!   image to `<out>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Texture tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One addressable texture inside a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texture {
    pub path_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[async_trait]
pub trait TextureCodec: Send + Sync {
    async fn extract_textures(&self, container: &Path) -> Result<Vec<Texture>, CodecError>;

    /// Bytes of `container` with `texture` replaced by the image at `image`.
    async fn replace_texture(
        &self,
        container: &Path,
        texture: &Texture,
        image: &Path,
    ) -> Result<Vec<u8>, CodecError>;

    /// `texture` encoded as a standalone image.
    async fn export_texture(
        &self,
        container: &Path,
        texture: &Texture,
    ) -> Result<Vec<u8>, CodecError>;
}

/// [`TextureCodec`] backed by an external converter executable.
#[derive(Clone, Debug)]
pub struct ExternalToolCodec {
    program: PathBuf,
    /// Arguments placed before the subcommand, e.g. a script path.
    base_args: Vec<String>,
}

impl ExternalToolCodec {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            base_args: vec![],
        }
    }

    pub fn with_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    async fn invoke<I, S>(&self, args: I) -> Result<Vec<u8>, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CodecError::ToolFailed(format!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Run a subcommand that writes its result to a file and return the
    /// file's contents.
    async fn invoke_to_file(
        &self,
        args: Vec<&OsStr>,
        scratch_dir: Option<&Path>,
    ) -> Result<Vec<u8>, CodecError> {
        let out = match scratch_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        self.invoke(
            args.into_iter()
                .chain(std::iter::once(out.path().as_os_str())),
        )
        .await?;
        let bytes = tokio::fs::read(out.path()).await?;
        if bytes.is_empty() {
            return Err(CodecError::InvalidOutput(
                "texture tool produced an empty file".to_string(),
            ));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl TextureCodec for ExternalToolCodec {
    async fn extract_textures(&self, container: &Path) -> Result<Vec<Texture>, CodecError> {
        let stdout = self.invoke([OsStr::new("list"), container.as_os_str()]).await?;
        let textures: Vec<Texture> = serde_json::from_slice(&stdout)
            .map_err(|e| CodecError::InvalidOutput(format!("JSON parse error: {}", e)))?;
        debug!("{:?} holds {} textures", container, textures.len());
        Ok(textures)
    }

    async fn replace_texture(
        &self,
        container: &Path,
        texture: &Texture,
        image: &Path,
    ) -> Result<Vec<u8>, CodecError> {
        let path_id = texture.path_id.to_string();
        self.invoke_to_file(
            vec![
                OsStr::new("replace"),
                container.as_os_str(),
                OsStr::new(&path_id),
                image.as_os_str(),
            ],
            container.parent(),
        )
        .await
    }

    async fn export_texture(
        &self,
        container: &Path,
        texture: &Texture,
    ) -> Result<Vec<u8>, CodecError> {
        let path_id = texture.path_id.to_string();
        self.invoke_to_file(
            vec![
                OsStr::new("export"),
                container.as_os_str(),
                OsStr::new(&path_id),
            ],
            None,
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAKE_TOOL: &str = r#"
case "$1" in
  list) echo '[{"path_id": 7, "name": "CardArt"}]' ;;
  replace) cat "$2" "$4" > "$5" ;;
  export) printf 'png:%s' "$3" > "$4" ;;
  *) echo "unknown command $1" >&2; exit 2 ;;
esac
"#;

    fn fake_codec(dir: &TempDir) -> ExternalToolCodec {
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, FAKE_TOOL).unwrap();
        ExternalToolCodec::new("sh").with_args(vec![script.to_string_lossy().into_owned()])
    }

    #[tokio::test]
    async fn test_list_replace_export_protocol() {
        let dir = TempDir::new().unwrap();
        let codec = fake_codec(&dir);
        let container = dir.path().join("000001_CardArt_x");
        let image = dir.path().join("upload.png");
        std::fs::write(&container, b"C").unwrap();
        std::fs::write(&image, b"I").unwrap();

        let textures = codec.extract_textures(&container).await.unwrap();
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].path_id, 7);
        assert_eq!(textures[0].name, "CardArt");

        let patched = codec
            .replace_texture(&container, &textures[0], &image)
            .await
            .unwrap();
        assert_eq!(patched, b"CI");

        let exported = codec.export_texture(&container, &textures[0]).await.unwrap();
        assert_eq!(exported, b"png:7");
    }

    #[tokio::test]
    async fn test_tool_failure_carries_stderr() {
        let codec = ExternalToolCodec::new("sh").with_args(vec![
            "-c".to_string(),
            "echo broken >&2; exit 3".to_string(),
        ]);
        let err = codec
            .extract_textures(Path::new("/nowhere"))
            .await
            .unwrap_err();
        match err {
            CodecError::ToolFailed(message) => assert!(message.contains("broken")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_listing_is_invalid_output() {
        let codec = ExternalToolCodec::new("sh")
            .with_args(vec!["-c".to_string(), "echo not-json".to_string()]);
        let err = codec
            .extract_textures(Path::new("/nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidOutput(_)));
    }
}
