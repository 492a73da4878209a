//! Replacing card artwork inside the game's asset containers.

mod codec;
mod engine;
mod resolver;

pub use codec::{CodecError, ExternalToolCodec, Texture, TextureCodec};
pub use engine::{AssetPatchEngine, SwapOutcome};
pub use resolver::{container_prefix, AssetBundleDirectory, ContainerResolver};
