//! Toggle card style tags in the game's card database and replace card
//! artwork inside its asset containers, with backups and a change log.

pub mod asset_patch;
pub mod audit;
pub mod batch;
pub mod card_store;
pub mod config;
pub mod error;
pub mod sqlite_persistence;
pub mod style_engine;
pub mod swapper;
pub mod tagset;

pub use error::{Result, SwapperError};
pub use swapper::Swapper;
