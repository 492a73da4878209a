//! Lifecycle of the card database connection.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use super::store::CardStore;
use crate::error::{Result, SwapperError};

/// Directory holding the artwork containers, relative to the database.
pub fn asset_dir_for(db_path: &Path) -> Option<PathBuf> {
    db_path
        .parent()
        .and_then(Path::parent)
        .map(|root| root.join("AssetBundle"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub database_path: Option<PathBuf>,
    pub is_db_connected: bool,
}

#[derive(Default)]
struct ManagerState {
    location: Option<PathBuf>,
    store: Option<CardStore>,
}

/// Owns the configured database location and the lazily opened store.
///
/// Changing the location closes the current connection; the next call to
/// [`StoreManager::store`] opens the new one.
#[derive(Default)]
pub struct StoreManager {
    state: Mutex<ManagerState>,
}

impl StoreManager {
    pub fn new(location: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                location,
                store: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ManagerState>> {
        self.state.lock().map_err(|_| SwapperError::poisoned())
    }

    pub fn location(&self) -> Result<Option<PathBuf>> {
        Ok(self.lock()?.location.clone())
    }

    pub fn set_location(&self, location: Option<PathBuf>) -> Result<()> {
        let mut state = self.lock()?;
        if state.location != location {
            if state.store.take().is_some() {
                info!("Closing card database at {:?}", state.location);
            }
            state.location = location;
        }
        Ok(())
    }

    /// Return the open store, opening and validating it first if needed.
    pub fn store(&self) -> Result<CardStore> {
        let mut state = self.lock()?;
        if let Some(store) = &state.store {
            return Ok(store.clone());
        }
        let location = state
            .location
            .clone()
            .ok_or(SwapperError::ConfigurationMissing)?;
        let store = CardStore::open(&location).inspect_err(|e| {
            warn!("Could not open card database at {:?}: {}", location, e);
        })?;
        state.store = Some(store.clone());
        Ok(store)
    }

    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.store.take().is_some() {
            info!("Closed card database at {:?}", state.location);
        }
        Ok(())
    }

    /// Connection status; attempts to connect like the first data request would.
    pub fn status(&self) -> Result<StoreStatus> {
        let is_db_connected = self.store().is_ok();
        Ok(StoreStatus {
            database_path: self.location()?,
            is_db_connected,
        })
    }

    pub fn asset_dir(&self) -> Result<PathBuf> {
        let location = self.location()?.ok_or(SwapperError::ConfigurationMissing)?;
        asset_dir_for(&location).ok_or_else(|| {
            SwapperError::NotFound(format!("no asset directory next to {:?}", location))
        })
    }
}
