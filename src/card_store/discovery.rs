//! Locating the game's card database on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

const DATABASE_PREFIX: &str = "Raw_CardDatabase_";
const DATABASE_EXTENSION: &str = "mtga";

/// Install locations searched when no database path is configured.
pub fn default_search_roots() -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from(r"C:\Program Files\Wizards of the Coast\MTGA\MTGA_Data\Downloads\Raw"),
        PathBuf::from(r"C:\Program Files (x86)\Wizards of the Coast\MTGA\MTGA_Data\Downloads\Raw"),
    ];
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Library/Application Support/com.wizards.mtga/Downloads/Raw"));
    }
    roots
}

fn is_card_database(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(DATABASE_PREFIX))
        .unwrap_or(false);
    let extension_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(DATABASE_EXTENSION))
        .unwrap_or(false);
    name_matches && extension_matches
}

/// Most recently modified card database under any of `roots`.
pub fn discover_database(roots: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for root in roots.iter().filter(|r| r.is_dir()) {
        for entry in WalkDir::new(root)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_card_database(e.path()))
        {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            debug!("Found card database candidate {:?}", entry.path());
            if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                best = Some((modified, entry.path().to_path_buf()));
            }
        }
    }
    best.map(|(_, path)| path)
}
