//! Card database access: connection lifecycle, typed rows and row selection.

pub mod discovery;
pub mod manager;
pub mod models;
pub mod selector;
pub mod store;

pub use discovery::{default_search_roots, discover_database};
pub use manager::{asset_dir_for, StoreManager, StoreStatus};
pub use models::{ArtworkKey, CardKey, CardQuery, CardRecord, CardSort, CardSummary};
pub use selector::{
    is_basic_land, ColorCardinality, Selection, SelectionCriteria, StructuralFilter,
    BASIC_LAND_NAMES, VEHICLE_SUBTYPE,
};
pub use store::{CardStore, StyleOp};
