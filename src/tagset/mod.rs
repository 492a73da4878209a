//! Codec for the comma-joined style tag column.
//!
//! The card database stores a card's styles as text such as `"42,1696804317"`.
//! Historical rows also carry leading/trailing delimiters (`",42,"`), doubled
//! delimiters and the odd non-numeric token. Everything outside this module
//! works on [`TagSet`]; only here is the column treated as a string.

mod sql;

pub use sql::register_functions;

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

/// Opaque identifier of a rendering style. No catalog is kept.
pub type StyleId = i32;

/// Style applied by the game's parallax animation.
pub const PARALLAX_STYLE: StyleId = 1696804317;

pub const DELIMITER: char = ',';

/// Unordered set of style identifiers, serialized in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TagSet(BTreeSet<StyleId>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the raw column value.
    ///
    /// Never fails: `None`, empty input, empty segments and tokens that are
    /// not integers all read as absent.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        raw.split(DELIMITER)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter_map(|token| match token.parse::<StyleId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!("Dropping malformed style tag {:?}", token);
                    None
                }
            })
            .collect()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for id in &self.0 {
            if !out.is_empty() {
                out.push(DELIMITER);
            }
            out.push_str(&id.to_string());
        }
        out
    }

    pub fn contains(&self, id: StyleId) -> bool {
        self.0.contains(&id)
    }

    /// Returns true when the set changed.
    pub fn insert(&mut self, id: StyleId) -> bool {
        self.0.insert(id)
    }

    /// Returns true when the set changed.
    pub fn remove(&mut self, id: StyleId) -> bool {
        self.0.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = StyleId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<StyleId> for TagSet {
    fn from_iter<I: IntoIterator<Item = StyleId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

pub fn parse(raw: Option<&str>) -> TagSet {
    TagSet::parse(raw)
}

pub fn serialize(set: &TagSet) -> String {
    set.serialize()
}

/// `parse -> insert -> serialize`. Idempotent.
pub fn add(raw: Option<&str>, id: StyleId) -> String {
    let mut set = TagSet::parse(raw);
    set.insert(id);
    set.serialize()
}

/// `parse -> remove -> serialize`. Idempotent.
pub fn remove(raw: Option<&str>, id: StyleId) -> String {
    let mut set = TagSet::parse(raw);
    set.remove(id);
    set.serialize()
}

pub fn contains(raw: Option<&str>, id: StyleId) -> bool {
    TagSet::parse(raw).contains(id)
}
