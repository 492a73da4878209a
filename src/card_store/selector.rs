//! Target row selection for style batches.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::models::CardKey;
use crate::error::{Result, SwapperError};
use crate::tagset::StyleId;

/// Basic land names excluded from "unlock everything" operations.
pub const BASIC_LAND_NAMES: &[&str] = &["island", "forest", "mountain", "plains", "wastes", "swamp"];

/// Subtype id of vehicles.
pub const VEHICLE_SUBTYPE: i32 = 331;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorCardinality {
    Colorless,
    Mono,
    Multi,
}

/// Predicate over the descriptive columns. Unset fields don't constrain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFilter {
    pub is_token: Option<bool>,
    pub subtype: Option<i32>,
    pub colors: Option<ColorCardinality>,
    pub rarity: Option<i64>,
    pub with_style: Option<StyleId>,
}

impl StructuralFilter {
    pub fn tokens() -> Self {
        Self {
            is_token: Some(true),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: StyleId) -> Self {
        self.with_style = Some(style);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionCriteria {
    Keys(Vec<CardKey>),
    Search(String),
    Structural(StructuralFilter),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub criteria: SelectionCriteria,
    /// Drop cards whose name starts with a basic land name.
    pub exclude_basic_lands: bool,
}

impl Selection {
    pub fn new(criteria: SelectionCriteria) -> Self {
        Self {
            criteria,
            exclude_basic_lands: false,
        }
    }

    pub fn keys(keys: Vec<CardKey>) -> Self {
        Self::new(SelectionCriteria::Keys(keys))
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self::new(SelectionCriteria::Search(text.into()))
    }

    pub fn structural(filter: StructuralFilter) -> Self {
        Self::new(SelectionCriteria::Structural(filter))
    }

    pub fn excluding_basic_lands(mut self) -> Self {
        self.exclude_basic_lands = true;
        self
    }

    /// Reject criteria that can't produce a meaningful query.
    pub fn validate(&self) -> Result<()> {
        if let SelectionCriteria::Search(text) = &self.criteria {
            if text.chars().any(|c| c == '\0') {
                return Err(SwapperError::InvalidArgument(
                    "search text contains a NUL character".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub fn is_basic_land(name: &str) -> bool {
    let lowered = name.to_lowercase();
    BASIC_LAND_NAMES
        .iter()
        .any(|land| lowered.starts_with(land))
}

/// Escape LIKE wildcards so user text matches literally.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Shared FROM clause joining each card to its linked face.
pub(crate) const CARD_WITH_FACE_FROM: &str = "FROM Cards c1
    LEFT JOIN Cards c2
        ON c1.LinkedFaceGrpIds = c2.GrpId
        AND NULLIF(c2.Order_Title, '') IS NOT NULL";

pub(crate) const HAS_NAME_CONDITION: &str =
    "(NULLIF(c1.Order_Title, '') IS NOT NULL OR NULLIF(c2.Order_Title, '') IS NOT NULL)";

/// Disjunction over the searchable fields; binds the pattern as `?1`.
pub(crate) const SEARCH_CONDITION: &str = "(
        c1.Order_Title LIKE ?1 ESCAPE '\\' OR
        c2.Order_Title LIKE ?1 ESCAPE '\\' OR
        c1.ExpansionCode LIKE ?1 ESCAPE '\\' OR
        CAST(c1.GrpId AS TEXT) LIKE ?1 ESCAPE '\\' OR
        CAST(c1.ArtId AS TEXT) LIKE ?1 ESCAPE '\\'
    )";

/// Korean title table shipped with some client builds.
pub(crate) const LOCALIZED_TITLES_TABLE: &str = "Localizations_koKR";

pub(crate) const LOCALIZED_TITLES_JOIN: &str =
    "LEFT JOIN Localizations_koKR lko ON c1.TitleId = lko.LocId";

pub(crate) const LOCALIZED_SEARCH_CONDITION: &str = "lko.Loc LIKE ?1 ESCAPE '\\'";

/// Query yielding `(key, name)` ordered by key, for non-explicit criteria.
pub(crate) fn build_query(criteria: &SelectionCriteria) -> Option<(String, Vec<Value>)> {
    let select = format!(
        "SELECT c1.GrpId, COALESCE(NULLIF(c1.Order_Title, ''), NULLIF(c2.Order_Title, '')) {}",
        CARD_WITH_FACE_FROM
    );
    match criteria {
        SelectionCriteria::Keys(_) => None,
        SelectionCriteria::Search(text) => {
            let text = text.trim();
            if text.is_empty() {
                Some((
                    format!("{} WHERE {} ORDER BY c1.GrpId", select, HAS_NAME_CONDITION),
                    vec![],
                ))
            } else {
                Some((
                    format!(
                        "{} WHERE {} AND {} ORDER BY c1.GrpId",
                        select, HAS_NAME_CONDITION, SEARCH_CONDITION
                    ),
                    vec![Value::Text(like_pattern(text))],
                ))
            }
        }
        SelectionCriteria::Structural(filter) => {
            let mut conditions: Vec<String> = Vec::new();
            let mut params: Vec<Value> = Vec::new();
            fn bind(value: Value, params: &mut Vec<Value>) -> String {
                params.push(value);
                format!("?{}", params.len())
            }

            if let Some(is_token) = filter.is_token {
                let p = bind(Value::Integer(is_token as i64), &mut params);
                conditions.push(format!("COALESCE(c1.IsToken, 0) = {}", p));
            }
            if let Some(subtype) = filter.subtype {
                let p = bind(Value::Integer(subtype as i64), &mut params);
                conditions.push(format!("tagset_contains(c1.SubTypes, {})", p));
            }
            if let Some(colors) = filter.colors {
                conditions.push(
                    match colors {
                        ColorCardinality::Colorless => "tagset_len(c1.Colors) = 0",
                        ColorCardinality::Mono => "tagset_len(c1.Colors) = 1",
                        ColorCardinality::Multi => "tagset_len(c1.Colors) > 1",
                    }
                    .to_string(),
                );
            }
            if let Some(rarity) = filter.rarity {
                let p = bind(Value::Integer(rarity), &mut params);
                conditions.push(format!("c1.Rarity = {}", p));
            }
            if let Some(style) = filter.with_style {
                let p = bind(Value::Integer(style as i64), &mut params);
                conditions.push(format!("tagset_contains(c1.tags, {})", p));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", conditions.join(" AND "))
            };
            Some((format!("{}{} ORDER BY c1.GrpId", select, where_clause), params))
        }
    }
}

/// Sort ascending, drop duplicate keys and apply the optional denylist.
pub(crate) fn finish(
    mut rows: Vec<(CardKey, Option<String>)>,
    exclude_basic_lands: bool,
) -> Vec<CardKey> {
    rows.sort_by_key(|(key, _)| *key);
    rows.dedup_by_key(|(key, _)| *key);
    rows.into_iter()
        .filter(|(_, name)| {
            !exclude_basic_lands || !name.as_deref().map(is_basic_land).unwrap_or(false)
        })
        .map(|(key, _)| key)
        .collect()
}
