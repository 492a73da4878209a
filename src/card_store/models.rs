use clap::ValueEnum;
use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde::Serialize;

use crate::tagset::TagSet;

/// Row identifier of a card variant (`Cards.GrpId`).
pub type CardKey = i64;

/// Identifier of the bitmap shared by one or more variants (`Cards.ArtId`).
pub type ArtworkKey = i64;

/// A row of the `Cards` table, typed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardRecord {
    pub key: CardKey,
    pub artwork_key: ArtworkKey,
    pub display_name: Option<String>,
    pub set_code: Option<String>,
    pub subtype_field: Option<String>,
    pub color_field: Option<String>,
    pub rarity_class: Option<i64>,
    pub is_token: bool,
    #[serde(serialize_with = "serialize_tag_set")]
    pub tag_set: TagSet,
    pub linked_face_key: Option<CardKey>,
    pub is_digital_only: bool,
    pub is_rebalanced: bool,
}

fn serialize_tag_set<S: serde::Serializer>(set: &TagSet, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(set.iter())
}

/// Column list matching [`CardRecord::from_row`]. Keep the two in sync.
pub(crate) const CARD_RECORD_COLUMNS: &str = "GrpId, ArtId, Order_Title, ExpansionCode, SubTypes, \
     Colors, Rarity, IsToken, tags, LinkedFaceGrpIds, IsDigitalOnly, IsRebalanced";

impl CardRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            artwork_key: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
            display_name: text_column(row, 2)?,
            set_code: text_column(row, 3)?,
            subtype_field: text_column(row, 4)?,
            color_field: text_column(row, 5)?,
            rarity_class: row.get(6)?,
            is_token: flag_column(row, 7)?,
            tag_set: TagSet::parse(text_column(row, 8)?.as_deref()),
            linked_face_key: text_column(row, 9)?.and_then(|s| s.trim().parse().ok()),
            is_digital_only: flag_column(row, 10)?,
            is_rebalanced: flag_column(row, 11)?,
        })
    }

    /// Number of colors in the color field; 0 for colorless.
    pub fn color_count(&self) -> usize {
        TagSet::parse(self.color_field.as_deref()).len()
    }

    pub fn is_alchemy(&self) -> bool {
        self.is_digital_only || self.is_rebalanced
    }
}

/// Read a column that may be stored as text or integer.
pub(crate) fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

fn flag_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(value) => value != 0,
        ValueRef::Text(bytes) => matches!(bytes, b"1" | b"true" | b"True"),
        _ => false,
    })
}

/// Listing entry for the card browser.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardSummary {
    pub name: String,
    pub set_code: Option<String>,
    pub art_size: Option<String>,
    pub key: CardKey,
    pub artwork_key: ArtworkKey,
    pub is_alchemy: bool,
    pub localized_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CardSort {
    #[default]
    Name,
    Set,
    Key,
    Art,
}

impl CardSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            CardSort::Name => "Order_Title",
            CardSort::Set => "c1.ExpansionCode",
            CardSort::Key => "c1.GrpId",
            CardSort::Art => "c1.ArtId",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CardQuery {
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub sort: CardSort,
}

impl Default for CardQuery {
    fn default() -> Self {
        Self {
            search: None,
            limit: 100,
            offset: 0,
            sort: CardSort::default(),
        }
    }
}
