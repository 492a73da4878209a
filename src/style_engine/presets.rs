//! Named style batches offered to users.

use serde::{Deserialize, Serialize};

use crate::card_store::{
    CardKey, ColorCardinality, Selection, StructuralFilter, StyleOp, VEHICLE_SUBTYPE,
};
use crate::tagset::{StyleId, PARALLAX_STYLE};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StyleCommand {
    /// Add the style to the listed cards.
    Unlock { keys: Vec<CardKey> },
    /// Add the style to every card matching the text, basic lands excepted.
    UnlockMatching { search: String },
    UnlockTokens,
    ResetTokens,
    /// Remove the style from mono-colored vehicles.
    ResetColoredVehicles,
    /// Remove the style from every card carrying it.
    ResetAll,
    Custom { selection: Selection, op: StyleOp },
}

impl StyleCommand {
    pub fn op(&self) -> StyleOp {
        match self {
            StyleCommand::Unlock { .. }
            | StyleCommand::UnlockMatching { .. }
            | StyleCommand::UnlockTokens => StyleOp::Add,
            StyleCommand::ResetTokens
            | StyleCommand::ResetColoredVehicles
            | StyleCommand::ResetAll => StyleOp::Remove,
            StyleCommand::Custom { op, .. } => *op,
        }
    }

    pub fn selection(&self, style: StyleId) -> Selection {
        match self {
            StyleCommand::Unlock { keys } => Selection::keys(keys.clone()),
            StyleCommand::UnlockMatching { search } => {
                Selection::search(search.clone()).excluding_basic_lands()
            }
            StyleCommand::UnlockTokens => Selection::structural(StructuralFilter::tokens()),
            StyleCommand::ResetTokens => {
                Selection::structural(StructuralFilter::tokens().with_style(style))
            }
            StyleCommand::ResetColoredVehicles => Selection::structural(StructuralFilter {
                subtype: Some(VEHICLE_SUBTYPE),
                colors: Some(ColorCardinality::Mono),
                with_style: Some(style),
                ..Default::default()
            }),
            StyleCommand::ResetAll => {
                Selection::structural(StructuralFilter::default().with_style(style))
            }
            StyleCommand::Custom { selection, .. } => selection.clone(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            StyleCommand::Unlock { .. } => "unlock cards",
            StyleCommand::UnlockMatching { .. } => "unlock matching cards",
            StyleCommand::UnlockTokens => "unlock tokens",
            StyleCommand::ResetTokens => "reset tokens",
            StyleCommand::ResetColoredVehicles => "reset colored vehicles",
            StyleCommand::ResetAll => "reset all cards",
            StyleCommand::Custom { .. } => "custom style edit",
        }
    }
}

/// A command together with the style it targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRequest {
    #[serde(flatten)]
    pub command: StyleCommand,
    #[serde(default = "default_style")]
    pub style: StyleId,
}

fn default_style() -> StyleId {
    PARALLAX_STYLE
}

impl StyleRequest {
    pub fn new(command: StyleCommand) -> Self {
        Self {
            command,
            style: PARALLAX_STYLE,
        }
    }

    pub fn with_style(mut self, style: StyleId) -> Self {
        self.style = style;
        self
    }
}
