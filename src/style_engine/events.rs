use serde::{Deserialize, Serialize};

/// Events streamed to a caller while a style batch runs.
///
/// A stream carries any number of `Progress` events followed by exactly one
/// `Complete` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StyleEvent {
    Progress {
        /// Keys covered by finished chunks, changed or not.
        current: usize,
        total: usize,
        percentage: u32,
        /// Rows actually changed so far.
        changed: usize,
        message: String,
    },
    Complete {
        total: usize,
        failed_chunks: usize,
        message: String,
    },
    Error {
        message: String,
    },
}

impl StyleEvent {
    pub fn progress(current: usize, total: usize, changed: usize) -> Self {
        StyleEvent::Progress {
            current,
            total,
            percentage: percentage(current, total),
            changed,
            message: format!("Processed {}/{} cards", current, total),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StyleEvent::Progress { .. })
    }
}

fn percentage(current: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) as u64 * 100) / total as u64) as u32
}
