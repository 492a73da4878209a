use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::StyleEvent;
use super::presets::StyleRequest;
use crate::audit::{BackupStore, ChangeLogStore, ChangeOperation, EntityKind, ATTACHED_SCHEMA};
use crate::batch::{self, ChunkLimits};
use crate::card_store::{CardKey, CardStore, StyleOp};
use crate::error::{Result, SwapperError};
use crate::tagset::StyleId;

/// Result of one style batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub total_keys: usize,
    /// Rows whose tags actually changed.
    pub processed: usize,
    pub failed_chunks: usize,
    pub succeeded_chunks: usize,
    /// Stopped at a chunk boundary before the plan was exhausted.
    pub cancelled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    NothingToChange,
    Changed,
    Partial,
    TotalFailure,
}

impl MutationReport {
    pub fn outcome(&self) -> MutationOutcome {
        match (self.succeeded_chunks, self.failed_chunks, self.processed) {
            (0, failed, _) if failed > 0 => MutationOutcome::TotalFailure,
            (_, failed, _) if failed > 0 => MutationOutcome::Partial,
            (_, _, 0) => MutationOutcome::NothingToChange,
            _ => MutationOutcome::Changed,
        }
    }

    pub fn is_total_failure(&self) -> bool {
        self.outcome() == MutationOutcome::TotalFailure
    }

    pub fn summary(&self) -> String {
        let mut message = match self.outcome() {
            MutationOutcome::NothingToChange => {
                format!("No changes needed for {} cards", self.total_keys)
            }
            MutationOutcome::Changed => format!("Updated {} cards", self.processed),
            MutationOutcome::Partial => format!(
                "Updated {} cards, {} chunks failed",
                self.processed, self.failed_chunks
            ),
            MutationOutcome::TotalFailure => {
                format!("All {} chunks failed, nothing was updated", self.failed_chunks)
            }
        };
        if self.cancelled {
            message.push_str(" (cancelled)");
        }
        message
    }
}

impl From<StyleOp> for ChangeOperation {
    fn from(op: StyleOp) -> Self {
        match op {
            StyleOp::Add => ChangeOperation::AddStyle,
            StyleOp::Remove => ChangeOperation::RemoveStyle,
        }
    }
}

/// Applies style edits chunk by chunk. Every chunk is its own transaction and
/// a failing chunk never stops the ones after it.
pub struct StyleMutationEngine {
    store: CardStore,
    changelog: ChangeLogStore,
    backups: Arc<BackupStore>,
    limits: ChunkLimits,
}

impl StyleMutationEngine {
    pub fn new(
        store: CardStore,
        changelog: ChangeLogStore,
        backups: Arc<BackupStore>,
        limits: ChunkLimits,
    ) -> Self {
        Self {
            store,
            changelog,
            backups,
            limits,
        }
    }

    pub fn limits(&self) -> ChunkLimits {
        self.limits
    }

    pub fn mutate(
        &self,
        keys: &[CardKey],
        style: StyleId,
        op: StyleOp,
        observer: Option<&UnboundedSender<StyleEvent>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<MutationReport> {
        let chunks = batch::plan(keys, self.limits.mutation)?;
        let mut report = MutationReport {
            total_keys: keys.len(),
            ..Default::default()
        };
        if chunks.is_empty() {
            return Ok(report);
        }

        if let Some(path) = self.store.path() {
            self.backups.ensure_backup(path)?;
        }
        // A log file is written inside each chunk's transaction; an in-memory
        // log can only be appended right before the commit.
        let log_attached = match self.changelog.path() {
            Some(path) => {
                self.store.attach(path, ATTACHED_SCHEMA)?;
                true
            }
            None => false,
        };

        info!(
            "Applying {} of style {} to {} cards in {} chunks",
            op.as_str(),
            style,
            keys.len(),
            chunks.len()
        );

        let mut covered = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.map(CancellationToken::is_cancelled).unwrap_or(false) {
                info!("Style batch cancelled after {} of {} chunks", index, chunks.len());
                report.cancelled = true;
                break;
            }

            let result = self.store.apply_style_chunk(chunk, style, op, |tx, changed| {
                let recorded = if log_attached {
                    ChangeLogStore::append_with(
                        tx,
                        ATTACHED_SCHEMA,
                        changed,
                        EntityKind::Card,
                        op.into(),
                        Some(style),
                    )
                    .map_err(anyhow::Error::from)
                } else {
                    self.changelog
                        .record_many(changed, EntityKind::Card, op.into(), Some(style))
                };
                recorded
                    .map(|_| ())
                    .map_err(|e| SwapperError::Audit(e.to_string()))
            });
            match result {
                Ok(changed) => {
                    debug!(
                        "Chunk {}/{} committed, {} rows changed",
                        index + 1,
                        chunks.len(),
                        changed.len()
                    );
                    report.processed += changed.len();
                    report.succeeded_chunks += 1;
                }
                Err(e) => {
                    warn!("Chunk {}/{} failed: {}", index + 1, chunks.len(), e);
                    report.failed_chunks += 1;
                }
            }

            covered += chunk.len();
            if let Some(observer) = observer {
                // A dropped receiver only means nobody is watching.
                let _ = observer.send(StyleEvent::progress(
                    covered,
                    report.total_keys,
                    report.processed,
                ));
            }
        }

        info!("Style batch finished: {}", report.summary());
        Ok(report)
    }

    /// Resolve a preset to its keys and run it.
    pub fn run(
        &self,
        request: &StyleRequest,
        observer: Option<&UnboundedSender<StyleEvent>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<MutationReport> {
        let selection = request.command.selection(request.style);
        let keys = self.store.select_keys(&selection, self.limits.lookup)?;
        info!(
            "{}: {} cards selected for style {}",
            request.command.describe(),
            keys.len(),
            request.style
        );
        self.mutate(&keys, request.style, request.command.op(), observer, cancel)
    }

    /// Like [`Self::run`], finishing the event stream with exactly one
    /// terminal event.
    pub fn run_streaming(
        &self,
        request: &StyleRequest,
        events: &UnboundedSender<StyleEvent>,
        cancel: Option<&CancellationToken>,
    ) -> Result<MutationReport> {
        let result = self.run(request, Some(events), cancel);
        let terminal = match &result {
            Ok(report) if report.is_total_failure() => StyleEvent::Error {
                message: report.summary(),
            },
            Ok(report) => StyleEvent::Complete {
                total: report.processed,
                failed_chunks: report.failed_chunks,
                message: report.summary(),
            },
            Err(e) => StyleEvent::Error {
                message: e.to_string(),
            },
        };
        let _ = events.send(terminal);
        result
    }
}
