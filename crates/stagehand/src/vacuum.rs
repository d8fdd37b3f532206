//! Retention: delete old records, never the published one.
//!
//! A vacuum pass keeps the newest `keep` records plus whichever record is
//! currently published, and deletes the rest. Per-record delete failures
//! are logged and skipped; one stuck record does not wedge retention.

use crate::error::StageError;
use crate::id::DeployId;

/// Store surface the vacuum pass operates on.
///
/// Both record stores implement this. Tests substitute stores that refuse
/// to delete.
pub trait RecordStore {
    /// Short label for log lines ("archive", "extraction").
    fn kind(&self) -> &'static str;

    /// Every record identifier in the store, oldest first.
    fn list(&self) -> Result<Vec<DeployId>, StageError>;

    /// Remove one record. Removing a record that is already gone is not an
    /// error.
    fn delete(&self, id: &DeployId) -> Result<(), StageError>;
}

/// Outcome of one vacuum pass over one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VacuumReport {
    /// Records found in the store before the pass.
    pub examined: usize,
    /// Records removed.
    pub deleted: usize,
    /// Records kept, by age or because they are published.
    pub retained: usize,
    /// Records the store failed to delete.
    pub failed: Vec<DeployId>,
}

/// Delete all but the newest `keep` records, always keeping `protected`.
///
/// `keep == 0` disables the pass entirely. The protected record counts
/// toward nothing: with `keep == 4` and an older published record, five
/// records survive. Returns an error only when the store cannot be listed
/// at all; individual delete failures land in [`VacuumReport::failed`].
pub fn vacuum(
    store: &dyn RecordStore,
    keep: usize,
    protected: Option<&DeployId>,
) -> Result<VacuumReport, StageError> {
    let mut report = VacuumReport::default();
    if keep == 0 {
        // Retention disabled by configuration.
        return Ok(report);
    }

    let ids = store.list()?;
    report.examined = ids.len();

    let cutoff = ids.len().saturating_sub(keep);
    for (index, id) in ids.iter().enumerate() {
        let in_window = index >= cutoff;
        let published = protected.is_some_and(|p| p == id);
        if in_window || published {
            report.retained += 1;
            continue;
        }

        match store.delete(id) {
            Ok(()) => {
                tracing::info!(
                    store = store.kind(),
                    record.id = %id,
                    "Vacuumed record"
                );
                report.deleted += 1;
            }
            Err(error) => {
                tracing::warn!(
                    store = store.kind(),
                    record.id = %id,
                    error = %error,
                    "Failed to vacuum record, continuing"
                );
                report.failed.push(id.clone());
            }
        }
    }

    Ok(report)
}
