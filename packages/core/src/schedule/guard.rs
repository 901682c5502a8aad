//! Schedule conflict guard.
//!
//! Every create and update of a timetable entry goes through
//! [`ScheduleConflictGuard`], which refuses writes that would make two entries
//! of the same class overlap on the same day. The guard's own lookup produces
//! the user-facing conflict; the store enforces the invariant atomically, so a
//! write that races past the lookup still comes back as a conflict.

use std::sync::Arc;

use super::error::{ScheduleConflict, ScheduleError, StoreError};
use super::timetable::TimetableStore;
use super::types::{Page, PageRequest, ScheduleEntry, ScheduleEntryInput, ScheduleFilter, TimeRange};

pub type ScheduleResult<T> = Result<T, ScheduleError>;

pub struct ScheduleConflictGuard {
    store: Arc<dyn TimetableStore + Send + Sync>,
}

impl ScheduleConflictGuard {
    pub fn new(store: Arc<dyn TimetableStore + Send + Sync>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TimetableStore + Send + Sync> {
        &self.store
    }

    /// Read-only check for a new entry.
    pub async fn check_create(&self, candidate: &ScheduleEntryInput) -> ScheduleResult<()> {
        self.check(candidate, None).await
    }

    /// Read-only check for an existing entry; the entry never conflicts with
    /// its own stored state.
    pub async fn check_update(&self, entry_id: i64, candidate: &ScheduleEntryInput) -> ScheduleResult<()> {
        self.check(candidate, Some(entry_id)).await
    }

    pub async fn create_entry(&self, candidate: &ScheduleEntryInput) -> ScheduleResult<ScheduleEntry> {
        self.check_create(candidate).await?;

        match self.store.insert(candidate).await {
            Ok(entry) => {
                tracing::info!(
                    entry_id = entry.id,
                    class_id = %entry.class_id,
                    day = %entry.day_of_week,
                    slot = %entry.range(),
                    "Schedule entry created"
                );
                Ok(entry)
            }
            Err(err) => Err(self.write_failure(candidate, None, err).await),
        }
    }

    pub async fn update_entry(
        &self,
        entry_id: i64,
        candidate: &ScheduleEntryInput,
    ) -> ScheduleResult<ScheduleEntry> {
        // An unknown id is reported as such, even when the slot is taken.
        if self.store.get(entry_id).await?.is_none() {
            return Err(ScheduleError::NotFound(entry_id));
        }
        self.check_update(entry_id, candidate).await?;

        match self.store.update(entry_id, candidate).await {
            Ok(entry) => {
                tracing::info!(
                    entry_id,
                    class_id = %entry.class_id,
                    day = %entry.day_of_week,
                    slot = %entry.range(),
                    "Schedule entry updated"
                );
                Ok(entry)
            }
            Err(err) => Err(self.write_failure(candidate, Some(entry_id), err).await),
        }
    }

    /// Removing an entry cannot create an overlap, so nothing is checked.
    pub async fn delete_entry(&self, entry_id: i64) -> ScheduleResult<()> {
        self.store.delete(entry_id).await?;
        tracing::info!(entry_id, "Schedule entry deleted");
        Ok(())
    }

    pub async fn get_entry(&self, entry_id: i64) -> ScheduleResult<ScheduleEntry> {
        self.store
            .get(entry_id)
            .await?
            .ok_or(ScheduleError::NotFound(entry_id))
    }

    pub async fn list_entries(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> ScheduleResult<Page<ScheduleEntry>> {
        Ok(self.store.list(filter, page).await?)
    }

    async fn check(&self, candidate: &ScheduleEntryInput, exclude_id: Option<i64>) -> ScheduleResult<()> {
        // Inputs built outside `ScheduleEntryDraft::validate` still go
        // through the interval rule.
        TimeRange::new(candidate.range.start(), candidate.range.end())?;

        let conflicting = self
            .store
            .find_overlapping(&candidate.overlap_query(exclude_id))
            .await?;

        if conflicting.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            class_id = %candidate.class_id,
            day = %candidate.day_of_week,
            slot = %candidate.range,
            conflicts = conflicting.len(),
            "Schedule entry rejected: overlapping slot"
        );
        Err(ScheduleError::Conflict(ScheduleConflict {
            day_of_week: candidate.day_of_week,
            conflicting,
        }))
    }

    /// Translate a failed write. An overlap reported by the store means a
    /// concurrent writer won the slot after our check.
    async fn write_failure(
        &self,
        candidate: &ScheduleEntryInput,
        exclude_id: Option<i64>,
        err: StoreError,
    ) -> ScheduleError {
        let mut conflicting = match err {
            StoreError::Overlap(conflicting) => conflicting,
            StoreError::NotFound(id) => return ScheduleError::NotFound(id),
            other => {
                tracing::error!(backend = self.store.backend_name(), "Timetable write failed: {}", other);
                return other.into();
            }
        };

        tracing::warn!(
            class_id = %candidate.class_id,
            day = %candidate.day_of_week,
            slot = %candidate.range,
            "Schedule entry rejected by store: concurrent overlapping write"
        );

        if conflicting.is_empty() {
            // Best effort: name the winner in the message.
            if let Ok(found) = self
                .store
                .find_overlapping(&candidate.overlap_query(exclude_id))
                .await
            {
                conflicting = found;
            }
        }

        ScheduleError::Conflict(ScheduleConflict {
            day_of_week: candidate.day_of_week,
            conflicting,
        })
    }
}
