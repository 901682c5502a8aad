//! Timetable persistence interface
//!
//! Keeps the conflict guard independent of where entries live.

use async_trait::async_trait;

use super::error::StoreError;
use super::types::{OverlapQuery, Page, PageRequest, ScheduleEntry, ScheduleEntryInput, ScheduleFilter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for schedule entries.
///
/// `insert` and `update` must be atomic with respect to the non-overlap
/// invariant: when a concurrent writer stored an overlapping entry after the
/// caller's pre-check, the write fails with [`StoreError::Overlap`] instead of
/// persisting a conflicting row.
#[async_trait]
pub trait TimetableStore {
    /// All entries for the query's class and day whose interval overlaps
    /// the query range, minus `exclude_id`.
    async fn find_overlapping(&self, query: &OverlapQuery) -> StoreResult<Vec<ScheduleEntry>>;

    /// Assign an id, persist and return the stored entry.
    async fn insert(&self, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry>;

    /// Replace the entry's fields. [`StoreError::NotFound`] if `id` is unknown.
    async fn update(&self, id: i64, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry>;

    /// Remove the entry. Deleting an unknown id is not an error.
    async fn delete(&self, id: i64) -> StoreResult<()>;

    async fn get(&self, id: i64) -> StoreResult<Option<ScheduleEntry>>;

    async fn list(&self, filter: &ScheduleFilter, page: PageRequest) -> StoreResult<Page<ScheduleEntry>>;

    /// Name of this backend for logging.
    fn backend_name(&self) -> &str;
}
