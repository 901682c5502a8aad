//! Error types for timetable operations

use thiserror::Error;

use super::types::{DayOfWeek, ScheduleEntry};

/// Rejected candidate data. Raised before the store is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field must not be blank: {0}")]
    BlankField(&'static str),

    #[error("day_of_week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDayOfWeek(i64),

    #[error("{field} is not a valid time (expected HH:MM or HH:MM:SS): {value:?}")]
    InvalidTime { field: &'static str, value: String },

    #[error("start time {start} must be before end time {end}")]
    EmptyInterval { start: String, end: String },
}

/// Failures reported by a [`TimetableStore`](super::TimetableStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("schedule entry {0} not found")]
    NotFound(i64),

    /// The write would break the non-overlap invariant. Carries whatever
    /// conflicting entries the store could identify (possibly none when the
    /// database trigger fired).
    #[error("schedule entry overlaps {} existing entries", .0.len())]
    Overlap(Vec<ScheduleEntry>),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt schedule row: {0}")]
    Corrupt(String),

    /// The write task was cancelled or panicked before it reported back.
    #[error("timetable write did not complete: {0}")]
    Interrupted(String),
}

/// The proposed slot overlaps existing entries of the same class and day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConflict {
    pub day_of_week: DayOfWeek,
    pub conflicting: Vec<ScheduleEntry>,
}

impl ScheduleConflict {
    pub fn ids(&self) -> Vec<i64> {
        self.conflicting.iter().map(|e| e.id).collect()
    }

    /// User-facing message naming the day and the clashing times.
    pub fn message(&self) -> String {
        if self.conflicting.is_empty() {
            return format!(
                "Schedule conflict on {}: another entry was saved for this slot",
                self.day_of_week
            );
        }
        let slots: Vec<String> = self
            .conflicting
            .iter()
            .map(|e| match e.room.as_deref() {
                Some(room) => format!("{} (room {})", e.range(), room),
                None => e.range().to_string(),
            })
            .collect();
        format!(
            "Schedule conflict on {}: overlaps {}",
            self.day_of_week,
            slots.join(", ")
        )
    }
}

/// Errors surfaced by [`ScheduleConflictGuard`](super::ScheduleConflictGuard).
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid schedule entry: {0}")]
    Validation(#[from] ValidationError),

    #[error("{}", .0.message())]
    Conflict(ScheduleConflict),

    #[error("schedule entry {0} not found")]
    NotFound(i64),

    #[error("timetable store error: {0}")]
    Store(StoreError),
}

impl ScheduleError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ScheduleError::Conflict(_))
    }
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ScheduleError::NotFound(id),
            other => ScheduleError::Store(other),
        }
    }
}
