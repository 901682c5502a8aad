//! Class timetable scheduling
//!
//! Types for timetable entries, the [`TimetableStore`] persistence seam and
//! the [`ScheduleConflictGuard`] that keeps entries of one class from
//! overlapping on the same day.

pub mod error;
pub mod guard;
pub mod timetable;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{ScheduleConflict, ScheduleError, StoreError, ValidationError};
pub use guard::{ScheduleConflictGuard, ScheduleResult};
pub use timetable::{StoreResult, TimetableStore};
pub use types::*;
