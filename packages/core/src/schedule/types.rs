//! Core timetable types.
//!
//! Times are carried as [`NaiveTime`] and always rendered as zero-padded
//! `HH:MM:SS`, which is also the storage format: lexical order of the stored
//! text equals chronological order, so SQL range predicates work on it.

use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize, Serializer};

use super::error::ValidationError;

/// Storage / wire format for time-of-day values.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Day of the week, `0 = Sunday .. 6 = Saturday`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);
    pub const TUESDAY: DayOfWeek = DayOfWeek(2);
    pub const WEDNESDAY: DayOfWeek = DayOfWeek(3);
    pub const THURSDAY: DayOfWeek = DayOfWeek(4);
    pub const FRIDAY: DayOfWeek = DayOfWeek(5);
    pub const SATURDAY: DayOfWeek = DayOfWeek(6);

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (0..=6).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::InvalidDayOfWeek(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn weekday(self) -> Weekday {
        match self.0 {
            0 => Weekday::Sun,
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            _ => Weekday::Sat,
        }
    }

    /// English name used in user-facing messages.
    pub fn name(self) -> &'static str {
        match self.weekday() {
            Weekday::Sun => "Sunday",
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
        }
    }
}

impl TryFrom<i64> for DayOfWeek {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DayOfWeek> for i64 {
    fn from(day: DayOfWeek) -> Self {
        day.0 as i64
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        Self(weekday.num_days_from_sunday() as u8)
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn serialize_time<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_time(*time))
}

/// A time-of-day interval with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    #[serde(serialize_with = "serialize_time")]
    start: NaiveTime,
    #[serde(serialize_with = "serialize_time")]
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::EmptyInterval {
                start: format_time(start),
                end: format_time(end),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Inclusive overlap: two ranges that only touch at a boundary instant
    /// still overlap. The SQL predicates in the stores mirror this exactly.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Raw, unvalidated entry data as submitted by a form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleEntryDraft {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub day_of_week: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub room: Option<String>,
}

fn required_id(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

fn required_time(value: Option<String>, field: &'static str) -> Result<NaiveTime, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    parse_time(&value).ok_or(ValidationError::InvalidTime { field, value })
}

impl ScheduleEntryDraft {
    pub fn validate(self) -> Result<ScheduleEntryInput, ValidationError> {
        let class_id = required_id(self.class_id, "class_id")?;
        let subject_id = required_id(self.subject_id, "subject_id")?;
        let teacher_id = required_id(self.teacher_id, "teacher_id")?;
        let day_of_week = DayOfWeek::new(
            self.day_of_week
                .ok_or(ValidationError::MissingField("day_of_week"))?,
        )?;
        let start = required_time(self.start_time, "start_time")?;
        let end = required_time(self.end_time, "end_time")?;
        let range = TimeRange::new(start, end)?;
        let room = self
            .room
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(ScheduleEntryInput {
            class_id,
            subject_id,
            teacher_id,
            day_of_week,
            range,
            room,
        })
    }
}

/// A validated candidate entry, the unit the guard and stores work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntryInput {
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub day_of_week: DayOfWeek,
    pub range: TimeRange,
    pub room: Option<String>,
}

impl ScheduleEntryInput {
    pub fn overlap_query(&self, exclude_id: Option<i64>) -> OverlapQuery {
        OverlapQuery {
            class_id: self.class_id.clone(),
            day_of_week: self.day_of_week,
            range: self.range,
            exclude_id,
        }
    }
}

/// A persisted timetable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub day_of_week: DayOfWeek,
    #[serde(serialize_with = "serialize_time")]
    pub start_time: NaiveTime,
    #[serde(serialize_with = "serialize_time")]
    pub end_time: NaiveTime,
    pub room: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ScheduleEntry {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// Store-side overlap lookup for one class and day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapQuery {
    pub class_id: String,
    pub day_of_week: DayOfWeek,
    pub range: TimeRange,
    pub exclude_id: Option<i64>,
}

impl OverlapQuery {
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        entry.class_id == self.class_id
            && entry.day_of_week == self.day_of_week
            && self.exclude_id != Some(entry.id)
            && entry.range().overlaps(&self.range)
    }
}

/// Optional listing filters. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub class_id: Option<String>,
    pub day_of_week: Option<DayOfWeek>,
    pub teacher_id: Option<String>,
    pub subject_id: Option<String>,
}

impl ScheduleFilter {
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.class_id.as_deref().map_or(true, |c| c == entry.class_id)
            && self.day_of_week.map_or(true, |d| d == entry.day_of_week)
            && self.teacher_id.as_deref().map_or(true, |t| t == entry.teacher_id)
            && self.subject_id.as_deref().map_or(true, |s| s == entry.subject_id)
    }
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// 1-based page request. `per_page` is clamped to `1..=MAX_PER_PAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}
