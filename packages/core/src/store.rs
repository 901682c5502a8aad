//! In-memory timetable store.
//!
//! `InMemoryTimetable` keeps entries in a `BTreeMap` keyed by id behind a
//! `tokio::sync::RwLock`. Writes re-check the overlap rule while holding the
//! write lock, so two concurrent inserts for the same slot cannot both land.
//! Used by tests and by `--storage memory` runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::schedule::{
    OverlapQuery, Page, PageRequest, ScheduleEntry, ScheduleEntryInput, ScheduleFilter,
    StoreError, StoreResult, TimetableStore,
};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<i64, ScheduleEntry>,
    last_id: i64,
}

impl Inner {
    fn overlapping(&self, query: &OverlapQuery) -> Vec<ScheduleEntry> {
        let mut found: Vec<ScheduleEntry> = self
            .entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.start_time, e.id));
        found
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTimetable {
    inner: RwLock<Inner>,
}

impl InMemoryTimetable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[async_trait]
impl TimetableStore for InMemoryTimetable {
    async fn find_overlapping(&self, query: &OverlapQuery) -> StoreResult<Vec<ScheduleEntry>> {
        Ok(self.inner.read().await.overlapping(query))
    }

    async fn insert(&self, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        let mut inner = self.inner.write().await;

        let conflicting = inner.overlapping(&input.overlap_query(None));
        if !conflicting.is_empty() {
            return Err(StoreError::Overlap(conflicting));
        }

        inner.last_id += 1;
        let now = Utc::now().to_rfc3339();
        let entry = ScheduleEntry {
            id: inner.last_id,
            class_id: input.class_id.clone(),
            subject_id: input.subject_id.clone(),
            teacher_id: input.teacher_id.clone(),
            day_of_week: input.day_of_week,
            start_time: input.range.start(),
            end_time: input.range.end(),
            room: input.room.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        inner.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update(&self, id: i64, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        let mut inner = self.inner.write().await;

        if !inner.entries.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let conflicting = inner.overlapping(&input.overlap_query(Some(id)));
        if !conflicting.is_empty() {
            return Err(StoreError::Overlap(conflicting));
        }

        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        entry.class_id = input.class_id.clone();
        entry.subject_id = input.subject_id.clone();
        entry.teacher_id = input.teacher_id.clone();
        entry.day_of_week = input.day_of_week;
        entry.start_time = input.range.start();
        entry.end_time = input.range.end();
        entry.room = input.room.clone();
        entry.updated_at = Utc::now().to_rfc3339();
        Ok(entry.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.inner.write().await.entries.remove(&id);
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Option<ScheduleEntry>> {
        Ok(self.inner.read().await.entries.get(&id).cloned())
    }

    async fn list(&self, filter: &ScheduleFilter, page: PageRequest) -> StoreResult<Page<ScheduleEntry>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&ScheduleEntry> =
            inner.entries.values().filter(|e| filter.matches(e)).collect();
        matching.sort_by_key(|e| (e.day_of_week, e.start_time, e.id));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page() as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: page.page(),
            per_page: page.per_page(),
        })
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
