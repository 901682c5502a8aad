//! Guard behaviour tests: conflict scenarios, self-exclusion on update,
//! store failure propagation and property-based overlap checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;
use proptest::prelude::*;

use super::*;
use crate::store::InMemoryTimetable;

fn t(raw: &str) -> NaiveTime {
    parse_time(raw).unwrap()
}

fn input(class_id: &str, day: DayOfWeek, start: &str, end: &str, room: &str) -> ScheduleEntryInput {
    ScheduleEntryInput {
        class_id: class_id.into(),
        subject_id: "math".into(),
        teacher_id: "teacher-1".into(),
        day_of_week: day,
        range: TimeRange::new(t(start), t(end)).unwrap(),
        room: Some(room.into()),
    }
}

fn guard() -> ScheduleConflictGuard {
    ScheduleConflictGuard::new(Arc::new(InMemoryTimetable::new()))
}

/// Answers overlap lookups with a stale (empty) view, as if another request
/// wrote between the guard's check and its insert.
struct StaleReadStore {
    inner: InMemoryTimetable,
}

#[async_trait]
impl TimetableStore for StaleReadStore {
    async fn find_overlapping(&self, _query: &OverlapQuery) -> StoreResult<Vec<ScheduleEntry>> {
        Ok(Vec::new())
    }
    async fn insert(&self, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        self.inner.insert(input).await
    }
    async fn update(&self, id: i64, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        self.inner.update(id, input).await
    }
    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.inner.delete(id).await
    }
    async fn get(&self, id: i64) -> StoreResult<Option<ScheduleEntry>> {
        self.inner.get(id).await
    }
    async fn list(&self, filter: &ScheduleFilter, page: PageRequest) -> StoreResult<Page<ScheduleEntry>> {
        self.inner.list(filter, page).await
    }
    fn backend_name(&self) -> &str {
        "stale"
    }
}

/// Every call fails like an unreachable database.
struct UnavailableStore;

#[async_trait]
impl TimetableStore for UnavailableStore {
    async fn find_overlapping(&self, _query: &OverlapQuery) -> StoreResult<Vec<ScheduleEntry>> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn insert(&self, _input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn update(&self, _id: i64, _input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn delete(&self, _id: i64) -> StoreResult<()> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn get(&self, _id: i64) -> StoreResult<Option<ScheduleEntry>> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn list(&self, _filter: &ScheduleFilter, _page: PageRequest) -> StoreResult<Page<ScheduleEntry>> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    fn backend_name(&self) -> &str {
        "unavailable"
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn monday_scenario_overlap_and_boundary_touch() {
    let guard = guard();
    let first = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();

    let err = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "08:00", "08:40", "102"))
        .await
        .unwrap_err();
    match err {
        ScheduleError::Conflict(conflict) => {
            assert_eq!(conflict.ids(), vec![first.id]);
            assert_eq!(conflict.day_of_week, DayOfWeek::MONDAY);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    // Touching at 08:20 counts as overlap.
    let err = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "08:20", "09:10", "101"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn delete_frees_the_slot() {
    let guard = guard();
    let first = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    let retry = input("C1", DayOfWeek::MONDAY, "08:00", "08:40", "102");
    assert!(guard.create_entry(&retry).await.unwrap_err().is_conflict());

    guard.delete_entry(first.id).await.unwrap();

    let created = guard.create_entry(&retry).await.unwrap();
    assert_eq!(created.room.as_deref(), Some("102"));
}

#[tokio::test]
async fn conflict_on_create_writes_nothing() {
    let store = Arc::new(InMemoryTimetable::new());
    let guard = ScheduleConflictGuard::new(store.clone());
    guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    let _ = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:00", "07:45", "101"))
        .await;
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn other_class_or_day_never_conflicts() {
    let guard = guard();
    guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    guard
        .check_create(&input("C2", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    guard
        .check_create(&input("C1", DayOfWeek::TUESDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
}

#[tokio::test]
async fn check_create_has_no_side_effects() {
    let store = Arc::new(InMemoryTimetable::new());
    let guard = ScheduleConflictGuard::new(store.clone());
    guard
        .check_create(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    assert!(store.is_empty().await);
}

// =============================================================================
// Updates
// =============================================================================

#[tokio::test]
async fn update_with_unchanged_range_does_not_conflict_with_itself() {
    let guard = guard();
    let entry = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();

    let moved_room = input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "204");
    guard.check_update(entry.id, &moved_room).await.unwrap();
    let updated = guard.update_entry(entry.id, &moved_room).await.unwrap();
    assert_eq!(updated.id, entry.id);
    assert_eq!(updated.room.as_deref(), Some("204"));
}

#[tokio::test]
async fn update_into_another_entry_conflicts() {
    let guard = guard();
    guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();
    let second = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "09:00", "09:50", "101"))
        .await
        .unwrap();

    let err = guard
        .update_entry(second.id, &input("C1", DayOfWeek::MONDAY, "08:10", "09:00", "101"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let unchanged = guard.get_entry(second.id).await.unwrap();
    assert_eq!(unchanged.start_time, t("09:00"));
}

#[tokio::test]
async fn update_unknown_entry_is_not_found() {
    let guard = guard();
    let err = guard
        .update_entry(77, &input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(77)));
}

#[tokio::test]
async fn update_unknown_entry_into_taken_slot_is_not_found() {
    let guard = guard();
    guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();

    let err = guard
        .update_entry(999, &input("C1", DayOfWeek::MONDAY, "08:00", "08:50", "102"))
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(999)));
}

#[tokio::test]
async fn get_unknown_entry_is_not_found() {
    let err = guard().get_entry(5).await.unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(5)));
}

// =============================================================================
// Races and store failures
// =============================================================================

#[tokio::test]
async fn store_overlap_after_stale_check_surfaces_as_conflict() {
    let store = Arc::new(StaleReadStore {
        inner: InMemoryTimetable::new(),
    });
    let guard = ScheduleConflictGuard::new(store.clone());
    guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101"))
        .await
        .unwrap();

    let err = guard
        .create_entry(&input("C1", DayOfWeek::MONDAY, "08:00", "08:40", "102"))
        .await
        .unwrap_err();
    match err {
        ScheduleError::Conflict(conflict) => assert_eq!(conflict.conflicting.len(), 1),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(store.inner.len().await, 1);
}

#[tokio::test]
async fn concurrent_creates_for_one_slot_admit_exactly_one() {
    let guard = Arc::new(guard());
    let mut handles = Vec::new();
    for room in ["101", "102", "103", "104"] {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            guard
                .create_entry(&input("C1", DayOfWeek::MONDAY, "07:30", "08:20", room))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) if err.is_conflict() => conflicts += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 3);
}

#[tokio::test]
async fn store_failures_propagate_unchanged() {
    let guard = ScheduleConflictGuard::new(Arc::new(UnavailableStore));
    let candidate = input("C1", DayOfWeek::MONDAY, "07:30", "08:20", "101");

    let err = guard.create_entry(&candidate).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Store(StoreError::Database(_))));

    let err = guard.delete_entry(1).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Store(StoreError::Database(_))));
}

// =============================================================================
// Property tests
// =============================================================================

/// A range expressed in whole minutes within one day.
fn minute_range_strategy() -> impl Strategy<Value = (u32, u32)> {
    (0u32..1380u32, 1u32..60u32).prop_map(|(start, len)| (start, start + len))
}

/// Two ranges guaranteed to overlap: `b` starts no later than `a` ends and
/// ends no earlier than `a` starts.
fn overlapping_pair_strategy() -> impl Strategy<Value = ((u32, u32), (u32, u32))> {
    minute_range_strategy()
        .prop_flat_map(|a| (Just(a), a.0.saturating_sub(30)..=a.1, 1u32..60u32))
        .prop_map(|(a, b_start, len)| {
            let b_end = (b_start + len).max(a.0).max(b_start + 1).min(1439);
            (a, (b_start, b_end))
        })
}

fn minutes(m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap()
}

fn minute_input(class_id: &str, day: DayOfWeek, (start, end): (u32, u32)) -> ScheduleEntryInput {
    ScheduleEntryInput {
        class_id: class_id.into(),
        subject_id: "math".into(),
        teacher_id: "teacher-1".into(),
        day_of_week: day,
        range: TimeRange::new(minutes(start), minutes(end)).unwrap(),
        room: None,
    }
}

fn check_after_insert(first: ScheduleEntryInput, second: ScheduleEntryInput) -> bool {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let guard = guard();
        guard.create_entry(&first).await.unwrap();
        guard.check_create(&second).await.is_ok()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn overlapping_ranges_always_conflict((a, b) in overlapping_pair_strategy()) {
        let ok = check_after_insert(
            minute_input("C1", DayOfWeek::MONDAY, a),
            minute_input("C1", DayOfWeek::MONDAY, b),
        );
        prop_assert!(!ok);
    }

    #[test]
    fn disjoint_ranges_never_conflict(a in minute_range_strategy(), b in minute_range_strategy()) {
        prop_assume!(a.1 < b.0 || b.1 < a.0);
        let ok = check_after_insert(
            minute_input("C1", DayOfWeek::MONDAY, a),
            minute_input("C1", DayOfWeek::MONDAY, b),
        );
        prop_assert!(ok);
    }

    #[test]
    fn different_class_or_day_never_conflicts(
        a in minute_range_strategy(),
        b in minute_range_strategy(),
        day_a in 0i64..7,
        day_b in 0i64..7,
        same_class in any::<bool>(),
    ) {
        prop_assume!(!same_class || day_a != day_b);
        let class_b = if same_class { "C1" } else { "C2" };
        let ok = check_after_insert(
            minute_input("C1", DayOfWeek::new(day_a).unwrap(), a),
            minute_input(class_b, DayOfWeek::new(day_b).unwrap(), b),
        );
        prop_assert!(ok);
    }

    #[test]
    fn time_range_overlap_is_symmetric(a in minute_range_strategy(), b in minute_range_strategy()) {
        let ra = TimeRange::new(minutes(a.0), minutes(a.1)).unwrap();
        let rb = TimeRange::new(minutes(b.0), minutes(b.1)).unwrap();
        prop_assert_eq!(ra.overlaps(&rb), rb.overlaps(&ra));
    }
}
