//! SQLite-backed timetable repository.
//!
//! All schedule read/write SQL lives here. Writes run inside a
//! `BEGIN IMMEDIATE` transaction that re-checks the overlap rule before
//! touching the row, and the schema's overlap triggers (see [`crate::db`])
//! reject anything that slips past.
//!
//! Times are stored as zero-padded `HH:MM:SS` text, so the range predicates
//! compare lexically.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::db::OVERLAP_TRIGGER_MESSAGE;
use crate::schedule::{
    format_time, parse_time, DayOfWeek, OverlapQuery, Page, PageRequest, ScheduleEntry,
    ScheduleEntryInput, ScheduleFilter, StoreError, StoreResult, TimetableStore,
};

const ENTRY_COLUMNS: &str =
    "id, class_id, subject_id, teacher_id, day_of_week, start_time, end_time, room, created_at, updated_at";

/// Repository for reading and writing schedule entries to SQLite.
#[derive(Clone)]
pub struct SqliteTimetable {
    pool: SqlitePool,
}

impl SqliteTimetable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entry_from_row(row: &SqliteRow) -> StoreResult<ScheduleEntry> {
    let id: i64 = row.try_get("id")?;
    let day: i64 = row.try_get("day_of_week")?;
    let start: String = row.try_get("start_time")?;
    let end: String = row.try_get("end_time")?;

    let day_of_week = DayOfWeek::new(day)
        .map_err(|e| StoreError::Corrupt(format!("entry {}: {}", id, e)))?;
    let start_time = parse_time(&start)
        .ok_or_else(|| StoreError::Corrupt(format!("entry {}: bad start_time {:?}", id, start)))?;
    let end_time = parse_time(&end)
        .ok_or_else(|| StoreError::Corrupt(format!("entry {}: bad end_time {:?}", id, end)))?;

    Ok(ScheduleEntry {
        id,
        class_id: row.try_get("class_id")?,
        subject_id: row.try_get("subject_id")?,
        teacher_id: row.try_get("teacher_id")?,
        day_of_week,
        start_time,
        end_time,
        room: row.try_get("room")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entries_from_rows(rows: &[SqliteRow]) -> StoreResult<Vec<ScheduleEntry>> {
    rows.iter().map(entry_from_row).collect()
}

/// Append the optional listing filters as bound predicates.
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ScheduleFilter) {
    builder.push(" WHERE 1=1");
    if let Some(class_id) = &filter.class_id {
        builder.push(" AND class_id = ").push_bind(class_id.clone());
    }
    if let Some(day) = filter.day_of_week {
        builder.push(" AND day_of_week = ").push_bind(i64::from(day));
    }
    if let Some(teacher_id) = &filter.teacher_id {
        builder.push(" AND teacher_id = ").push_bind(teacher_id.clone());
    }
    if let Some(subject_id) = &filter.subject_id {
        builder.push(" AND subject_id = ").push_bind(subject_id.clone());
    }
}

/// A trigger abort means the invariant was enforced by the database.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.message().contains(OVERLAP_TRIGGER_MESSAGE) {
            return StoreError::Overlap(Vec::new());
        }
    }
    StoreError::Database(err)
}

async fn overlapping_on(
    conn: &mut SqliteConnection,
    query: &OverlapQuery,
) -> StoreResult<Vec<ScheduleEntry>> {
    let sql = format!(
        "SELECT {} FROM schedule_entries
         WHERE class_id = ?
           AND day_of_week = ?
           AND start_time <= ?
           AND end_time >= ?
           AND (? IS NULL OR id <> ?)
         ORDER BY start_time ASC, id ASC",
        ENTRY_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(&query.class_id)
        .bind(i64::from(query.day_of_week))
        .bind(format_time(query.range.end()))
        .bind(format_time(query.range.start()))
        .bind(query.exclude_id)
        .bind(query.exclude_id)
        .fetch_all(&mut *conn)
        .await?;

    entries_from_rows(&rows)
}

async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<ScheduleEntry>> {
    let sql = format!("SELECT {} FROM schedule_entries WHERE id = ?", ENTRY_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(entry_from_row).transpose()
}

/// A write that must run under SQLite's write lock.
enum Write {
    Insert(ScheduleEntryInput),
    Update(i64, ScheduleEntryInput),
}

async fn insert_row(conn: &mut SqliteConnection, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
    let conflicting = overlapping_on(&mut *conn, &input.overlap_query(None)).await?;
    if !conflicting.is_empty() {
        return Err(StoreError::Overlap(conflicting));
    }

    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO schedule_entries
         (class_id, subject_id, teacher_id, day_of_week, start_time, end_time, room, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.class_id)
    .bind(&input.subject_id)
    .bind(&input.teacher_id)
    .bind(i64::from(input.day_of_week))
    .bind(format_time(input.range.start()))
    .bind(format_time(input.range.end()))
    .bind(&input.room)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;

    let id = result.last_insert_rowid();
    fetch_by_id(&mut *conn, id)
        .await?
        .ok_or(StoreError::NotFound(id))
}

async fn update_row(
    conn: &mut SqliteConnection,
    id: i64,
    input: &ScheduleEntryInput,
) -> StoreResult<ScheduleEntry> {
    if fetch_by_id(&mut *conn, id).await?.is_none() {
        return Err(StoreError::NotFound(id));
    }

    let conflicting = overlapping_on(&mut *conn, &input.overlap_query(Some(id))).await?;
    if !conflicting.is_empty() {
        return Err(StoreError::Overlap(conflicting));
    }

    sqlx::query(
        "UPDATE schedule_entries
         SET class_id = ?, subject_id = ?, teacher_id = ?, day_of_week = ?,
             start_time = ?, end_time = ?, room = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&input.class_id)
    .bind(&input.subject_id)
    .bind(&input.teacher_id)
    .bind(i64::from(input.day_of_week))
    .bind(format_time(input.range.start()))
    .bind(format_time(input.range.end()))
    .bind(&input.room)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;

    fetch_by_id(&mut *conn, id)
        .await?
        .ok_or(StoreError::NotFound(id))
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        tracing::warn!("Rollback of timetable write failed: {}", err);
    }
}

/// Apply `write` inside `BEGIN IMMEDIATE`. The overlap re-check and the write
/// both happen under the database write lock; a competing writer blocks on
/// the busy timeout and then sees the committed row.
async fn write_locked(pool: SqlitePool, write: Write) -> StoreResult<ScheduleEntry> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let applied = match &write {
        Write::Insert(input) => insert_row(&mut *conn, input).await,
        Write::Update(id, input) => update_row(&mut *conn, *id, input).await,
    };

    match applied {
        Ok(entry) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(entry),
            Err(err) => {
                rollback(&mut *conn).await;
                Err(map_write_error(err))
            }
        },
        Err(err) => {
            rollback(&mut *conn).await;
            Err(err)
        }
    }
}

impl SqliteTimetable {
    /// The transaction runs on its own task so a dropped request cannot hand
    /// the connection back to the pool with the transaction still open.
    async fn run_write(&self, write: Write) -> StoreResult<ScheduleEntry> {
        tokio::spawn(write_locked(self.pool.clone(), write))
            .await
            .map_err(|err| StoreError::Interrupted(err.to_string()))?
    }
}

#[async_trait]
impl TimetableStore for SqliteTimetable {
    async fn find_overlapping(&self, query: &OverlapQuery) -> StoreResult<Vec<ScheduleEntry>> {
        let mut conn = self.pool.acquire().await?;
        overlapping_on(&mut *conn, query).await
    }

    async fn insert(&self, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        self.run_write(Write::Insert(input.clone())).await
    }

    async fn update(&self, id: i64, input: &ScheduleEntryInput) -> StoreResult<ScheduleEntry> {
        self.run_write(Write::Update(id, input.clone())).await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM schedule_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Delete of unknown schedule entry {} ignored", id);
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Option<ScheduleEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut *conn, id).await
    }

    async fn list(&self, filter: &ScheduleFilter, page: PageRequest) -> StoreResult<Page<ScheduleEntry>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS cnt FROM schedule_entries");
        push_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("cnt")?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM schedule_entries", ENTRY_COLUMNS));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY day_of_week ASC, start_time ASC, id ASC LIMIT ")
            .push_bind(page.per_page() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(Page {
            items: entries_from_rows(&rows)?,
            total: total.max(0) as u64,
            page: page.page(),
            per_page: page.per_page(),
        })
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}
