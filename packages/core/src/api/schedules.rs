//! Timetable endpoints.
//!
//! Routes:
//! - `GET    /schedules`        : filtered, paginated listing
//! - `POST   /schedules`        : create an entry (conflict-checked)
//! - `POST   /schedules/check`  : dry-run conflict check, nothing is written
//! - `GET    /schedules/:id`    : fetch one entry
//! - `PUT    /schedules/:id`    : replace an entry (conflict-checked)
//! - `DELETE /schedules/:id`    : remove an entry; idempotent

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::metrics::AppMetrics;
use crate::schedule::{
    format_time, DayOfWeek, Page, PageRequest, ScheduleConflict, ScheduleConflictGuard,
    ScheduleEntry, ScheduleEntryDraft, ScheduleError, ScheduleFilter, ValidationError,
};

/// Shared state type for the schedules routes.
pub type SchedulesState = Arc<SchedulesApiState>;

#[derive(Clone)]
pub struct SchedulesApiState {
    pub guard: Arc<ScheduleConflictGuard>,
    pub metrics: Arc<AppMetrics>,
}

type ApiError = (StatusCode, Json<Value>);

pub fn create_schedules_router(state: SchedulesState) -> Router {
    Router::new()
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/check", post(check_schedule))
        .route(
            "/schedules/:id",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
        .with_state(state)
}

// ---- Request / response shapes ----

#[derive(Debug, Default, Deserialize)]
pub struct ListSchedulesQuery {
    pub class_id: Option<String>,
    pub day_of_week: Option<i64>,
    pub teacher_id: Option<String>,
    pub subject_id: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListSchedulesQuery {
    fn filter(&self) -> Result<ScheduleFilter, ValidationError> {
        let day_of_week = self.day_of_week.map(DayOfWeek::new).transpose()?;
        Ok(ScheduleFilter {
            class_id: non_blank(&self.class_id),
            day_of_week,
            teacher_id: non_blank(&self.teacher_id),
            subject_id: non_blank(&self.subject_id),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
pub struct CheckScheduleRequest {
    #[serde(flatten)]
    pub entry: ScheduleEntryDraft,
    /// Set when checking an edit of an existing entry.
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleWriteResponse {
    pub message: &'static str,
    pub entry: ScheduleEntry,
}

/// One clashing slot as reported in a `409` body.
#[derive(Debug, Serialize)]
struct ConflictSlot {
    id: i64,
    day_of_week: DayOfWeek,
    start_time: String,
    end_time: String,
    room: Option<String>,
}

impl From<&ScheduleEntry> for ConflictSlot {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            id: entry.id,
            day_of_week: entry.day_of_week,
            start_time: format_time(entry.start_time),
            end_time: format_time(entry.end_time),
            room: entry.room.clone(),
        }
    }
}

// ---- Error mapping ----

fn error_body(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({ "error": code, "message": message.into() })),
    )
}

fn conflict_body(conflict: &ScheduleConflict) -> ApiError {
    let slots: Vec<ConflictSlot> = conflict.conflicting.iter().map(ConflictSlot::from).collect();
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": "schedule_conflict",
            "message": conflict.message(),
            "day_of_week": conflict.day_of_week,
            "conflicts": slots,
        })),
    )
}

impl SchedulesApiState {
    fn reject(&self, err: ScheduleError) -> ApiError {
        match err {
            ScheduleError::Validation(err) => self.invalid(err),
            ScheduleError::Conflict(conflict) => {
                self.metrics.conflicts_total.inc();
                conflict_body(&conflict)
            }
            ScheduleError::NotFound(id) => error_body(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Schedule entry {} not found", id),
            ),
            ScheduleError::Store(err) => {
                tracing::error!("Timetable store failure: {}", err);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_unavailable",
                    "The timetable could not be read or written",
                )
            }
        }
    }

    fn invalid(&self, err: ValidationError) -> ApiError {
        self.metrics.validation_failures_total.inc();
        error_body(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
    }

    fn malformed(&self, message: String) -> ApiError {
        self.metrics.validation_failures_total.inc();
        error_body(StatusCode::BAD_REQUEST, "invalid_request", message)
    }
}

// ---- Handlers ----

/// `GET /schedules`: entries ordered by day, start time, id.
pub async fn list_schedules(
    State(state): State<SchedulesState>,
    query: Result<Query<ListSchedulesQuery>, QueryRejection>,
) -> Result<Json<Page<ScheduleEntry>>, ApiError> {
    let Query(query) = query.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let filter = query.filter().map_err(|err| state.invalid(err))?;
    let page = PageRequest::new(query.page, query.per_page);

    let entries = state
        .guard
        .list_entries(&filter, page)
        .await
        .map_err(|err| state.reject(err))?;

    Ok(Json(entries))
}

/// `POST /schedules`: create an entry unless it clashes with the class's day.
pub async fn create_schedule(
    State(state): State<SchedulesState>,
    payload: Result<Json<ScheduleEntryDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ScheduleWriteResponse>), ApiError> {
    let Json(draft) = payload.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let candidate = draft.validate().map_err(|err| state.invalid(err))?;

    let entry = state
        .guard
        .create_entry(&candidate)
        .await
        .map_err(|err| state.reject(err))?;
    state.metrics.entries_created_total.inc();

    Ok((
        StatusCode::CREATED,
        Json(ScheduleWriteResponse {
            message: "Schedule entry created",
            entry,
        }),
    ))
}

/// `POST /schedules/check`: report whether a slot is free without saving.
pub async fn check_schedule(
    State(state): State<SchedulesState>,
    payload: Result<Json<CheckScheduleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let candidate = request.entry.validate().map_err(|err| state.invalid(err))?;

    let checked = match request.exclude_id {
        Some(id) => state.guard.check_update(id, &candidate).await,
        None => state.guard.check_create(&candidate).await,
    };
    checked.map_err(|err| state.reject(err))?;

    Ok(Json(json!({ "ok": true })))
}

/// `GET /schedules/:id`
pub async fn get_schedule(
    State(state): State<SchedulesState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ScheduleEntry>, ApiError> {
    let Path(id) = id.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let entry = state
        .guard
        .get_entry(id)
        .await
        .map_err(|err| state.reject(err))?;
    Ok(Json(entry))
}

/// `PUT /schedules/:id`: full replacement; the entry never clashes with itself.
pub async fn update_schedule(
    State(state): State<SchedulesState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ScheduleEntryDraft>, JsonRejection>,
) -> Result<Json<ScheduleWriteResponse>, ApiError> {
    let Path(id) = id.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let Json(draft) = payload.map_err(|rejection| state.malformed(rejection.body_text()))?;
    let candidate = draft.validate().map_err(|err| state.invalid(err))?;

    let entry = state
        .guard
        .update_entry(id, &candidate)
        .await
        .map_err(|err| state.reject(err))?;
    state.metrics.entries_updated_total.inc();

    Ok(Json(ScheduleWriteResponse {
        message: "Schedule entry updated",
        entry,
    }))
}

/// `DELETE /schedules/:id`: `204` whether or not the entry existed.
pub async fn delete_schedule(
    State(state): State<SchedulesState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(|rejection| state.malformed(rejection.body_text()))?;
    state
        .guard
        .delete_entry(id)
        .await
        .map_err(|err| state.reject(err))?;
    state.metrics.entries_deleted_total.inc();

    Ok(StatusCode::NO_CONTENT)
}
