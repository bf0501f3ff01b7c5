use axum::{extract::Query, routing::get, routing::post, Json, Router};
use serde::Deserialize;
use time::Duration;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Exam;
use crate::repositories;
use crate::tasks::reconcile;

#[derive(Debug, Deserialize)]
pub(crate) struct ReminderWindowQuery {
    #[serde(default)]
    hours: Option<i64>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/reconcile", post(run_reconcile))
        .route("/closing-soon", get(closing_soon))
        .route("/opening-soon", get(opening_soon))
}

async fn run_reconcile(
    CurrentAdmin(admin): CurrentAdmin,
    state: axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reconciled = reconcile::run(&state)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reconcile exam states"))?;

    tracing::info!(user_id = %admin.id, reconciled, action = "reconcile", "Manual reconcile run");

    Ok(Json(serde_json::json!({ "reconciled": reconciled })))
}

async fn closing_soon(
    Query(params): Query<ReminderWindowQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    state: axum::extract::State<AppState>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let now = primitive_now_utc();
    let until = now + Duration::hours(reminder_hours(&state, params.hours));

    let exams = repositories::exams::list_closing_within(state.db(), now, until)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list closing exams"))?;

    Ok(Json(exams.iter().map(reminder_entry).collect()))
}

async fn opening_soon(
    Query(params): Query<ReminderWindowQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    state: axum::extract::State<AppState>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let now = primitive_now_utc();
    let until = now + Duration::hours(reminder_hours(&state, params.hours));

    let exams = repositories::exams::list_opening_within(state.db(), now, until)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list opening exams"))?;

    Ok(Json(exams.iter().map(reminder_entry).collect()))
}

fn reminder_hours(state: &AppState, requested: Option<i64>) -> i64 {
    match requested {
        Some(hours) if hours > 0 => hours,
        _ => state.settings().scheduler().reminder_window_hours,
    }
}

fn reminder_entry(exam: &Exam) -> serde_json::Value {
    serde_json::json!({
        "exam_id": exam.id,
        "course_id": exam.course_id,
        "instructor_id": exam.instructor_id,
        "title": exam.title,
        "open_at": format_primitive(exam.open_at),
        "close_at": format_primitive(exam.close_at),
    })
}
