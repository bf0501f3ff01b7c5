use axum::{routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::course::{CourseSyncRequest, CourseSyncResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/sync", post(sync_course))
}

/// Upsert the roster service's view of one course: title, owning instructor
/// and the full enrolled-student set.
async fn sync_course(
    CurrentAdmin(admin): CurrentAdmin,
    state: axum::extract::State<AppState>,
    Json(payload): Json<CourseSyncRequest>,
) -> Result<Json<CourseSyncResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let course = repositories::courses::upsert(
        &mut *tx,
        repositories::courses::UpsertCourse {
            id: &payload.id,
            title: &payload.title,
            instructor_id: &payload.instructor_id,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to upsert course"))?;

    repositories::courses::replace_roster(&mut tx, &course.id, &payload.student_ids, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to replace roster"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let enrolled_count = repositories::courses::count_enrolled(state.db(), &course.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count enrollments"))?;

    tracing::info!(
        user_id = %admin.id,
        course_id = %course.id,
        enrolled_count,
        action = "course_sync",
        "Course roster synced"
    );

    Ok(Json(CourseSyncResponse {
        id: course.id,
        title: course.title,
        instructor_id: course.instructor_id,
        enrolled_count,
    }))
}
