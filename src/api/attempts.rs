use axum::{routing::get, routing::post, Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{can_manage_exam, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::{elapsed_minutes, format_primitive, primitive_now_utc};
use crate::db::models::{Attempt, Exam};
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::repositories;
use crate::schemas::attempt::{
    attempt_to_response, AttemptResponse, AttemptScoreResponse, AttemptStartResponse,
    AttemptSubmitRequest, ManualGradeRequest,
};
use crate::services::{availability, grading, statistics, EngineError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id/attempts", post(start_attempt))
        .route("/:exam_id/attempts/:attempt_id", get(get_attempt))
        .route("/:exam_id/attempts/:attempt_id/submit", post(submit_attempt))
        .route("/:exam_id/attempts/:attempt_id/grade", post(grade_attempt))
}

async fn start_attempt(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<AttemptStartResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let enrolled = repositories::courses::is_enrolled(state.db(), &exam.course_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check enrollment"))?;
    if !enrolled {
        return Err(EngineError::Forbidden("only enrolled students can attempt this exam").into());
    }

    let now = primitive_now_utc();
    match availability::resolve(exam.status, exam.close_at, now) {
        ExamStatus::Published => {}
        ExamStatus::Draft => return Err(ApiError::Forbidden("Access denied")),
        ExamStatus::Closed => {
            return Err(EngineError::Exhausted("exam has closed".to_string()).into())
        }
    }
    if now < exam.open_at {
        let summary = availability::summarize(exam.status, exam.open_at, exam.close_at, now);
        return Err(EngineError::Exhausted(format!("exam is not open yet; {}", summary.detail))
            .into());
    }

    // Re-entry into a running attempt is idempotent: hand the same attempt
    // back instead of burning one of the student's tries.
    let existing = repositories::attempts::find_in_progress(state.db(), &exam_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;
    if let Some(attempt) = existing {
        return Ok(Json(AttemptStartResponse {
            attempt_id: attempt.id,
            attempt_number: attempt.attempt_number,
            duration_minutes: exam.duration_minutes,
            started_at: format_primitive(attempt.started_at),
            resumed: true,
        }));
    }

    let used = repositories::attempts::count_for_student(state.db(), &exam_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    if used >= exam.max_attempts as i64 {
        return Err(EngineError::Exhausted(format!(
            "no attempts remaining: {used} of {} used",
            exam.max_attempts
        ))
        .into());
    }

    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let attempt_id = Uuid::new_v4().to_string();
    let attempt_number = (used + 1) as i32;
    let created = repositories::attempts::create(
        state.db(),
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            exam_id: &exam_id,
            student_id: &user.id,
            attempt_number,
            answers: grading::seed_records(&questions),
            started_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attempt"))?;

    if !created {
        // Unique (exam, student, attempt_number) arbitration: another start
        // for the same student won the race.
        return Err(EngineError::InvalidState(
            "another attempt was started concurrently; retry".to_string(),
        )
        .into());
    }

    metrics::counter!("attempts_started_total").increment(1);
    tracing::info!(
        student_id = %user.id,
        student = %user.name,
        exam_id = %exam_id,
        attempt_number,
        action = "attempt_start",
        "Attempt started"
    );

    Ok(Json(AttemptStartResponse {
        attempt_id,
        attempt_number,
        duration_minutes: exam.duration_minutes,
        started_at: format_primitive(now),
        resumed: false,
    }))
}

async fn submit_attempt(
    axum::extract::Path((exam_id, attempt_id)): axum::extract::Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
    Json(payload): Json<AttemptSubmitRequest>,
) -> Result<Json<AttemptScoreResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let attempt = fetch_attempt(&state, &exam_id, &attempt_id).await?;

    if attempt.student_id != user.id {
        return Err(ApiError::Forbidden("You can only submit your own attempt"));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(EngineError::InvalidState(format!(
            "attempt {} was already submitted; its status is {:?}",
            attempt.attempt_number, attempt.status
        ))
        .into());
    }

    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let submitted: Vec<grading::SubmittedAnswer> = payload
        .answers
        .into_iter()
        .map(|answer| grading::SubmittedAnswer {
            question_id: answer.question_id,
            value: answer.value,
        })
        .collect();

    let now = primitive_now_utc();
    let mut records = attempt.answers.0.clone();
    let raw_score = grading::apply_submission(&questions, &submitted, &mut records);
    let percentage = grading::percentage(raw_score, exam.total_weight);
    let status = if grading::requires_manual_review(&questions) {
        AttemptStatus::Completed
    } else {
        AttemptStatus::Graded
    };

    let applied = repositories::attempts::record_submission(
        state.db(),
        &attempt_id,
        repositories::attempts::RecordSubmission {
            answers: records,
            raw_score,
            percentage,
            status,
            submitted_at: now,
            elapsed_minutes: elapsed_minutes(attempt.started_at, now),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record submission"))?;

    if !applied {
        return Err(EngineError::InvalidState(
            "attempt was submitted concurrently; scores are unchanged".to_string(),
        )
        .into());
    }

    metrics::counter!("attempts_submitted_total").increment(1);
    if status == AttemptStatus::Graded {
        metrics::counter!("attempts_graded_total").increment(1);
        refresh_statistics(&state, &exam).await?;
    }

    tracing::info!(
        student_id = %user.id,
        exam_id = %exam_id,
        attempt_id = %attempt_id,
        ?status,
        action = "attempt_submit",
        "Attempt submitted"
    );

    Ok(Json(AttemptScoreResponse { attempt_id, raw_score, percentage, status }))
}

async fn grade_attempt(
    axum::extract::Path((exam_id, attempt_id)): axum::extract::Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<AttemptScoreResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only grade attempts on your own exams"));
    }

    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = fetch_attempt(&state, &exam_id, &attempt_id).await?;
    if attempt.status != AttemptStatus::Completed {
        return Err(EngineError::InvalidState(format!(
            "attempt {} is not awaiting review; its status is {:?}",
            attempt.attempt_number, attempt.status
        ))
        .into());
    }

    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let grades: Vec<grading::ManualScore> = payload
        .scores
        .into_iter()
        .map(|entry| grading::ManualScore {
            question_id: entry.question_id,
            score: entry.score,
            comment: entry.comment,
        })
        .collect();

    let mut records = attempt.answers.0.clone();
    let raw_score = grading::apply_manual_scores(&questions, &mut records, &grades)?;
    let percentage = grading::percentage(raw_score, exam.total_weight);

    let applied = repositories::attempts::record_manual_grades(
        state.db(),
        &attempt_id,
        repositories::attempts::RecordManualGrades {
            answers: records,
            raw_score,
            percentage,
            feedback: payload.feedback,
            graded_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record manual grades"))?;

    if !applied {
        return Err(EngineError::InvalidState(
            "attempt was graded concurrently; scores are unchanged".to_string(),
        )
        .into());
    }

    metrics::counter!("attempts_graded_total").increment(1);
    refresh_statistics(&state, &exam).await?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam_id,
        attempt_id = %attempt_id,
        action = "attempt_grade",
        "Attempt graded"
    );

    Ok(Json(AttemptScoreResponse {
        attempt_id,
        raw_score,
        percentage,
        status: AttemptStatus::Graded,
    }))
}

async fn get_attempt(
    axum::extract::Path((exam_id, attempt_id)): axum::extract::Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let attempt = fetch_attempt(&state, &exam_id, &attempt_id).await?;

    if attempt.student_id != user.id && !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("Access denied"));
    }

    Ok(Json(attempt_to_response(&attempt)))
}

/// Full recompute from the current attempt collection, persisted onto the
/// exam row. Called whenever an attempt reaches `graded`.
async fn refresh_statistics(state: &AppState, exam: &Exam) -> Result<(), ApiError> {
    let attempts = repositories::attempts::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempts"))?;

    let stats = statistics::recompute(&attempts, exam.passing_score);
    repositories::exams::update_statistics(state.db(), &exam.id, &stats, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store statistics"))?;

    Ok(())
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    exam.ok_or_else(|| EngineError::NotFound("exam").into())
}

async fn fetch_attempt(
    state: &AppState,
    exam_id: &str,
    attempt_id: &str,
) -> Result<Attempt, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;

    match attempt {
        Some(attempt) if attempt.exam_id == exam_id => Ok(attempt),
        _ => Err(EngineError::NotFound("attempt").into()),
    }
}
