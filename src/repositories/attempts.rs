use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{AnswerRecord, Attempt};
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, answers, raw_score, percentage, \
    status, started_at, submitted_at, elapsed_minutes, feedback, created_at, \
    updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) started_at: PrimitiveDateTime,
}

/// Insert a new attempt. The unique (exam_id, student_id, attempt_number)
/// constraint arbitrates concurrent starts: the loser observes `false`.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, exam_id, student_id, attempt_number, answers, status,
            started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$7,$7)
        ON CONFLICT DO NOTHING",
    )
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.attempt_number)
    .bind(Json(params.answers))
    .bind(AttemptStatus::InProgress)
    .bind(params.started_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE exam_id = $1 AND student_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND student_id = $2")
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE exam_id = $1 AND student_id = $2
         ORDER BY attempt_number ASC"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE exam_id = $1
         ORDER BY student_id ASC, attempt_number ASC"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

/// Attempts that freeze the question list: anything past `in_progress`.
pub(crate) async fn count_settled_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND status <> $2")
        .bind(exam_id)
        .bind(AttemptStatus::InProgress)
        .fetch_one(executor)
        .await
}

pub(crate) struct RecordSubmission {
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) status: AttemptStatus,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) elapsed_minutes: i32,
}

/// Persist a submission. Guarded on the attempt still being `in_progress`,
/// so a concurrent double-submit loses by observing `false`.
pub(crate) async fn record_submission(
    pool: &PgPool,
    id: &str,
    update: RecordSubmission,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET answers = $1, raw_score = $2, percentage = $3,
            status = $4, submitted_at = $5, elapsed_minutes = $6, updated_at = $5
         WHERE id = $7 AND status = $8",
    )
    .bind(Json(update.answers))
    .bind(update.raw_score)
    .bind(update.percentage)
    .bind(update.status)
    .bind(update.submitted_at)
    .bind(update.elapsed_minutes)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) struct RecordManualGrades {
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: PrimitiveDateTime,
}

/// Persist a manual-grading merge. Guarded on the attempt awaiting review.
pub(crate) async fn record_manual_grades(
    pool: &PgPool,
    id: &str,
    update: RecordManualGrades,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET answers = $1, raw_score = $2, percentage = $3,
            status = $4, feedback = COALESCE($5, feedback), updated_at = $6
         WHERE id = $7 AND status = $8",
    )
    .bind(Json(update.answers))
    .bind(update.raw_score)
    .bind(update.percentage)
    .bind(AttemptStatus::Graded)
    .bind(update.feedback)
    .bind(update.graded_at)
    .bind(id)
    .bind(AttemptStatus::Completed)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
