use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::services::statistics::ExamStatistics;

pub(crate) const COLUMNS: &str = "\
    id, course_id, instructor_id, title, description, open_at, close_at, \
    duration_minutes, max_attempts, show_answers, shuffle_questions, \
    shuffle_options, passing_score, total_weight, status, graded_attempts, \
    average_percentage, passed_count, failed_count, created_at, updated_at, \
    published_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExamSummaryRow {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) open_at: PrimitiveDateTime,
    pub(crate) close_at: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) total_weight: f64,
    pub(crate) status: ExamStatus,
    pub(crate) question_count: i64,
    pub(crate) pending_review_count: i64,
    pub(crate) total_count: i64,
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) instructor_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) open_at: PrimitiveDateTime,
    pub(crate) close_at: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) show_answers: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) passing_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, course_id, instructor_id, title, description, open_at, close_at,
            duration_minutes, max_attempts, show_answers, shuffle_questions,
            shuffle_options, passing_score, status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$15)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.instructor_id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.open_at)
    .bind(params.close_at)
    .bind(params.duration_minutes)
    .bind(params.max_attempts)
    .bind(params.show_answers)
    .bind(params.shuffle_questions)
    .bind(params.shuffle_options)
    .bind(params.passing_score)
    .bind(ExamStatus::Draft)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) struct UpdateExam<'a> {
    pub(crate) title: Option<&'a str>,
    pub(crate) description: Option<&'a str>,
    pub(crate) open_at: Option<PrimitiveDateTime>,
    pub(crate) close_at: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) show_answers: Option<bool>,
    pub(crate) shuffle_questions: Option<bool>,
    pub(crate) shuffle_options: Option<bool>,
    pub(crate) passing_score: Option<f64>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: UpdateExam<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            open_at = COALESCE($3, open_at),
            close_at = COALESCE($4, close_at),
            duration_minutes = COALESCE($5, duration_minutes),
            max_attempts = COALESCE($6, max_attempts),
            show_answers = COALESCE($7, show_answers),
            shuffle_questions = COALESCE($8, shuffle_questions),
            shuffle_options = COALESCE($9, shuffle_options),
            passing_score = COALESCE($10, passing_score),
            updated_at = $11
         WHERE id = $12",
    )
    .bind(params.title)
    .bind(params.description)
    .bind(params.open_at)
    .bind(params.close_at)
    .bind(params.duration_minutes)
    .bind(params.max_attempts)
    .bind(params.show_answers)
    .bind(params.shuffle_questions)
    .bind(params.shuffle_options)
    .bind(params.passing_score)
    .bind(params.updated_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) async fn publish(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, published_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Draft)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn close(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
    )
    .bind(ExamStatus::Closed)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Published)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_total_weight(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    total_weight: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET total_weight = $1, updated_at = $2 WHERE id = $3")
        .bind(total_weight)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn update_statistics(
    pool: &PgPool,
    id: &str,
    stats: &ExamStatistics,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams SET graded_attempts = $1, average_percentage = $2,
            passed_count = $3, failed_count = $4, updated_at = $5
         WHERE id = $6",
    )
    .bind(stats.graded_attempts)
    .bind(stats.average_percentage)
    .bind(stats.passed_count)
    .bind(stats.failed_count)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) struct ListExamsParams<'a> {
    pub(crate) instructor_id: Option<&'a str>,
    pub(crate) enrolled_student_id: Option<&'a str>,
    pub(crate) course_id: Option<&'a str>,
    pub(crate) status: Option<ExamStatus>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

pub(crate) async fn list_summaries(
    pool: &PgPool,
    params: ListExamsParams<'_>,
) -> Result<Vec<ExamSummaryRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT e.id, e.course_id, e.title, e.open_at, e.close_at,
                e.duration_minutes, e.max_attempts, e.total_weight, e.status,
                COALESCE(qc.cnt, 0) AS question_count,
                COALESCE(pr.cnt, 0) AS pending_review_count,
                COUNT(*) OVER() AS total_count
         FROM exams e
         LEFT JOIN (SELECT exam_id, COUNT(*) AS cnt FROM questions GROUP BY exam_id) qc
             ON qc.exam_id = e.id
         LEFT JOIN (
             SELECT exam_id, COUNT(*) AS cnt FROM attempts WHERE status = ",
    );
    builder.push_bind(AttemptStatus::Completed);
    builder.push(" GROUP BY exam_id) pr ON pr.exam_id = e.id WHERE TRUE");

    if let Some(instructor_id) = params.instructor_id {
        builder.push(" AND e.instructor_id = ");
        builder.push_bind(instructor_id);
    }

    if let Some(student_id) = params.enrolled_student_id {
        // Students only see published/closed exams of courses they belong to.
        builder.push(
            " AND e.course_id IN (SELECT course_id FROM enrollments WHERE student_id = ",
        );
        builder.push_bind(student_id);
        builder.push(") AND e.status IN (");
        builder.push_bind(ExamStatus::Published);
        builder.push(", ");
        builder.push_bind(ExamStatus::Closed);
        builder.push(")");
    }

    if let Some(course_id) = params.course_id {
        builder.push(" AND e.course_id = ");
        builder.push_bind(course_id);
    }

    if let Some(status) = params.status {
        builder.push(" AND e.status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY e.close_at DESC, e.created_at DESC OFFSET ");
    builder.push_bind(params.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(params.limit.clamp(1, 1000));

    builder.build_query_as::<ExamSummaryRow>().fetch_all(pool).await
}

/// Flip every published exam whose close time has passed. One independent
/// write per exam id; running with nothing to do changes nothing.
pub(crate) async fn close_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, updated_at = $2 WHERE status = $3 AND close_at < $2",
    )
    .bind(ExamStatus::Closed)
    .bind(now)
    .bind(ExamStatus::Published)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list_closing_within(
    pool: &PgPool,
    now: PrimitiveDateTime,
    until: PrimitiveDateTime,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE status = $1 AND close_at >= $2 AND close_at <= $3
         ORDER BY close_at ASC"
    ))
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(until)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_opening_within(
    pool: &PgPool,
    now: PrimitiveDateTime,
    until: PrimitiveDateTime,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE status = $1 AND open_at >= $2 AND open_at <= $3
         ORDER BY open_at ASC"
    ))
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(until)
    .fetch_all(pool)
    .await
}
