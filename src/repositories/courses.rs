use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Course;

const COLUMNS: &str = "id, title, instructor_id, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COLUMNS} FROM courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct UpsertCourse<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) instructor_id: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

/// Mirror write fed by the roster service. Idempotent per course id.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertCourse<'_>,
) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "INSERT INTO courses (id, title, instructor_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4)
         ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                instructor_id = EXCLUDED.instructor_id,
                updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.instructor_id)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn replace_roster(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    course_id: &str,
    student_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM enrollments WHERE course_id = $1")
        .bind(course_id)
        .execute(&mut **tx)
        .await?;

    for student_id in student_ids {
        sqlx::query(
            "INSERT INTO enrollments (course_id, student_id, enrolled_at)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(course_id)
        .bind(student_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub(crate) async fn is_enrolled(
    executor: impl sqlx::PgExecutor<'_>,
    course_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM enrollments WHERE course_id = $1 AND student_id = $2",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await?;

    Ok(found.is_some())
}

pub(crate) async fn count_enrolled(
    executor: impl sqlx::PgExecutor<'_>,
    course_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(executor)
        .await
}
