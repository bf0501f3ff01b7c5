use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuestionOption};
use crate::db::types::QuestionKind;

const COLUMNS: &str =
    "id, exam_id, kind, prompt, options, correct_value, weight, display_order, created_at";

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: &'a str,
    pub(crate) options: Vec<QuestionOption>,
    pub(crate) correct_value: Option<&'a str>,
    pub(crate) weight: f64,
    pub(crate) display_order: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, kind, prompt, options, correct_value, weight, display_order, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.kind)
    .bind(params.prompt)
    .bind(Json(params.options))
    .bind(params.correct_value)
    .bind(params.weight)
    .bind(params.display_order)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY display_order ASC, created_at ASC"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn delete_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM questions WHERE exam_id = $1").bind(exam_id).execute(executor).await?;
    Ok(())
}
