use std::collections::HashMap;

use axum::{extract::Query, routing::get, routing::post, Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{can_manage_exam, CurrentInstructor, CurrentUser};
use crate::api::pagination::PaginatedResponse;
use crate::core::security::UserRole;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::{Attempt, Exam, Question, QuestionOption};
use crate::db::types::{AttemptStatus, ExamStatus, QuestionKind};
use crate::repositories;
use crate::schemas::attempt::attempt_to_response;
use crate::schemas::exam::{
    format_primitive, ExamConfig, ExamCreate, ExamResponse, ExamStatisticsBlock,
    ExamStatisticsResponse, ExamSummaryResponse, ExamUpdate, GradedAttemptDetail, QuestionCreate,
    QuestionOptionResponse, QuestionResponse,
};
use crate::services::{availability, statistics, EngineError};

#[derive(Debug, Deserialize)]
pub(crate) struct ListExamsQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    limit: i64,
    #[serde(default)]
    status: Option<ExamStatus>,
    #[serde(default)]
    #[serde(alias = "courseId")]
    course_id: Option<String>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:exam_id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:exam_id/publish", post(publish_exam))
        .route("/:exam_id/close", post(close_exam))
        .route("/:exam_id/statistics", get(exam_statistics))
}

async fn create_exam(
    CurrentInstructor(user): CurrentInstructor,
    state: axum::extract::State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(axum::http::StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if payload.close_at <= payload.open_at {
        return Err(ApiError::BadRequest("close_at must be after open_at".to_string()));
    }
    for question in &payload.questions {
        validate_question(question)?;
    }

    let course = repositories::courses::find_by_id(state.db(), &payload.course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch course"))?;
    let Some(course) = course else {
        return Err(EngineError::NotFound("course").into());
    };

    if !matches!(user.role, UserRole::Admin) && course.instructor_id != user.id {
        return Err(ApiError::Forbidden("You can only create exams in your own courses"));
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let exam_id = Uuid::new_v4().to_string();
    let exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            course_id: &course.id,
            instructor_id: &user.id,
            title: &payload.title,
            description: payload.description.as_deref(),
            open_at: to_primitive_utc(payload.open_at),
            close_at: to_primitive_utc(payload.close_at),
            duration_minutes: payload.config.duration_minutes,
            max_attempts: payload.config.max_attempts,
            show_answers: payload.config.show_answers,
            shuffle_questions: payload.config.shuffle_questions,
            shuffle_options: payload.config.shuffle_options,
            passing_score: payload.config.passing_score,
            created_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    let questions = insert_questions(&mut tx, &exam_id, &payload.questions).await?;
    let total_weight: f64 = questions.iter().map(|question| question.weight).sum();
    repositories::exams::set_total_weight(&mut *tx, &exam_id, total_weight, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store total weight"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let mut exam = exam;
    exam.total_weight = total_weight;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(exam_to_response(exam, questions, true, None)),
    ))
}

async fn list_exams(
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
    Query(params): Query<ListExamsQuery>,
) -> Result<Json<PaginatedResponse<ExamSummaryResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let rows = repositories::exams::list_summaries(
        state.db(),
        repositories::exams::ListExamsParams {
            instructor_id: matches!(user.role, UserRole::Instructor).then_some(user.id.as_str()),
            enrolled_student_id: matches!(user.role, UserRole::Student)
                .then_some(user.id.as_str()),
            course_id: params.course_id.as_deref(),
            status: params.status,
            skip,
            limit,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let now = primitive_now_utc();
    let total_count = rows.first().map(|row| row.total_count).unwrap_or(0);
    let summaries = rows
        .into_iter()
        .map(|row| ExamSummaryResponse {
            effective_status: availability::resolve(row.status, row.close_at, now),
            availability: availability::summarize(row.status, row.open_at, row.close_at, now),
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            open_at: format_primitive(row.open_at),
            close_at: format_primitive(row.close_at),
            duration_minutes: row.duration_minutes,
            max_attempts: row.max_attempts,
            total_weight: row.total_weight,
            status: row.status,
            question_count: row.question_count,
            pending_review_count: row.pending_review_count,
        })
        .collect();

    Ok(Json(PaginatedResponse { items: summaries, total_count, skip, limit }))
}

async fn get_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let questions = repositories::questions::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    if !matches!(user.role, UserRole::Student) {
        return Ok(Json(exam_to_response(exam, questions, true, None)));
    }

    let enrolled = repositories::courses::is_enrolled(state.db(), &exam.course_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check enrollment"))?;
    if !enrolled {
        return Err(ApiError::Forbidden("You are not enrolled in this course"));
    }
    if exam.status == ExamStatus::Draft {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let my_attempts = repositories::attempts::list_for_student(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempts"))?;

    // The answer key stays hidden until the student holds a graded attempt
    // and the exam is configured to reveal it.
    let reveal_answers = exam.show_answers
        && my_attempts.iter().any(|attempt| attempt.status == AttemptStatus::Graded);
    let my_attempts = my_attempts.iter().map(attempt_to_response).collect();

    Ok(Json(exam_to_response(exam, questions, reveal_answers, Some(my_attempts))))
}

async fn update_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only update your own exams"));
    }

    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if let Some(config) = &payload.config {
        config.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }

    let effective_open = payload.open_at.map(to_primitive_utc).unwrap_or(exam.open_at);
    let effective_close = payload.close_at.map(to_primitive_utc).unwrap_or(exam.close_at);
    if effective_close <= effective_open {
        return Err(ApiError::BadRequest("close_at must be after open_at".to_string()));
    }

    if let Some(questions) = &payload.questions {
        for question in questions {
            question.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
            validate_question(question)?;
        }

        let settled = repositories::attempts::count_settled_by_exam(state.db(), &exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
        if settled > 0 {
            return Err(EngineError::InvalidState(format!(
                "questions cannot be modified: {settled} attempt(s) have already been submitted"
            ))
            .into());
        }
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    repositories::exams::update(
        &mut *tx,
        &exam_id,
        repositories::exams::UpdateExam {
            title: payload.title.as_deref(),
            description: payload.description.as_deref(),
            open_at: payload.open_at.map(to_primitive_utc),
            close_at: payload.close_at.map(to_primitive_utc),
            duration_minutes: payload.config.as_ref().map(|c| c.duration_minutes),
            max_attempts: payload.config.as_ref().map(|c| c.max_attempts),
            show_answers: payload.config.as_ref().map(|c| c.show_answers),
            shuffle_questions: payload.config.as_ref().map(|c| c.shuffle_questions),
            shuffle_options: payload.config.as_ref().map(|c| c.shuffle_options),
            passing_score: payload.config.as_ref().map(|c| c.passing_score),
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    if let Some(questions) = &payload.questions {
        repositories::questions::delete_by_exam(&mut *tx, &exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to clear questions"))?;
        let inserted = insert_questions(&mut tx, &exam_id, questions).await?;
        let total_weight: f64 = inserted.iter().map(|question| question.weight).sum();
        repositories::exams::set_total_weight(&mut *tx, &exam_id, total_weight, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to store total weight"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let updated = repositories::exams::fetch_one_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch updated exam"))?;
    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    Ok(Json(exam_to_response(updated, questions, true, None)))
}

async fn delete_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<axum::http::StatusCode, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only delete your own exams"));
    }

    // Attempts go with the exam; there is no independent attempt deletion.
    repositories::exams::delete_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam_id,
        action = "exam_delete",
        "Exam deleted"
    );

    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn publish_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only publish your own exams"));
    }
    if exam.status != ExamStatus::Draft {
        return Err(EngineError::InvalidState(format!(
            "only a draft exam can be published; current status is {:?}",
            exam.status
        ))
        .into());
    }

    let question_count = repositories::questions::count_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    if question_count == 0 {
        return Err(ApiError::BadRequest("Exam must have at least one question".to_string()));
    }

    let now = primitive_now_utc();
    let published = repositories::exams::publish(state.db(), &exam_id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to publish exam"))?;
    if !published {
        return Err(EngineError::InvalidState(
            "exam left draft status while publishing".to_string(),
        )
        .into());
    }

    metrics::counter!("exams_published_total").increment(1);
    tracing::info!(
        user_id = %user.id,
        exam_id = %exam_id,
        action = "exam_publish",
        "Exam published"
    );

    respond_with_exam(&state, &exam_id).await
}

async fn close_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only close your own exams"));
    }
    if exam.status != ExamStatus::Published {
        return Err(EngineError::InvalidState(format!(
            "only a published exam can be closed; current status is {:?}",
            exam.status
        ))
        .into());
    }

    let now = primitive_now_utc();
    let closed = repositories::exams::close(state.db(), &exam_id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to close exam"))?;
    if !closed {
        return Err(EngineError::InvalidState(
            "exam left published status while closing".to_string(),
        )
        .into());
    }

    metrics::counter!("exams_closed_total").increment(1);
    tracing::info!(
        user_id = %user.id,
        exam_id = %exam_id,
        action = "exam_close",
        "Exam closed"
    );

    respond_with_exam(&state, &exam_id).await
}

async fn exam_statistics(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    CurrentUser(user): CurrentUser,
    state: axum::extract::State<AppState>,
) -> Result<Json<ExamStatisticsResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !can_manage_exam(&user, &exam) {
        return Err(ApiError::Forbidden("You can only view statistics for your own exams"));
    }

    let attempts = repositories::attempts::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempts"))?;

    let stats = statistics::recompute(&attempts, exam.passing_score);

    let in_progress_count =
        attempts.iter().filter(|a| a.status == AttemptStatus::InProgress).count() as i64;
    let pending_review_count =
        attempts.iter().filter(|a| a.status == AttemptStatus::Completed).count() as i64;

    let mut by_student: HashMap<&str, Vec<Attempt>> = HashMap::new();
    for attempt in &attempts {
        by_student.entry(attempt.student_id.as_str()).or_default().push(attempt.clone());
    }
    let best_ids: Vec<String> = by_student
        .values()
        .filter_map(|own| statistics::best_attempt(own).map(|best| best.id.clone()))
        .collect();

    let mut graded: Vec<&Attempt> =
        attempts.iter().filter(|a| a.status == AttemptStatus::Graded).collect();
    graded.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.attempt_number.cmp(&b.attempt_number))
    });

    let best_percentage =
        graded.iter().map(|a| a.percentage).fold(0.0, f64::max);
    let worst_percentage = graded
        .iter()
        .map(|a| a.percentage)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(0.0);

    let now = primitive_now_utc();
    let details = graded
        .iter()
        .map(|attempt| GradedAttemptDetail {
            attempt_id: attempt.id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_number: attempt.attempt_number,
            raw_score: attempt.raw_score,
            percentage: attempt.percentage,
            submitted_at: attempt.submitted_at.map(format_primitive),
            elapsed_minutes: attempt.elapsed_minutes,
            best: best_ids.contains(&attempt.id),
        })
        .collect();

    Ok(Json(ExamStatisticsResponse {
        exam_id: exam.id.clone(),
        status: exam.status,
        effective_status: availability::resolve(exam.status, exam.close_at, now),
        availability: availability::summarize(exam.status, exam.open_at, exam.close_at, now),
        total_attempts: attempts.len() as i64,
        in_progress_count,
        pending_review_count,
        graded_attempts: stats.graded_attempts,
        average_percentage: stats.average_percentage,
        passed_count: stats.passed_count,
        failed_count: stats.failed_count,
        best_percentage,
        worst_percentage,
        attempts: details,
    }))
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    exam.ok_or_else(|| EngineError::NotFound("exam").into())
}

async fn respond_with_exam(state: &AppState, exam_id: &str) -> Result<Json<ExamResponse>, ApiError> {
    let updated = repositories::exams::fetch_one_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch updated exam"))?;
    let questions = repositories::questions::list_by_exam(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    Ok(Json(exam_to_response(updated, questions, true, None)))
}

fn validate_question(question: &QuestionCreate) -> Result<(), ApiError> {
    match question.kind {
        QuestionKind::MultipleChoice => {
            if question.options.is_empty() {
                return Err(ApiError::BadRequest(
                    "multiple_choice questions must supply options".to_string(),
                ));
            }
            let correct = question.options.iter().filter(|option| option.is_correct).count();
            if correct > 1 {
                return Err(ApiError::BadRequest(
                    "multiple_choice questions may mark at most one option correct".to_string(),
                ));
            }
        }
        QuestionKind::TrueFalse => {
            if question.correct_value.is_none() {
                return Err(ApiError::BadRequest(
                    "true_false questions must supply correct_value".to_string(),
                ));
            }
        }
        QuestionKind::ShortAnswer | QuestionKind::Essay => {}
    }
    Ok(())
}

async fn insert_questions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    exam_id: &str,
    questions: &[QuestionCreate],
) -> Result<Vec<Question>, ApiError> {
    let now = primitive_now_utc();
    let mut inserted = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        let options = question
            .options
            .iter()
            .map(|option| QuestionOption {
                id: Uuid::new_v4().to_string(),
                text: option.text.clone(),
                is_correct: option.is_correct,
            })
            .collect();

        let created = repositories::questions::create(
            &mut **tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id,
                kind: question.kind,
                prompt: &question.prompt,
                options,
                correct_value: question.correct_value.as_deref(),
                weight: question.weight,
                display_order: question.display_order.unwrap_or(index as i32),
                created_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;

        inserted.push(created);
    }

    Ok(inserted)
}

fn config_from_exam(exam: &Exam) -> ExamConfig {
    ExamConfig {
        duration_minutes: exam.duration_minutes,
        max_attempts: exam.max_attempts,
        show_answers: exam.show_answers,
        shuffle_questions: exam.shuffle_questions,
        shuffle_options: exam.shuffle_options,
        passing_score: exam.passing_score,
    }
}

fn question_to_response(question: &Question, reveal_answers: bool) -> QuestionResponse {
    QuestionResponse {
        id: question.id.clone(),
        kind: question.kind,
        prompt: question.prompt.clone(),
        options: question
            .options
            .iter()
            .map(|option| QuestionOptionResponse {
                id: option.id.clone(),
                text: option.text.clone(),
                is_correct: reveal_answers.then_some(option.is_correct),
            })
            .collect(),
        correct_value: if reveal_answers { question.correct_value.clone() } else { None },
        weight: question.weight,
        display_order: question.display_order,
    }
}

fn exam_to_response(
    exam: Exam,
    questions: Vec<Question>,
    reveal_answers: bool,
    my_attempts: Option<Vec<crate::schemas::attempt::AttemptResponse>>,
) -> ExamResponse {
    let now = primitive_now_utc();
    let mut question_responses: Vec<QuestionResponse> =
        questions.iter().map(|question| question_to_response(question, reveal_answers)).collect();

    // Presentation-only shuffling for students; stored order is untouched.
    if my_attempts.is_some() {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        if exam.shuffle_questions {
            question_responses.shuffle(&mut rng);
        }
        if exam.shuffle_options {
            for question in &mut question_responses {
                question.options.shuffle(&mut rng);
            }
        }
    }

    ExamResponse {
        effective_status: availability::resolve(exam.status, exam.close_at, now),
        availability: availability::summarize(exam.status, exam.open_at, exam.close_at, now),
        configuration: config_from_exam(&exam),
        statistics: ExamStatisticsBlock {
            graded_attempts: exam.graded_attempts,
            average_percentage: exam.average_percentage,
            passed_count: exam.passed_count,
            failed_count: exam.failed_count,
        },
        id: exam.id,
        course_id: exam.course_id,
        instructor_id: exam.instructor_id,
        title: exam.title,
        description: exam.description,
        open_at: format_primitive(exam.open_at),
        close_at: format_primitive(exam.close_at),
        total_weight: exam.total_weight,
        status: exam.status,
        created_at: format_primitive(exam.created_at),
        updated_at: format_primitive(exam.updated_at),
        published_at: exam.published_at.map(format_primitive),
        questions: question_responses,
        my_attempts,
    }
}
