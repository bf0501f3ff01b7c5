use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{AnswerRecord, Attempt};
use crate::db::types::AttemptStatus;

#[derive(Debug, Serialize)]
pub(crate) struct AttemptStartResponse {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) started_at: String,
    /// True when an already-running attempt was handed back instead of a
    /// fresh one being created.
    pub(crate) resumed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerSubmit {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptSubmitRequest {
    #[serde(default)]
    pub(crate) answers: Vec<AnswerSubmit>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptScoreResponse {
    pub(crate) attempt_id: String,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) status: AttemptStatus,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct ManualScoreEntry {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    #[validate(length(min = 1, message = "at least one score is required"), nested)]
    pub(crate) scores: Vec<ManualScoreEntry>,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerRecordResponse {
    pub(crate) question_id: String,
    pub(crate) value: Option<String>,
    pub(crate) correct: Option<bool>,
    pub(crate) score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) comment: Option<String>,
}

impl From<&AnswerRecord> for AnswerRecordResponse {
    fn from(record: &AnswerRecord) -> Self {
        Self {
            question_id: record.question_id.clone(),
            value: record.value.clone(),
            correct: record.correct,
            score: record.score,
            comment: record.comment.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) elapsed_minutes: Option<i32>,
    pub(crate) feedback: Option<String>,
    pub(crate) answers: Vec<AnswerRecordResponse>,
}

pub(crate) fn attempt_to_response(attempt: &Attempt) -> AttemptResponse {
    AttemptResponse {
        id: attempt.id.clone(),
        exam_id: attempt.exam_id.clone(),
        student_id: attempt.student_id.clone(),
        attempt_number: attempt.attempt_number,
        status: attempt.status,
        raw_score: attempt.raw_score,
        percentage: attempt.percentage,
        started_at: format_primitive(attempt.started_at),
        submitted_at: attempt.submitted_at.map(format_primitive),
        elapsed_minutes: attempt.elapsed_minutes,
        feedback: attempt.feedback.clone(),
        answers: attempt.answers.0.iter().map(AnswerRecordResponse::from).collect(),
    }
}
